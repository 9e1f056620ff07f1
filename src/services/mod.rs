//! External and local media services.
//!
//! Everything here is plain data in / data out: the credit gateway decides
//! whether a call is allowed, these modules only do the work.

pub mod ai_image;
pub mod image_ops;
pub mod pdf;

use once_cell::sync::Lazy;

use crate::core::config;

/// Shared HTTP client for all outbound service calls.
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(config::network::timeout())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});
