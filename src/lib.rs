//! Kopilka - Telegram bot with daily-credit gated AI and document tools
//!
//! This library provides the full functionality of the Kopilka bot: the
//! credit engine and gateway, referral program, media services, and the
//! Telegram/Mini App surfaces.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, and logging
//! - `credits`: Quota engine, credit gateway, and referrals
//! - `storage`: SQLite persistence
//! - `services`: AI image generation, PDF rendering, image processing
//! - `telegram`: Bot handlers and the Mini App server

pub mod cli;
pub mod core;
pub mod credits;
pub mod services;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use credits::gateway::{perform_gated_action, GatedOutcome};
pub use credits::CreditError;
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{create_bot, run_webapp_server, Bot};
