use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "database.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Port for the Mini App web server (API + static frontend)
/// Read from WEBAPP_PORT environment variable
/// Default: 3000
pub static WEBAPP_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("WEBAPP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000)
});

/// Public URL of the Mini App, used for the web_app menu button
/// Read from WEBAPP_PUBLIC_URL environment variable
/// Default: http://127.0.0.1:3000
pub static WEBAPP_PUBLIC_URL: Lazy<String> = Lazy::new(|| {
    env::var("WEBAPP_PUBLIC_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string())
});

/// Hugging Face API key for the hosted image generation models
/// Read from HUGGINGFACE_API_KEY environment variable
pub static HUGGINGFACE_API_KEY: Lazy<String> =
    Lazy::new(|| env::var("HUGGINGFACE_API_KEY").unwrap_or_else(|_| String::new()));

/// Base URL of the external PDF rendering service
/// Read from PDF_SERVICE_URL environment variable
/// The service exposes POST /render (text -> PDF) and POST /merge
pub static PDF_SERVICE_URL: Lazy<String> = Lazy::new(|| {
    env::var("PDF_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:4600".to_string())
});

/// Credits policy
///
/// These are deployment policy values, deliberately kept out of the quota
/// engine itself so they can change without touching engine logic.
pub mod credits {
    use super::{env, Lazy};

    /// Actions permitted per reset cycle for a fresh account
    /// Read from DEFAULT_DAILY_ALLOWANCE environment variable
    pub static DEFAULT_DAILY_ALLOWANCE: Lazy<i64> = Lazy::new(|| {
        env::var("DEFAULT_DAILY_ALLOWANCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    });

    /// Allowance bonus granted to both sides of a referral
    /// Read from REFERRAL_BONUS environment variable
    pub static REFERRAL_BONUS: Lazy<i64> = Lazy::new(|| {
        env::var("REFERRAL_BONUS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20)
    });

    /// Length of generated referral codes
    pub const REFERRAL_CODE_LEN: usize = 8;

    /// Attempts at generating a collision-free referral code before giving up
    pub const REFERRAL_CODE_MAX_RETRIES: usize = 5;
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Timeout for outbound HTTP requests (model API, PDF service, file fetch)
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// File upload limits
pub mod uploads {
    /// Maximum accepted size for user-supplied images and PDFs (10 MB)
    pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

    /// Maximum number of PDFs accepted for a single merge
    pub const MAX_MERGE_FILES: usize = 10;
}
