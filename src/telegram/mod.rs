//! Telegram bot integration: commands, menus, chat sessions and the Mini App server.

pub mod bot;
pub mod files;
pub mod handlers;
pub mod menu;
pub mod session;
pub mod webapp;
pub mod webapp_auth;

/// Bot type used across the crate.
pub type Bot = teloxide::Bot;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use files::download_telegram_file;
pub use session::{AwaitingInput, ImageAction, SessionStore};
pub use webapp::{create_webapp_router, run_webapp_server};
