//! Update handlers for the Telegram bot

pub mod callbacks;
pub mod commands;
pub mod messages;
pub mod schema;
pub mod types;

pub use schema::schema;
pub use types::{ensure_user_exists, HandlerDeps, HandlerError, UserCreationResult, UserInfo};
