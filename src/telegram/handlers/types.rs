//! Handler types, dependencies, and user management helpers

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Message;

use crate::storage::db::{self, create_user, get_user, is_duplicate_identity};
use crate::storage::get_connection;
use crate::telegram::session::SessionStore;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<db::DbPool>,
    pub sessions: Arc<SessionStore>,
    pub bot_username: Option<String>,
}

impl HandlerDeps {
    pub fn new(
        db_pool: Arc<db::DbPool>,
        sessions: Arc<SessionStore>,
        bot_username: Option<String>,
    ) -> Self {
        Self { db_pool, sessions, bot_username }
    }
}

/// User info extracted from an update
#[derive(Clone)]
pub struct UserInfo {
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl UserInfo {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id.0,
            username: msg.from.as_ref().and_then(|u| u.username.clone()),
            first_name: msg.from.as_ref().map(|u| u.first_name.clone()),
        }
    }

    pub fn from_callback(q: &CallbackQuery) -> Self {
        Self {
            chat_id: i64::try_from(q.from.id.0).unwrap_or(0),
            username: q.from.username.clone(),
            first_name: Some(q.from.first_name.clone()),
        }
    }
}

/// Result of ensure_user_exists operation
pub enum UserCreationResult {
    /// User already existed
    Existed,
    /// User was newly created
    Created,
    /// Database error
    DbError,
}

/// Ensures a user exists in the database, creating them if needed.
///
/// A concurrent first contact (two updates racing to create the same user)
/// loses on the primary key; the loser re-reads and proceeds as `Existed`.
pub fn ensure_user_exists(db_pool: &Arc<db::DbPool>, user: &UserInfo) -> UserCreationResult {
    let conn = match get_connection(db_pool) {
        Ok(c) => c,
        Err(_) => return UserCreationResult::DbError,
    };

    match get_user(&conn, user.chat_id) {
        Ok(Some(_)) => UserCreationResult::Existed,
        Ok(None) => {
            match create_user(&conn, user.chat_id, user.username.clone(), user.first_name.clone()) {
                Ok(created) => {
                    log::info!(
                        "New user {} registered with {} daily credits",
                        created.telegram_id,
                        created.daily_allowance
                    );
                    UserCreationResult::Created
                }
                Err(ref e) if is_duplicate_identity(e) => UserCreationResult::Existed,
                Err(e) => {
                    log::error!("Failed to create user {}: {}", user.chat_id, e);
                    UserCreationResult::DbError
                }
            }
        }
        Err(e) => {
            log::error!("Failed to look up user {}: {}", user.chat_id, e);
            UserCreationResult::DbError
        }
    }
}
