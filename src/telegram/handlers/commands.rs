//! Command handlers: /start, /help, /tools, /credits, /referral

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode};

use super::types::{ensure_user_exists, HandlerDeps, HandlerError, UserInfo};
use crate::core::config;
use crate::credits::engine;
use crate::credits::referral::apply_referral_code;
use crate::credits::CreditError;
use crate::storage::db::get_user;
use crate::storage::get_connection;
use crate::telegram::{menu, Bot};

pub(crate) const HELP_TEXT: &str = "\
*What I can do*\n\n\
🎨 Generate AI images from a text prompt\n\
📝 Turn text into a PDF document\n\
📋 Merge several PDFs into one\n\
🖼️ Convert, compress, resize and inspect images\n\n\
Every tool costs *1 credit*. You get a fresh batch of credits every day \
(UTC midnight), and referrals raise your daily allowance permanently.\n\n\
Use /tools to pick a tool and /credits to check your balance.";

/// /start — registers the user and shows the main menu.
///
/// Accepts a deep-link payload (`t.me/bot?start=CODE`) carrying a referral
/// code, which is redeemed before the menu is shown.
pub async fn handle_start_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let user = UserInfo::from_message(&msg);
    ensure_user_exists(&deps.db_pool, &user);

    // Deep-link referral payload: "/start ABCD1234"
    let payload = msg
        .text()
        .and_then(|t| t.strip_prefix("/start"))
        .map(str::trim)
        .filter(|p| !p.is_empty());

    if let Some(code) = payload {
        let reply = match get_connection(&deps.db_pool) {
            Ok(conn) => match apply_referral_code(&conn, user.chat_id, code) {
                Ok(outcome) => Some(format!(
                    "🎉 Referral code accepted! You and your friend both got +{} daily credits.",
                    outcome.bonus
                )),
                Err(CreditError::AlreadyRedeemed) => None,
                Err(CreditError::SelfReferral) => {
                    Some("You can't redeem your own referral code 😉".to_string())
                }
                Err(CreditError::InvalidCode) => {
                    Some("That referral code doesn't look valid.".to_string())
                }
                Err(e) => {
                    log::error!("Referral redeem failed for {}: {}", user.chat_id, e);
                    None
                }
            },
            Err(e) => {
                log::error!("DB connection failed: {}", e);
                None
            }
        };

        if let Some(text) = reply {
            bot.send_message(msg.chat.id, text).await?;
        }
    }

    let name = user.first_name.as_deref().unwrap_or("there");
    bot.send_message(
        msg.chat.id,
        format!("👋 Hi {name}! Pick a tool to get started:"),
    )
    .reply_markup(menu::main_menu())
    .await?;

    Ok(())
}

/// /help — static description of the tools and the credit system.
pub async fn handle_help_command(bot: Bot, msg: Message) -> Result<(), HandlerError> {
    bot.send_message(msg.chat.id, HELP_TEXT)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(menu::back_to_menu())
        .await?;
    Ok(())
}

/// /tools — shows the main menu.
pub async fn handle_tools_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    ensure_user_exists(&deps.db_pool, &UserInfo::from_message(&msg));
    bot.send_message(msg.chat.id, "Pick a tool:")
        .reply_markup(menu::main_menu())
        .await?;
    Ok(())
}

/// Renders the credit balance text for a chat.
pub fn credits_text(deps: &HandlerDeps, chat_id: i64) -> Option<String> {
    let conn = get_connection(&deps.db_pool).ok()?;
    let user = get_user(&conn, chat_id).ok()??;

    if user.is_premium {
        return Some("💎 *Your Credits*\n\nYou are on *premium* — tools are unlimited.".to_string());
    }

    let remaining = engine::remaining(&user, Utc::now());
    Some(format!(
        "💎 *Your Credits*\n\n\
         Remaining today: *{}* of {}\n\
         Referrals so far: {}\n\n\
         Credits refill every day at midnight UTC. \
         Invite friends to raise your daily allowance by +{} each.",
        remaining,
        user.daily_allowance,
        user.referral_count,
        *config::credits::REFERRAL_BONUS,
    ))
}

/// /credits — current balance and reset info.
pub async fn handle_credits_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    ensure_user_exists(&deps.db_pool, &UserInfo::from_message(&msg));

    let text = credits_text(&deps, msg.chat.id.0)
        .unwrap_or_else(|| "Couldn't load your balance, try again later.".to_string());

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(menu::credits_menu())
        .await?;
    Ok(())
}

/// Renders the referral summary text for a chat.
pub fn referral_text(deps: &HandlerDeps, chat_id: i64) -> Option<String> {
    let conn = get_connection(&deps.db_pool).ok()?;
    let user = get_user(&conn, chat_id).ok()??;

    let link = deps
        .bot_username
        .as_deref()
        .map(|name| format!("\nOr share your link: https://t.me/{}?start={}", name, user.referral_code))
        .unwrap_or_default();

    Some(format!(
        "👥 *Refer Friends*\n\n\
         Your code: `{}`\n\
         Friends referred: {}\n\n\
         When a friend enters your code, you *both* get +{} daily credits.{}",
        user.referral_code,
        user.referral_count,
        *config::credits::REFERRAL_BONUS,
        link,
    ))
}

/// /referral — personal code and stats.
pub async fn handle_referral_command(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    ensure_user_exists(&deps.db_pool, &UserInfo::from_message(&msg));

    let text = referral_text(&deps, msg.chat.id.0)
        .unwrap_or_else(|| "Couldn't load your referral info, try again later.".to_string());

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(menu::referral_menu())
        .await?;
    Ok(())
}
