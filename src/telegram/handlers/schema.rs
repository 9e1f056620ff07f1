//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::callbacks::handle_menu_callback;
use super::commands::{
    handle_credits_command, handle_help_command, handle_referral_command, handle_start_command,
    handle_tools_command,
};
use super::messages::{handle_media_message, handle_text_message};
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::bot::Command;
use crate::telegram::Bot;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Returns a handler tree usable with teloxide's Dispatcher. The same schema
/// serves production and integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_start = deps.clone();
    let deps_commands = deps.clone();
    let deps_media = deps.clone();
    let deps_text = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // /start first: a deep-link payload ("/start CODE") does not parse
        // as a plain Command, so it is matched on the raw text
        .branch(start_handler(deps_start))
        // Commands win over session-routed text
        .branch(command_handler(deps_commands))
        // Photos and documents feed the pending tool
        .branch(media_handler(deps_media))
        // Plain text, routed by session state
        .branch(text_handler(deps_text))
        // Inline keyboard callbacks
        .branch(callback_handler(deps_callback))
}

fn start_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.text()
                .map(|text| text == "/start" || text.starts_with("/start "))
                .unwrap_or(false)
        })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move { handle_start_command(bot, msg, deps).await }
        })
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter_command::<Command>()
        .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                match cmd {
                    Command::Start => handle_start_command(bot, msg, deps).await,
                    Command::Help => handle_help_command(bot, msg).await,
                    Command::Tools => handle_tools_command(bot, msg, deps).await,
                    Command::Credits => handle_credits_command(bot, msg, deps).await,
                    Command::Referral => handle_referral_command(bot, msg, deps).await,
                }
            }
        })
}

fn media_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.photo().is_some() || msg.document().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move { handle_media_message(bot, msg, deps).await }
        })
}

fn text_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move { handle_text_message(bot, msg, deps).await }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move { handle_menu_callback(bot, q, deps).await }
    })
}
