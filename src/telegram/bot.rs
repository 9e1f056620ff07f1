//! Bot initialization and command definitions

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "open the main menu")]
    Start,
    #[command(description = "how the bot works")]
    Help,
    #[command(description = "pick a tool")]
    Tools,
    #[command(description = "show remaining daily credits")]
    Credits,
    #[command(description = "your referral code and stats")]
    Referral,
}

/// Creates a Bot instance with a request timeout suited for large uploads.
pub fn create_bot() -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(config::BOT_TOKEN.as_str(), client))
}

/// Sets up bot commands in the Telegram UI.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "open the main menu"),
        BotCommand::new("help", "how the bot works"),
        BotCommand::new("tools", "pick a tool"),
        BotCommand::new("credits", "show remaining daily credits"),
        BotCommand::new("referral", "your referral code and stats"),
    ])
    .await?;

    Ok(())
}
