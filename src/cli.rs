use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kopilka")]
#[command(author, version, about = "Telegram bot with daily-credit gated AI and document tools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot and the Mini App server
    Run {
        /// Use webhook mode instead of long polling
        #[arg(long)]
        webhook: bool,
    },

    /// Roll stale daily quotas forward for every user, then exit
    ResetQuotas {
        /// Only report how many users would be reset
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
