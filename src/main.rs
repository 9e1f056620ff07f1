use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::signal;

use kopilka::cli::{Cli, Commands};
use kopilka::core::{config, init_logger};
use kopilka::storage::db;
use kopilka::storage::{create_pool, get_connection};
use kopilka::telegram::handlers::{schema, HandlerDeps};
use kopilka::telegram::session::SessionStore;
use kopilka::telegram::{create_bot, run_webapp_server, setup_bot_commands};

/// Main entry point for the bot.
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Catch panics from the dispatcher so they end up in the log
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    match cli.command {
        Some(Commands::Run { webhook }) => {
            log::info!("Running bot (webhook: {})", webhook);
            run_bot(webhook).await
        }
        Some(Commands::ResetQuotas { dry_run }) => run_reset_quotas(dry_run),
        None => {
            log::info!("No command specified, running bot in default mode");
            run_bot(false).await
        }
    }
}

/// Rolls stale daily quotas forward for every user and exits.
fn run_reset_quotas(dry_run: bool) -> Result<()> {
    let db_pool = create_pool(&config::DATABASE_PATH)
        .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?;
    let conn = get_connection(&db_pool)?;

    if dry_run {
        let count = db::count_stale_quotas(&conn)?;
        log::info!("{} user(s) have a stale daily quota", count);
        println!("{count} user(s) would be reset");
    } else {
        let count = db::reset_all_stale_quotas(&conn)?;
        println!("Reset daily quota for {count} user(s)");
    }

    Ok(())
}

async fn run_bot(use_webhook: bool) -> Result<()> {
    log::info!("Starting bot...");

    let bot = create_bot()?;

    let bot_info = bot.get_me().await?;
    let bot_username = bot_info.username.clone();
    log::info!("Bot username: {:?}, Bot ID: {}", bot_username, bot_info.id);

    setup_bot_commands(&bot).await?;

    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH)
            .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );

    // Normalize any quotas left stale since the last run
    {
        let conn = get_connection(&db_pool)?;
        let _ = db::reset_all_stale_quotas(&conn);
    }

    let sessions = Arc::new(SessionStore::new());

    // Mini App web server shares the pool (and therefore the credit balance)
    // with the bot
    {
        let webapp_port = *config::WEBAPP_PORT;
        let db_pool_webapp = Arc::clone(&db_pool);
        let bot_token_webapp = bot.token().to_string();

        tokio::spawn(async move {
            if let Err(e) = run_webapp_server(webapp_port, db_pool_webapp, bot_token_webapp).await {
                log::error!("Mini App web server error: {}", e);
            }
        });
    }

    let handler_deps = HandlerDeps::new(Arc::clone(&db_pool), sessions, bot_username);
    let handler = schema(handler_deps);

    if use_webhook {
        // Webhook mode needs a public HTTPS endpoint wired to an HTTP server;
        // only long polling is supported for now.
        log::warn!("Webhook mode is not implemented, falling back to long polling");
    }

    log::info!("Starting bot in long polling mode");

    let listener_bot = bot.clone();
    let dispatcher = tokio::spawn(async move {
        use teloxide::update_listeners::Polling;

        let listener = Polling::builder(listener_bot.clone()).drop_pending_updates().build();

        Dispatcher::builder(listener_bot, handler)
            .dependencies(DependencyMap::new())
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    });

    tokio::select! {
        _ = dispatcher => {
            log::info!("Dispatcher stopped");
        }
        _ = signal::ctrl_c() => {
            log::info!("Shutting down gracefully...");
        }
    }

    Ok(())
}
