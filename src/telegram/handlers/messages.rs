//! Session-routed message handling and the gated tool runners.
//!
//! Text, photos and documents only mean something when the chat has a
//! pending [`AwaitingInput`] state; everything else gets a nudge towards
//! the menu.

use teloxide::prelude::*;
use teloxide::types::{InputFile, Message, ParseMode};

use super::types::{ensure_user_exists, HandlerDeps, HandlerError, UserInfo};
use crate::core::config;
use crate::credits::gateway::{perform_gated_action, GatedOutcome};
use crate::credits::referral::apply_referral_code;
use crate::credits::CreditError;
use crate::services::{ai_image, image_ops, pdf};
use crate::storage::get_connection;
use crate::telegram::session::{AwaitingInput, ImageAction};
use crate::telegram::{download_telegram_file, menu, Bot};

/// One line appended to successful tool replies.
fn outcome_footer(credits_used: i64, remaining: i64) -> String {
    if credits_used == 0 {
        "💎 Premium — no credits used.".to_string()
    } else {
        format!("💳 {credits_used} credit used, {remaining} remaining today.")
    }
}

/// Maps a gateway error onto a user-facing reply.
async fn report_credit_error(bot: &Bot, chat_id: ChatId, err: CreditError) -> Result<(), HandlerError> {
    let text = match err {
        CreditError::NoCreditsRemaining => "😔 You're out of credits for today.\n\n\
             Credits refill at midnight UTC, or invite a friend with /referral \
             to raise your daily allowance."
            .to_string(),
        CreditError::UserNotRegistered => "Please run /start first.".to_string(),
        CreditError::OperationFailed(reason) => {
            log::warn!("Gated operation failed for chat {}: {}", chat_id.0, reason);
            "⚠️ The tool failed, so your credit was returned. Please try again.".to_string()
        }
        other => {
            log::error!("Credit gateway error for chat {}: {}", chat_id.0, other);
            "Something went wrong, please try again later.".to_string()
        }
    };

    bot.send_message(chat_id, text).reply_markup(menu::back_to_menu()).await?;
    Ok(())
}

/// Generates an AI image from `prompt` and sends it back.
pub async fn run_ai_image(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    prompt: &str,
) -> Result<(), HandlerError> {
    bot.send_message(chat_id, "🎨 Generating, this can take up to a minute...").await?;

    let result: Result<GatedOutcome<Vec<u8>>, CreditError> =
        perform_gated_action(&deps.db_pool, chat_id.0, || async {
            ai_image::generate_image(prompt).await.map_err(|e| e.to_string())
        })
        .await;

    match result {
        Ok(outcome) => {
            bot.send_photo(chat_id, InputFile::memory(outcome.payload))
                .caption(format!(
                    "🎨 \"{}\"\n{}",
                    truncate(prompt, 120),
                    outcome_footer(outcome.credits_used, outcome.remaining)
                ))
                .await?;
        }
        Err(e) => report_credit_error(bot, chat_id, e).await?,
    }
    Ok(())
}

/// Renders `text` into a PDF and sends it back as a document.
pub async fn run_text_to_pdf(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    text: &str,
) -> Result<(), HandlerError> {
    let result: Result<GatedOutcome<Vec<u8>>, CreditError> =
        perform_gated_action(&deps.db_pool, chat_id.0, || async {
            pdf::text_to_pdf(text, "document").await.map_err(|e| e.to_string())
        })
        .await;

    match result {
        Ok(outcome) => {
            bot.send_document(chat_id, InputFile::memory(outcome.payload).file_name("document.pdf"))
                .caption(outcome_footer(outcome.credits_used, outcome.remaining))
                .await?;
        }
        Err(e) => report_credit_error(bot, chat_id, e).await?,
    }
    Ok(())
}

/// Merges the collected PDFs and sends the result.
pub async fn run_merge_pdfs(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    documents: Vec<Vec<u8>>,
) -> Result<(), HandlerError> {
    if documents.len() < 2 {
        bot.send_message(chat_id, "Send at least two PDF files first, then tap Merge Now.")
            .reply_markup(menu::merge_confirm_menu())
            .await?;
        // Put the collected documents back so the user can keep adding.
        deps.sessions.set(chat_id.0, AwaitingInput::MergePdfs(documents));
        return Ok(());
    }

    let count = documents.len();
    let result: Result<GatedOutcome<Vec<u8>>, CreditError> =
        perform_gated_action(&deps.db_pool, chat_id.0, || async {
            pdf::merge_pdfs(&documents).await.map_err(|e| e.to_string())
        })
        .await;

    match result {
        Ok(outcome) => {
            bot.send_document(chat_id, InputFile::memory(outcome.payload).file_name("merged.pdf"))
                .caption(format!(
                    "📋 Merged {count} documents.\n{}",
                    outcome_footer(outcome.credits_used, outcome.remaining)
                ))
                .await?;
        }
        Err(e) => report_credit_error(bot, chat_id, e).await?,
    }
    Ok(())
}

/// Applies the chosen image action to uploaded bytes and sends the result.
pub async fn run_image_action(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    action: ImageAction,
    bytes: Vec<u8>,
) -> Result<(), HandlerError> {
    match action {
        ImageAction::Convert(target) => {
            let result = perform_gated_action(&deps.db_pool, chat_id.0, || async {
                image_ops::convert(&bytes, target).map_err(|e| e.to_string())
            })
            .await;

            match result {
                Ok(outcome) => {
                    let name = format!("converted.{}", target.extension());
                    bot.send_document(chat_id, InputFile::memory(outcome.payload).file_name(name))
                        .caption(outcome_footer(outcome.credits_used, outcome.remaining))
                        .await?;
                }
                Err(e) => report_credit_error(bot, chat_id, e).await?,
            }
        }
        ImageAction::Compress => {
            let result = perform_gated_action(&deps.db_pool, chat_id.0, || async {
                image_ops::compress(&bytes).map_err(|e| e.to_string())
            })
            .await;

            match result {
                Ok(outcome) => {
                    let compressed = outcome.payload;
                    bot.send_document(
                        chat_id,
                        InputFile::memory(compressed.buffer).file_name("compressed.jpg"),
                    )
                    .caption(format!(
                        "🗜️ {} → {} bytes ({:.1}% saved)\n{}",
                        compressed.original_size,
                        compressed.compressed_size,
                        compressed.saved_percent,
                        outcome_footer(outcome.credits_used, outcome.remaining)
                    ))
                    .await?;
                }
                Err(e) => report_credit_error(bot, chat_id, e).await?,
            }
        }
        ImageAction::Resize { width, height } => {
            let result = perform_gated_action(&deps.db_pool, chat_id.0, || async {
                image_ops::resize(&bytes, width, height).map_err(|e| e.to_string())
            })
            .await;

            match result {
                Ok(outcome) => {
                    bot.send_document(
                        chat_id,
                        InputFile::memory(outcome.payload).file_name("resized.png"),
                    )
                    .caption(format!(
                        "📏 Resized to {width}×{height}\n{}",
                        outcome_footer(outcome.credits_used, outcome.remaining)
                    ))
                    .await?;
                }
                Err(e) => report_credit_error(bot, chat_id, e).await?,
            }
        }
        // Info is free, it never goes through the gateway.
        ImageAction::Info => match image_ops::info(&bytes) {
            Ok(info) => {
                bot.send_message(
                    chat_id,
                    format!(
                        "ℹ️ *Image Info*\n\n\
                         Dimensions: {}×{}\n\
                         Format: {}\n\
                         Size: {} bytes\n\n\
                         Free, no credit used.",
                        info.width, info.height, info.format, info.size_bytes,
                    ),
                )
                .parse_mode(ParseMode::Markdown)
                .reply_markup(menu::back_to_menu())
                .await?;
            }
            Err(e) => {
                bot.send_message(chat_id, format!("Couldn't read that image: {e}")).await?;
            }
        },
    }
    Ok(())
}

/// Redeems a referral code typed in chat.
async fn handle_referral_code_input(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    code: &str,
) -> Result<(), HandlerError> {
    let reply = match get_connection(&deps.db_pool) {
        Ok(conn) => match apply_referral_code(&conn, chat_id.0, code) {
            Ok(outcome) => format!(
                "🎉 Code accepted! You and your friend both got +{} daily credits.",
                outcome.bonus
            ),
            Err(CreditError::InvalidCode) => "That code doesn't look valid. Check it and try again.".to_string(),
            Err(CreditError::AlreadyRedeemed) => "You've already redeemed a referral code.".to_string(),
            Err(CreditError::SelfReferral) => "You can't redeem your own code 😉".to_string(),
            Err(e) => {
                log::error!("Referral redeem failed for {}: {}", chat_id.0, e);
                "Something went wrong, please try again later.".to_string()
            }
        },
        Err(e) => {
            log::error!("DB connection failed: {}", e);
            "Something went wrong, please try again later.".to_string()
        }
    };

    bot.send_message(chat_id, reply).reply_markup(menu::back_to_menu()).await?;
    Ok(())
}

/// Text messages: routed by the chat's pending session state.
pub async fn handle_text_message(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    let Some(text) = msg.text().map(str::to_string) else {
        return Ok(());
    };

    ensure_user_exists(&deps.db_pool, &UserInfo::from_message(&msg));

    match deps.sessions.take(chat_id.0) {
        Some(AwaitingInput::AiImagePrompt) => run_ai_image(&bot, chat_id, &deps, &text).await,
        Some(AwaitingInput::PdfText) => run_text_to_pdf(&bot, chat_id, &deps, &text).await,
        Some(AwaitingInput::ReferralCode) => handle_referral_code_input(&bot, chat_id, &deps, &text).await,
        Some(other) => {
            // A photo/document flow is pending; text is not what we need.
            deps.sessions.set(chat_id.0, other);
            bot.send_message(chat_id, "I'm waiting for a file for the selected tool. Send it, or go back with /tools.")
                .await?;
            Ok(())
        }
        None => {
            bot.send_message(chat_id, "Pick a tool first:")
                .reply_markup(menu::main_menu())
                .await?;
            Ok(())
        }
    }
}

/// Photos and documents: image uploads and PDFs for merging.
pub async fn handle_media_message(bot: Bot, msg: Message, deps: HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    ensure_user_exists(&deps.db_pool, &UserInfo::from_message(&msg));

    let file_id = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|p| p.file.id.0.clone())
        .or_else(|| msg.document().map(|d| d.file.id.0.clone()));

    let Some(file_id) = file_id else {
        return Ok(());
    };

    match deps.sessions.take(chat_id.0) {
        Some(AwaitingInput::ImageUpload(action)) => {
            let bytes = match download_telegram_file(&bot, &file_id).await {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("File download failed for chat {}: {}", chat_id.0, e);
                    bot.send_message(chat_id, format!("Couldn't read that file: {e}")).await?;
                    return Ok(());
                }
            };
            run_image_action(&bot, chat_id, &deps, action, bytes).await
        }
        Some(AwaitingInput::MergePdfs(mut docs)) => {
            let bytes = match download_telegram_file(&bot, &file_id).await {
                Ok(b) => b,
                Err(e) => {
                    deps.sessions.set(chat_id.0, AwaitingInput::MergePdfs(docs));
                    bot.send_message(chat_id, format!("Couldn't read that file: {e}")).await?;
                    return Ok(());
                }
            };

            if !pdf::is_pdf(&bytes) {
                deps.sessions.set(chat_id.0, AwaitingInput::MergePdfs(docs));
                bot.send_message(chat_id, "That file isn't a PDF. Send PDF documents only.").await?;
                return Ok(());
            }

            if docs.len() >= config::uploads::MAX_MERGE_FILES {
                deps.sessions.set(chat_id.0, AwaitingInput::MergePdfs(docs));
                bot.send_message(
                    chat_id,
                    format!("Limit reached ({} files). Tap Merge Now.", config::uploads::MAX_MERGE_FILES),
                )
                .reply_markup(menu::merge_confirm_menu())
                .await?;
                return Ok(());
            }

            docs.push(bytes);
            let count = docs.len();
            deps.sessions.set(chat_id.0, AwaitingInput::MergePdfs(docs));

            bot.send_message(
                chat_id,
                format!("📄 Got it, {count} PDF(s) collected. Send more or tap Merge Now."),
            )
            .reply_markup(menu::merge_confirm_menu())
            .await?;
            Ok(())
        }
        Some(other) => {
            deps.sessions.set(chat_id.0, other);
            bot.send_message(chat_id, "I'm waiting for text input for the selected tool.").await?;
            Ok(())
        }
        None => {
            bot.send_message(chat_id, "Pick a tool first, then send your file:")
                .reply_markup(menu::main_menu())
                .await?;
            Ok(())
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_mentions_premium_when_free() {
        assert!(outcome_footer(0, 5).contains("Premium"));
        assert!(outcome_footer(1, 4).contains("4 remaining"));
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
