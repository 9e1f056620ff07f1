//! Inline keyboard callback routing.

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use super::commands::{credits_text, referral_text, HELP_TEXT};
use super::messages::run_merge_pdfs;
use super::types::{ensure_user_exists, HandlerDeps, HandlerError, UserInfo};
use crate::services::image_ops::TargetFormat;
use crate::telegram::session::{AwaitingInput, ImageAction};
use crate::telegram::{menu, Bot};

/// Parses "WxH" resize preset payloads.
fn parse_resize_payload(payload: &str) -> Option<(u32, u32)> {
    let (w, h) = payload.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Routes a callback query by its data payload.
pub async fn handle_menu_callback(bot: Bot, q: CallbackQuery, deps: HandlerDeps) -> Result<(), HandlerError> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    let user = UserInfo::from_callback(&q);
    ensure_user_exists(&deps.db_pool, &user);

    match data {
        "back_to_menu" => {
            deps.sessions.clear(chat_id.0);
            bot.send_message(chat_id, "Pick a tool:")
                .reply_markup(menu::main_menu())
                .await?;
        }
        "help" => {
            bot.send_message(chat_id, HELP_TEXT)
                .parse_mode(ParseMode::Markdown)
                .reply_markup(menu::back_to_menu())
                .await?;
        }
        "credits" => {
            let text = credits_text(&deps, chat_id.0)
                .unwrap_or_else(|| "Couldn't load your balance, try again later.".to_string());
            bot.send_message(chat_id, text)
                .parse_mode(ParseMode::Markdown)
                .reply_markup(menu::credits_menu())
                .await?;
        }
        "referral" => {
            let text = referral_text(&deps, chat_id.0)
                .unwrap_or_else(|| "Couldn't load your referral info, try again later.".to_string());
            bot.send_message(chat_id, text)
                .parse_mode(ParseMode::Markdown)
                .reply_markup(menu::referral_menu())
                .await?;
        }
        "share_referral" => {
            // A standalone message the user can forward as-is.
            if let Some(text) = referral_text(&deps, chat_id.0) {
                bot.send_message(chat_id, text).parse_mode(ParseMode::Markdown).await?;
            }
        }
        "enter_referral" => {
            deps.sessions.set(chat_id.0, AwaitingInput::ReferralCode);
            bot.send_message(chat_id, "🔑 Send me the referral code you received:").await?;
        }
        "ai_image" => {
            deps.sessions.set(chat_id.0, AwaitingInput::AiImagePrompt);
            bot.send_message(chat_id, "🎨 Describe the image you want me to generate:").await?;
        }
        "pdf_tools" => {
            bot.send_message(chat_id, "📄 PDF Tools:")
                .reply_markup(menu::pdf_tools_menu())
                .await?;
        }
        "text_to_pdf" => {
            deps.sessions.set(chat_id.0, AwaitingInput::PdfText);
            bot.send_message(chat_id, "📝 Send me the text you want as a PDF:").await?;
        }
        "merge_pdfs" => {
            deps.sessions.set(chat_id.0, AwaitingInput::MergePdfs(Vec::new()));
            bot.send_message(
                chat_id,
                "📋 Send me 2-10 PDF files one by one, then tap Merge Now.",
            )
            .reply_markup(menu::merge_confirm_menu())
            .await?;
        }
        "merge_now" => match deps.sessions.take(chat_id.0) {
            Some(AwaitingInput::MergePdfs(docs)) => {
                run_merge_pdfs(&bot, chat_id, &deps, docs).await?;
            }
            other => {
                if let Some(state) = other {
                    deps.sessions.set(chat_id.0, state);
                }
                bot.send_message(chat_id, "No merge in progress. Start one from PDF Tools.")
                    .reply_markup(menu::pdf_tools_menu())
                    .await?;
            }
        },
        "merge_cancel" => {
            deps.sessions.clear(chat_id.0);
            bot.send_message(chat_id, "Merge cancelled.")
                .reply_markup(menu::back_to_menu())
                .await?;
        }
        "image_tools" => {
            bot.send_message(chat_id, "🖼️ Image Tools:")
                .reply_markup(menu::image_tools_menu())
                .await?;
        }
        "convert_image" => {
            bot.send_message(chat_id, "🔄 Pick the target format:")
                .reply_markup(menu::convert_format_menu())
                .await?;
        }
        "compress_image" => {
            deps.sessions.set(chat_id.0, AwaitingInput::ImageUpload(ImageAction::Compress));
            bot.send_message(chat_id, "🗜️ Send me the image to compress:").await?;
        }
        "resize_image" => {
            bot.send_message(chat_id, "📏 Pick the target size:")
                .reply_markup(menu::resize_presets_menu())
                .await?;
        }
        "image_info" => {
            deps.sessions.set(chat_id.0, AwaitingInput::ImageUpload(ImageAction::Info));
            bot.send_message(chat_id, "ℹ️ Send me the image to inspect:").await?;
        }
        _ => {
            if let Some(ext) = data.strip_prefix("convert_to:") {
                match TargetFormat::parse(ext) {
                    Some(target) => {
                        deps.sessions
                            .set(chat_id.0, AwaitingInput::ImageUpload(ImageAction::Convert(target)));
                        bot.send_message(chat_id, "🔄 Now send me the image to convert:").await?;
                    }
                    None => log::warn!("Unknown conversion target: {}", ext),
                }
            } else if let Some(payload) = data.strip_prefix("resize_to:") {
                match parse_resize_payload(payload) {
                    Some((width, height)) => {
                        deps.sessions.set(
                            chat_id.0,
                            AwaitingInput::ImageUpload(ImageAction::Resize { width, height }),
                        );
                        bot.send_message(chat_id, format!("📏 Now send me the image to resize to {width}×{height}:"))
                            .await?;
                    }
                    None => log::warn!("Bad resize payload: {}", payload),
                }
            } else {
                log::warn!("Unhandled callback data: {}", data);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_payload_parses() {
        assert_eq!(parse_resize_payload("800x600"), Some((800, 600)));
        assert_eq!(parse_resize_payload("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_resize_payload("800"), None);
        assert_eq!(parse_resize_payload("axb"), None);
    }
}
