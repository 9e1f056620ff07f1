//! Inline keyboards for the bot menus.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, WebAppInfo};

use crate::core::config;

/// Main menu shown by /start and /tools.
pub fn main_menu() -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![
            InlineKeyboardButton::callback("🎨 AI Image Generator", "ai_image"),
            InlineKeyboardButton::callback("📄 PDF Tools", "pdf_tools"),
        ],
        vec![InlineKeyboardButton::callback("🖼️ Image Tools", "image_tools")],
        vec![
            InlineKeyboardButton::callback("💎 My Credits", "credits"),
            InlineKeyboardButton::callback("👥 Refer Friends", "referral"),
        ],
        vec![InlineKeyboardButton::callback("❓ Help", "help")],
    ];

    if let Ok(url) = url::Url::parse(config::WEBAPP_PUBLIC_URL.as_str()) {
        rows.insert(
            2,
            vec![InlineKeyboardButton::web_app("📱 Mini App", WebAppInfo { url })],
        );
    }

    InlineKeyboardMarkup::new(rows)
}

pub fn pdf_tools_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📝 Text to PDF", "text_to_pdf"),
            InlineKeyboardButton::callback("📋 Merge PDFs", "merge_pdfs"),
        ],
        back_row(),
    ])
}

pub fn image_tools_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🔄 Convert Format", "convert_image"),
            InlineKeyboardButton::callback("🗜️ Compress Image", "compress_image"),
        ],
        vec![
            InlineKeyboardButton::callback("📏 Resize Image", "resize_image"),
            InlineKeyboardButton::callback("ℹ️ Image Info", "image_info"),
        ],
        back_row(),
    ])
}

/// Target formats for a conversion, callback data is `convert_to:<ext>`.
pub fn convert_format_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("PNG", "convert_to:png"),
            InlineKeyboardButton::callback("JPEG", "convert_to:jpg"),
            InlineKeyboardButton::callback("WebP", "convert_to:webp"),
        ],
        back_row(),
    ])
}

/// Resize presets, callback data is `resize_to:<w>x<h>`.
pub fn resize_presets_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("512×512", "resize_to:512x512"),
            InlineKeyboardButton::callback("800×600", "resize_to:800x600"),
        ],
        vec![
            InlineKeyboardButton::callback("1024×768", "resize_to:1024x768"),
            InlineKeyboardButton::callback("1920×1080", "resize_to:1920x1080"),
        ],
        back_row(),
    ])
}

pub fn credits_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("👥 Share Referral Code", "share_referral")],
        back_row(),
    ])
}

pub fn referral_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📤 Share Referral Code", "share_referral"),
            InlineKeyboardButton::callback("🔑 Enter a Code", "enter_referral"),
        ],
        back_row(),
    ])
}

/// Shown while PDFs for a merge are being collected.
pub fn merge_confirm_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("✅ Merge Now", "merge_now"),
            InlineKeyboardButton::callback("✖️ Cancel", "merge_cancel"),
        ],
    ])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![back_row()])
}

fn back_row() -> Vec<InlineKeyboardButton> {
    vec![InlineKeyboardButton::callback("🔙 Back to Menu", "back_to_menu")]
}
