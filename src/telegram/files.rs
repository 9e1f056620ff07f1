//! Downloading user uploads through the Bot API.

use teloxide::prelude::*;
use teloxide::types::FileId;

use crate::core::{config, AppError, AppResult};
use crate::services::HTTP_CLIENT;
use crate::telegram::Bot;

/// Fetches a file sent to the bot into memory.
///
/// Telegram caps bot downloads at 20 MB; on top of that we enforce our own
/// upload limit before pulling any bytes.
pub async fn download_telegram_file(bot: &Bot, file_id: &str) -> AppResult<Vec<u8>> {
    let file = bot.get_file(FileId(file_id.to_string())).await?;
    log::info!("File info: path = {}, size = {} bytes", file.path, file.size);

    if u64::from(file.size) > config::uploads::MAX_FILE_BYTES {
        return Err(AppError::Validation(format!(
            "File is too large ({} bytes, limit {})",
            file.size,
            config::uploads::MAX_FILE_BYTES
        )));
    }

    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        config::BOT_TOKEN.as_str(),
        file.path
    );

    let response = HTTP_CLIENT.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::HttpStatus(status));
    }

    let bytes = response.bytes().await?.to_vec();
    if bytes.len() as u64 > config::uploads::MAX_FILE_BYTES {
        return Err(AppError::Validation("Downloaded file exceeds the size limit".to_string()));
    }

    Ok(bytes)
}
