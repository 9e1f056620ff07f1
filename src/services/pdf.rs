//! PDF rendering and merging, delegated to the local render service.

use base64::Engine;
use log::info;
use serde_json::json;

use crate::core::{config, AppError, AppResult};
use crate::services::HTTP_CLIENT;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Проверяет сигнатуру PDF в начале буфера.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Приводит имя файла к безопасному виду: только латиница, цифры, `-` и `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .trim_end_matches(".pdf")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

async fn expect_pdf(response: reqwest::Response) -> AppResult<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::HttpStatus(status));
    }

    let bytes = response.bytes().await?.to_vec();
    if !is_pdf(&bytes) {
        return Err(AppError::Validation(
            "Render service returned a non-PDF payload".to_string(),
        ));
    }

    Ok(bytes)
}

/// Renders plain text into a PDF document.
pub async fn text_to_pdf(text: &str, title: &str) -> AppResult<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Text must not be empty".to_string()));
    }

    let url = format!("{}/render", config::PDF_SERVICE_URL.as_str());
    let response = HTTP_CLIENT
        .post(&url)
        .json(&json!({ "text": text, "title": sanitize_filename(title) }))
        .send()
        .await?;

    let pdf = expect_pdf(response).await?;
    info!("Rendered PDF from {} chars of text ({} bytes)", text.len(), pdf.len());
    Ok(pdf)
}

/// Merges several PDF documents into one, preserving input order.
pub async fn merge_pdfs(documents: &[Vec<u8>]) -> AppResult<Vec<u8>> {
    if documents.len() < 2 {
        return Err(AppError::Validation(
            "Need at least two documents to merge".to_string(),
        ));
    }
    if documents.len() > config::uploads::MAX_MERGE_FILES {
        return Err(AppError::Validation(format!(
            "Too many documents, limit is {}",
            config::uploads::MAX_MERGE_FILES
        )));
    }
    if let Some(pos) = documents.iter().position(|d| !is_pdf(d)) {
        return Err(AppError::Validation(format!(
            "Document #{} is not a valid PDF",
            pos + 1
        )));
    }

    let encoded: Vec<String> = documents
        .iter()
        .map(|d| base64::engine::general_purpose::STANDARD.encode(d))
        .collect();

    let url = format!("{}/merge", config::PDF_SERVICE_URL.as_str());
    let response = HTTP_CLIENT
        .post(&url)
        .json(&json!({ "documents": encoded }))
        .send()
        .await?;

    let pdf = expect_pdf(response).await?;
    info!("Merged {} PDFs into {} bytes", documents.len(), pdf.len());
    Ok(pdf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_magic_is_detected() {
        assert!(is_pdf(b"%PDF-1.7 rest of file"));
        assert!(!is_pdf(b"PK\x03\x04 zip archive"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("my report.pdf"), "my_report");
        assert_eq!(sanitize_filename("  ../../etc/passwd  "), "______etc_passwd");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("über"), "_ber");
    }
}
