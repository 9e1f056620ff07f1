//! Text-to-image generation via the Hugging Face inference API.

use log::{info, warn};
use serde_json::json;

use crate::core::{config, AppError, AppResult};
use crate::services::HTTP_CLIENT;

const PRIMARY_MODEL: &str = "runwayml/stable-diffusion-v1-5";
const FALLBACK_MODEL: &str = "CompVis/stable-diffusion-v1-4";

const IMAGE_WIDTH: u32 = 512;
const IMAGE_HEIGHT: u32 = 512;

/// Calls one model and returns the raw image bytes on success.
async fn call_model(
    model: &str,
    prompt: &str,
    steps: u32,
    guidance_scale: f64,
) -> AppResult<Vec<u8>> {
    let url = format!("https://api-inference.huggingface.co/models/{model}");

    let body = json!({
        "inputs": prompt,
        "parameters": {
            "width": IMAGE_WIDTH,
            "height": IMAGE_HEIGHT,
            "num_inference_steps": steps,
            "guidance_scale": guidance_scale,
        },
        "options": { "wait_for_model": true },
    });

    let response = HTTP_CLIENT
        .post(&url)
        .bearer_auth(config::HUGGINGFACE_API_KEY.as_str())
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        warn!("Model {model} returned {status}: {detail}");
        return Err(AppError::HttpStatus(status));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(AppError::Validation(format!(
            "Model {model} returned an empty image"
        )));
    }

    Ok(bytes.to_vec())
}

/// Generates an image for `prompt`, falling back to a lighter model when the
/// primary one is unavailable.
pub async fn generate_image(prompt: &str) -> AppResult<Vec<u8>> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::Validation("Prompt must not be empty".to_string()));
    }

    match call_model(PRIMARY_MODEL, prompt, 20, 7.5).await {
        Ok(bytes) => {
            info!("Generated image with {PRIMARY_MODEL} ({} bytes)", bytes.len());
            Ok(bytes)
        }
        Err(primary_err) => {
            warn!("Primary model failed ({primary_err}), trying {FALLBACK_MODEL}");
            let bytes = call_model(FALLBACK_MODEL, prompt, 15, 7.0).await?;
            info!("Generated image with {FALLBACK_MODEL} ({} bytes)", bytes.len());
            Ok(bytes)
        }
    }
}
