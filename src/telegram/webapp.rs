//! Mini App web server: REST API plus static frontend.
//!
//! Every tool endpoint goes through the same credit gateway as the bot, so a
//! user has one shared daily balance no matter which surface they use.

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::core::config;
use crate::credits::engine;
use crate::credits::gateway::{load_remaining, perform_gated_action};
use crate::credits::referral::apply_referral_code;
use crate::credits::CreditError;
use crate::services::{ai_image, image_ops, pdf};
use crate::storage::db::{self, create_user, get_user, is_duplicate_identity, DbPool};
use crate::storage::get_connection;
use crate::telegram::webapp_auth;

// ============================================================================
// API DATA STRUCTURES
// ============================================================================

/// User profile returned to the Mini App
#[derive(Debug, Serialize)]
pub struct UserProfile {
    #[serde(rename = "telegramId")]
    pub telegram_id: i64,
    pub username: Option<String>,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "dailyAllowance")]
    pub daily_allowance: i64,
    #[serde(rename = "remainingCredits")]
    pub remaining_credits: i64,
    #[serde(rename = "referralCode")]
    pub referral_code: String,
    #[serde(rename = "referralCount")]
    pub referral_count: i64,
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
}

#[derive(Debug, Deserialize)]
pub struct AiImageRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct TextToPdfRequest {
    pub text: String,
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    pub code: String,
}

/// Tool response carrying a result payload as a data URL
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    /// `data:<mime>;base64,<payload>`
    pub result: String,
    #[serde(rename = "creditsUsed")]
    pub credits_used: i64,
    #[serde(rename = "remainingCredits")]
    pub remaining_credits: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ReferralResponse {
    pub bonus: i64,
    #[serde(rename = "referrerId")]
    pub referrer_id: i64,
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    QuotaExceeded(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::QuotaExceeded(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CreditError> for ApiError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::NoCreditsRemaining => ApiError::QuotaExceeded(
                "No credits remaining today. Credits refill at midnight UTC.".to_string(),
            ),
            CreditError::UserNotRegistered => {
                ApiError::NotFound("User is not registered".to_string())
            }
            CreditError::InvalidCode => ApiError::BadRequest("Invalid referral code".to_string()),
            CreditError::AlreadyRedeemed => {
                ApiError::BadRequest("Referral code already redeemed".to_string())
            }
            CreditError::SelfReferral => {
                ApiError::BadRequest("You can't redeem your own code".to_string())
            }
            CreditError::OperationFailed(reason) => {
                ApiError::Internal(format!("Operation failed, credit refunded: {reason}"))
            }
            other => {
                log::error!("Credit gateway error: {}", other);
                ApiError::Internal("Internal error".to_string())
            }
        }
    }
}

// ============================================================================
// STATE AND AUTH
// ============================================================================

pub struct WebAppState {
    pub db_pool: Arc<DbPool>,
    pub bot_token: String,
}

/// Validates the `X-Telegram-Init-Data` header and returns the caller id.
async fn extract_user_id(headers: &HeaderMap, bot_token: &str) -> Result<i64, ApiError> {
    let init_data = headers
        .get("x-telegram-init-data")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing X-Telegram-Init-Data header".to_string()))?;

    // Dev escape hatch, never set in production.
    if std::env::var("WEBAPP_SKIP_AUTH").as_deref() == Ok("1") {
        return webapp_auth::extract_user_id_unsafe(init_data)
            .map_err(|e| ApiError::Unauthorized(format!("Bad init data: {e}")));
    }

    webapp_auth::validate_telegram_webapp_data(init_data, bot_token)
        .map_err(|e| ApiError::Unauthorized(format!("Init data validation failed: {e}")))
}

/// Loads the caller's record, registering them on first contact.
fn load_or_register(state: &WebAppState, user_id: i64) -> Result<db::User, ApiError> {
    let conn = get_connection(&state.db_pool)
        .map_err(|e| ApiError::Internal(format!("DB unavailable: {e}")))?;

    if let Some(user) = get_user(&conn, user_id)
        .map_err(|e| ApiError::Internal(format!("DB error: {e}")))?
    {
        return Ok(user);
    }

    match create_user(&conn, user_id, None, None) {
        Ok(user) => Ok(user),
        Err(ref e) if is_duplicate_identity(e) => get_user(&conn, user_id)
            .map_err(|e| ApiError::Internal(format!("DB error: {e}")))?
            .ok_or_else(|| ApiError::Internal("User vanished after creation race".to_string())),
        Err(e) => Err(ApiError::Internal(format!("Failed to register user: {e}"))),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Builds the Mini App router.
pub fn create_webapp_router(db_pool: Arc<DbPool>, bot_token: String) -> Router {
    let state = WebAppState { db_pool, bot_token };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Static frontend (HTML, CSS, JS)
        .nest_service("/", ServeDir::new("webapp/static"))
        // API endpoints
        .route("/api/health", get(health_check))
        .route("/api/user", get(handle_get_user))
        .route("/api/ai-image", post(handle_ai_image))
        .route("/api/text-to-pdf", post(handle_text_to_pdf))
        .route("/api/image-process", post(handle_image_process))
        .route("/api/merge-pdfs", post(handle_merge_pdfs))
        .route("/api/referral", post(handle_referral))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Runs the Mini App web server.
pub async fn run_webapp_server(port: u16, db_pool: Arc<DbPool>, bot_token: String) -> anyhow::Result<()> {
    let app = create_webapp_router(db_pool, bot_token);

    let addr = format!("0.0.0.0:{}", port);
    log::info!("🌐 Starting Mini App web server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// API HANDLERS
// ============================================================================

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kopilka-webapp"
    }))
}

/// GET /api/user - profile plus current balance
async fn handle_get_user(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token).await?;
    let user = load_or_register(&state, user_id)?;

    let remaining = if user.is_premium {
        user.daily_allowance
    } else {
        engine::remaining(&user, Utc::now())
    };

    Ok(Json(UserProfile {
        telegram_id: user.telegram_id,
        username: user.username,
        first_name: user.first_name,
        daily_allowance: user.daily_allowance,
        remaining_credits: remaining,
        referral_code: user.referral_code,
        referral_count: user.referral_count,
        is_premium: user.is_premium,
    }))
}

/// POST /api/ai-image - gated image generation
async fn handle_ai_image(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    Json(req): Json<AiImageRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token).await?;
    load_or_register(&state, user_id)?;

    let prompt = req.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("Prompt must not be empty".to_string()));
    }

    log::info!("AI image request from user {}: {} chars", user_id, prompt.len());

    let outcome = perform_gated_action(&state.db_pool, user_id, || async {
        ai_image::generate_image(&prompt).await.map_err(|e| e.to_string())
    })
    .await?;

    Ok(Json(ToolResponse {
        result: data_url("image/png", &outcome.payload),
        credits_used: outcome.credits_used,
        remaining_credits: outcome.remaining,
        details: None,
    }))
}

/// POST /api/text-to-pdf - gated PDF rendering
async fn handle_text_to_pdf(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    Json(req): Json<TextToPdfRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token).await?;
    load_or_register(&state, user_id)?;

    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Text must not be empty".to_string()));
    }
    let filename = req.filename.unwrap_or_else(|| "document".to_string());

    let outcome = perform_gated_action(&state.db_pool, user_id, || async {
        pdf::text_to_pdf(&text, &filename).await.map_err(|e| e.to_string())
    })
    .await?;

    Ok(Json(ToolResponse {
        result: data_url("application/pdf", &outcome.payload),
        credits_used: outcome.credits_used,
        remaining_credits: outcome.remaining,
        details: None,
    }))
}

/// Fields accepted by the multipart image-process endpoint.
#[derive(Default)]
struct ImageProcessForm {
    action: Option<String>,
    format: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    image: Option<Vec<u8>>,
}

async fn read_image_process_form(mut multipart: Multipart) -> Result<ImageProcessForm, ApiError> {
    let mut form = ImageProcessForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Bad multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "action" => form.action = Some(read_text_field(field).await?),
            "format" => form.format = Some(read_text_field(field).await?),
            "width" => form.width = read_text_field(field).await?.parse().ok(),
            "height" => form.height = read_text_field(field).await?.parse().ok(),
            "image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad image field: {e}")))?;
                if bytes.len() as u64 > config::uploads::MAX_FILE_BYTES {
                    return Err(ApiError::BadRequest("Image exceeds the size limit".to_string()));
                }
                form.image = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Bad form field: {e}")))
}

/// POST /api/image-process - gated convert/compress/resize/info
async fn handle_image_process(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ToolResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token).await?;
    load_or_register(&state, user_id)?;

    let form = read_image_process_form(multipart).await?;
    let image = form
        .image
        .ok_or_else(|| ApiError::BadRequest("Missing image field".to_string()))?;
    let action = form
        .action
        .ok_or_else(|| ApiError::BadRequest("Missing action field".to_string()))?;

    match action.as_str() {
        "convert" => {
            let target = form
                .format
                .as_deref()
                .and_then(image_ops::TargetFormat::parse)
                .ok_or_else(|| ApiError::BadRequest("Unknown target format".to_string()))?;

            let outcome = perform_gated_action(&state.db_pool, user_id, || async {
                image_ops::convert(&image, target).map_err(|e| e.to_string())
            })
            .await?;

            let mime = match target {
                image_ops::TargetFormat::Png => "image/png",
                image_ops::TargetFormat::Jpeg => "image/jpeg",
                image_ops::TargetFormat::WebP => "image/webp",
            };

            Ok(Json(ToolResponse {
                result: data_url(mime, &outcome.payload),
                credits_used: outcome.credits_used,
                remaining_credits: outcome.remaining,
                details: None,
            }))
        }
        "compress" => {
            let outcome = perform_gated_action(&state.db_pool, user_id, || async {
                image_ops::compress(&image).map_err(|e| e.to_string())
            })
            .await?;

            let compressed = outcome.payload;
            let details = serde_json::to_value(&compressed).ok();
            Ok(Json(ToolResponse {
                result: data_url("image/jpeg", &compressed.buffer),
                credits_used: outcome.credits_used,
                remaining_credits: outcome.remaining,
                details,
            }))
        }
        "resize" => {
            let (width, height) = match (form.width, form.height) {
                (Some(w), Some(h)) => (w, h),
                _ => return Err(ApiError::BadRequest("Missing width/height".to_string())),
            };

            let outcome = perform_gated_action(&state.db_pool, user_id, || async {
                image_ops::resize(&image, width, height).map_err(|e| e.to_string())
            })
            .await?;

            Ok(Json(ToolResponse {
                result: data_url("image/png", &outcome.payload),
                credits_used: outcome.credits_used,
                remaining_credits: outcome.remaining,
                details: None,
            }))
        }
        // Info is free, it never goes through the gateway.
        "info" => {
            let info = image_ops::info(&image)
                .map_err(|e| ApiError::BadRequest(format!("Unreadable image: {e}")))?;

            let details = serde_json::to_value(&info).ok();
            Ok(Json(ToolResponse {
                result: String::new(),
                credits_used: 0,
                remaining_credits: load_remaining(&state.db_pool, user_id)?,
                details,
            }))
        }
        other => Err(ApiError::BadRequest(format!("Unknown action: {other}"))),
    }
}

/// POST /api/merge-pdfs - gated merge of uploaded documents
async fn handle_merge_pdfs(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ToolResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token).await?;
    load_or_register(&state, user_id)?;

    let mut documents: Vec<Vec<u8>> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Bad multipart body: {e}")))?
    {
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Bad file field: {e}")))?;
        if bytes.len() as u64 > config::uploads::MAX_FILE_BYTES {
            return Err(ApiError::BadRequest("A document exceeds the size limit".to_string()));
        }
        if documents.len() >= config::uploads::MAX_MERGE_FILES {
            return Err(ApiError::BadRequest(format!(
                "Too many documents, limit is {}",
                config::uploads::MAX_MERGE_FILES
            )));
        }
        documents.push(bytes.to_vec());
    }

    if documents.len() < 2 {
        return Err(ApiError::BadRequest("Need at least two documents to merge".to_string()));
    }
    if documents.iter().any(|d| !pdf::is_pdf(d)) {
        return Err(ApiError::BadRequest("All uploads must be PDF documents".to_string()));
    }

    let outcome = perform_gated_action(&state.db_pool, user_id, || async {
        pdf::merge_pdfs(&documents).await.map_err(|e| e.to_string())
    })
    .await?;

    Ok(Json(ToolResponse {
        result: data_url("application/pdf", &outcome.payload),
        credits_used: outcome.credits_used,
        remaining_credits: outcome.remaining,
        details: None,
    }))
}

/// POST /api/referral - redeem a referral code
async fn handle_referral(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    Json(req): Json<ReferralRequest>,
) -> Result<Json<ReferralResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token).await?;
    load_or_register(&state, user_id)?;

    let conn = get_connection(&state.db_pool)
        .map_err(|e| ApiError::Internal(format!("DB unavailable: {e}")))?;

    let outcome = apply_referral_code(&conn, user_id, &req.code)?;

    Ok(Json(ReferralResponse {
        bonus: outcome.bonus,
        referrer_id: outcome.referrer_id,
    }))
}
