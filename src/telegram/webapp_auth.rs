use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

fn parse_init_data(init_data: &str) -> HashMap<String, String> {
    init_data
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => {
                    let decoded_value = urlencoding::decode(value).ok()?;
                    Some((key.to_string(), decoded_value.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

fn user_id_from_params(params: &HashMap<String, String>) -> Result<i64> {
    let user_json = params
        .get("user")
        .ok_or_else(|| anyhow!("Missing user parameter"))?;

    let user: serde_json::Value =
        serde_json::from_str(user_json).map_err(|e| anyhow!("Failed to parse user JSON: {}", e))?;

    user.get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("Missing user id in user JSON"))
}

/// Validates Telegram Web App init data and returns the caller's user id.
///
/// Telegram signs the data with HMAC-SHA256, keyed by
/// `HMAC_SHA256("WebAppData", bot_token)`. The check string is every
/// parameter except `hash`, sorted by key and joined with newlines.
pub fn validate_telegram_webapp_data(init_data: &str, bot_token: &str) -> Result<i64> {
    let params = parse_init_data(init_data);

    let received_hash = params
        .get("hash")
        .ok_or_else(|| anyhow!("Missing hash parameter"))?;

    let mut check_pairs: Vec<String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "hash")
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    check_pairs.sort();
    let data_check_string = check_pairs.join("\n");

    let mut secret_key_mac =
        HmacSha256::new_from_slice(b"WebAppData").map_err(|e| anyhow!("HMAC init failed: {}", e))?;
    secret_key_mac.update(bot_token.as_bytes());
    let secret_key = secret_key_mac.finalize().into_bytes();

    let mut mac =
        HmacSha256::new_from_slice(&secret_key).map_err(|e| anyhow!("HMAC init failed: {}", e))?;
    mac.update(data_check_string.as_bytes());
    let calculated_hash = hex::encode(mac.finalize().into_bytes());

    if calculated_hash != *received_hash {
        return Err(anyhow!("Invalid hash - data may be tampered"));
    }

    // Reject init data older than 24 hours.
    if let Some(auth_date) = params.get("auth_date").and_then(|s| s.parse::<i64>().ok()) {
        let now = chrono::Utc::now().timestamp();
        let age_seconds = now - auth_date;
        if age_seconds > 86400 {
            return Err(anyhow!("Init data is too old ({} seconds)", age_seconds));
        }
    }

    user_id_from_params(&params)
}

/// Extracts the user id from init data WITHOUT validating the signature.
///
/// Only for local development, gated behind `WEBAPP_SKIP_AUTH`.
pub fn extract_user_id_unsafe(init_data: &str) -> Result<i64> {
    user_id_from_params(&parse_init_data(init_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(pairs: &[(&str, &str)], bot_token: &str) -> String {
        let mut check: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        check.sort();
        let data_check_string = check.join("\n");

        let mut secret_key_mac = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        secret_key_mac.update(bot_token.as_bytes());
        let secret_key = secret_key_mac.finalize().into_bytes();

        let mut mac = HmacSha256::new_from_slice(&secret_key).unwrap();
        mac.update(data_check_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_init_data(user_id: i64, bot_token: &str) -> String {
        let user = format!("{{\"id\":{user_id},\"first_name\":\"Test\"}}");
        let auth_date = chrono::Utc::now().timestamp().to_string();
        let pairs = [("auth_date", auth_date.as_str()), ("user", user.as_str())];
        let hash = sign(&pairs, bot_token);
        format!(
            "auth_date={}&user={}&hash={}",
            auth_date,
            urlencoding::encode(&user),
            hash
        )
    }

    #[test]
    fn valid_signature_passes() {
        let init = build_init_data(42, "TEST:TOKEN");
        assert_eq!(validate_telegram_webapp_data(&init, "TEST:TOKEN").unwrap(), 42);
    }

    #[test]
    fn wrong_token_fails() {
        let init = build_init_data(42, "TEST:TOKEN");
        assert!(validate_telegram_webapp_data(&init, "OTHER:TOKEN").is_err());
    }

    #[test]
    fn tampered_user_fails() {
        let init = build_init_data(42, "TEST:TOKEN");
        let tampered = init.replace("%22id%22%3A42", "%22id%22%3A43");
        assert!(validate_telegram_webapp_data(&tampered, "TEST:TOKEN").is_err());
    }

    #[test]
    fn missing_hash_fails() {
        assert!(validate_telegram_webapp_data("auth_date=1&user=%7B%7D", "T").is_err());
    }

    #[test]
    fn unsafe_extraction_reads_user_id() {
        let user = urlencoding::encode("{\"id\":7}").to_string();
        let init = format!("user={user}");
        assert_eq!(extract_user_id_unsafe(&init).unwrap(), 7);
    }
}
