//! Referral codes: generation, validation, one-time redemption.
//!
//! Both sides of a successful referral get the same allowance bonus; the
//! code owner additionally gets a `referral_count` bump. The two record
//! updates are deliberately not atomic across users — each side is applied
//! at-least-once and a half-applied referral only ever errs in the users'
//! favor.

use uuid::Uuid;

use super::CreditError;
use crate::core::config;
use crate::storage::db::{self, DbConnection};

/// What a successful redemption reports back to the caller.
#[derive(Debug)]
pub struct ReferralOutcome {
    /// Bonus granted to each side
    pub bonus: i64,
    /// Identity of the code owner (for notifications)
    pub referrer_id: i64,
}

/// Generates a fresh referral code: the first 8 hex chars of a v4 UUID,
/// uppercased. Global uniqueness is enforced by the store's unique index;
/// `db::create_user` regenerates on collision.
pub fn generate_referral_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(config::credits::REFERRAL_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Case-normalizes a user-supplied code. Returns `None` for anything that
/// cannot possibly be a code (wrong length, non-alphanumeric), so typos are
/// rejected before touching the store.
pub fn normalize_code(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.len() != config::credits::REFERRAL_CODE_LEN {
        return None;
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

/// Redeems `code` for `telegram_id`.
///
/// Rejections, in order: the redeeming account must exist, must not have
/// redeemed a code before, the code must belong to someone, and that
/// someone must not be the redeemer. On success the redeemer's
/// `referred_by` is set (immutable from then on — the store guard makes a
/// concurrent double-redeem lose) and both allowances grow by the
/// configured bonus.
pub fn apply_referral_code(
    conn: &DbConnection,
    telegram_id: i64,
    code: &str,
) -> Result<ReferralOutcome, CreditError> {
    let normalized = normalize_code(code).ok_or(CreditError::InvalidCode)?;

    let user = db::get_user(conn, telegram_id)?.ok_or(CreditError::UserNotRegistered)?;
    if user.referred_by.is_some() {
        return Err(CreditError::AlreadyRedeemed);
    }

    let referrer =
        db::get_user_by_referral_code(conn, &normalized)?.ok_or(CreditError::InvalidCode)?;
    if referrer.telegram_id == telegram_id {
        return Err(CreditError::SelfReferral);
    }

    let bonus = *config::credits::REFERRAL_BONUS;

    // Redeemer side first: the `referred_by IS NULL` guard in the UPDATE is
    // what makes redemption one-time even under interleaving.
    if !db::redeem_referral(conn, telegram_id, &normalized, bonus)? {
        return Err(CreditError::AlreadyRedeemed);
    }

    // Referrer side. If this write fails the redeemer keeps the bonus and
    // the error propagates so the caller can retry the referrer grant.
    if !db::grant_referrer_bonus(conn, &normalized, bonus)? {
        log::warn!(
            "Referral code {} vanished between lookup and grant (owner {})",
            normalized,
            referrer.telegram_id
        );
    }

    log::info!(
        "Referral applied: user {} redeemed code of user {} (+{} each)",
        telegram_id,
        referrer.telegram_id,
        bonus
    );

    Ok(ReferralOutcome {
        bonus,
        referrer_id: referrer.telegram_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_is_8_uppercase_alphanumeric() {
        for _ in 0..100 {
            let code = generate_referral_code();
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn generated_codes_are_distinct() {
        let a = generate_referral_code();
        let b = generate_referral_code();
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_accepts_lowercase_and_whitespace() {
        assert_eq!(normalize_code("  ab12cd34\n"), Some("AB12CD34".to_string()));
    }

    #[test]
    fn normalize_rejects_wrong_length_and_symbols() {
        assert_eq!(normalize_code("ABC"), None);
        assert_eq!(normalize_code("AB12CD345"), None);
        assert_eq!(normalize_code("AB12CD3!"), None);
        assert_eq!(normalize_code(""), None);
    }
}
