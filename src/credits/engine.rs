//! Pure quota logic over a [`User`] record.
//!
//! Every function here is side-effect free: it takes a record value and
//! returns a decision or an updated copy. Persistence and concurrency are
//! the store's problem (`storage::db::try_consume_credit` is the atomic
//! counterpart used on the hot path); these functions are the reference
//! semantics and what read-only surfaces (menus, the mini-app `/api/user`
//! endpoint) compute against.
//!
//! The reset boundary is the UTC calendar day — the same day `date('now')`
//! yields in SQLite, so engine and store can never disagree on "today".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::storage::db::User;

/// Timestamp format produced by SQLite's `datetime('now')`.
pub const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result of a consumption attempt. Capacity exhaustion is a normal
/// outcome, not an error.
#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    pub ok: bool,
    pub updated: User,
}

/// Calendar day of the record's last reset, if the stored timestamp parses.
fn last_reset_day(record: &User) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(&record.last_reset_at, SQLITE_DATETIME_FORMAT)
        .ok()
        .map(|dt| dt.date())
}

/// Returns a copy with `used_today` zeroed if `now` falls on a different
/// calendar day than the last reset; otherwise returns the record unchanged.
///
/// Idempotent: applying it twice with the same `now` is a no-op the second
/// time. An unparseable `last_reset_at` counts as stale and triggers a reset.
pub fn reset_if_day_rolled_over(record: &User, now: DateTime<Utc>) -> User {
    let today = now.date_naive();
    let rolled_over = last_reset_day(record) != Some(today);

    if rolled_over {
        let mut updated = record.clone();
        updated.used_today = 0;
        updated.last_reset_at = now.format(SQLITE_DATETIME_FORMAT).to_string();
        updated
    } else {
        record.clone()
    }
}

/// Whether the record has at least one credit left, after normalizing the
/// daily reset. The reset-first ordering is mandatory: a stale counter from
/// yesterday must never block today's usage.
pub fn has_capacity(record: &User, now: DateTime<Utc>) -> bool {
    let normalized = reset_if_day_rolled_over(record, now);
    normalized.used_today < normalized.daily_allowance
}

/// Attempts to consume one credit. Returns the updated record on success,
/// the (reset-normalized) record unchanged on capacity exhaustion.
pub fn consume(record: &User, now: DateTime<Utc>) -> ConsumeOutcome {
    let mut normalized = reset_if_day_rolled_over(record, now);

    if normalized.used_today < normalized.daily_allowance {
        normalized.used_today += 1;
        ConsumeOutcome {
            ok: true,
            updated: normalized,
        }
    } else {
        ConsumeOutcome {
            ok: false,
            updated: normalized,
        }
    }
}

/// Returns a copy with the referrer-side bonus applied: allowance raised by
/// `bonus` and the referral counter incremented. Apply to the code owner's
/// record only — the redeeming side gets its bonus without a counter bump.
pub fn grant_referral_bonus(record: &User, bonus: i64) -> User {
    let mut updated = record.clone();
    updated.daily_allowance += bonus;
    updated.referral_count += 1;
    updated
}

/// Credits left today, never negative.
pub fn remaining(record: &User, now: DateTime<Utc>) -> i64 {
    let normalized = reset_if_day_rolled_over(record, now);
    (normalized.daily_allowance - normalized.used_today).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_user(daily_allowance: i64, used_today: i64, last_reset_at: &str) -> User {
        User {
            telegram_id: 1,
            username: Some("tester".to_string()),
            first_name: None,
            daily_allowance,
            used_today,
            last_reset_at: last_reset_at.to_string(),
            referral_code: "AB12CD34".to_string(),
            referred_by: None,
            referral_count: 0,
            is_premium: false,
        }
    }

    fn at(datetime: &str) -> DateTime<Utc> {
        let naive = NaiveDateTime::parse_from_str(datetime, SQLITE_DATETIME_FORMAT).unwrap();
        Utc.from_utc_datetime(&naive)
    }

    #[test]
    fn reset_is_noop_within_same_day() {
        let user = test_user(10, 4, "2024-06-01 08:00:00");
        let updated = reset_if_day_rolled_over(&user, at("2024-06-01 23:59:59"));
        assert_eq!(updated.used_today, 4);
        assert_eq!(updated.last_reset_at, "2024-06-01 08:00:00");
    }

    #[test]
    fn reset_zeroes_counter_on_new_day() {
        let user = test_user(10, 10, "2024-06-01 08:00:00");
        let updated = reset_if_day_rolled_over(&user, at("2024-06-02 00:00:01"));
        assert_eq!(updated.used_today, 0);
        assert_eq!(updated.last_reset_at, "2024-06-02 00:00:01");
    }

    #[test]
    fn reset_is_idempotent() {
        let user = test_user(10, 7, "2024-06-01 08:00:00");
        let now = at("2024-06-02 12:00:00");
        let once = reset_if_day_rolled_over(&user, now);
        let twice = reset_if_day_rolled_over(&once, now);
        assert_eq!(once.used_today, twice.used_today);
        assert_eq!(once.last_reset_at, twice.last_reset_at);
    }

    #[test]
    fn unparseable_timestamp_counts_as_stale() {
        let user = test_user(10, 9, "garbage");
        assert!(has_capacity(&user, at("2024-06-01 10:00:00")));
    }

    #[test]
    fn stale_counter_from_yesterday_never_blocks_today() {
        // Exhausted yesterday, must have full capacity today.
        let user = test_user(10, 10, "2024-06-01 22:00:00");
        assert!(has_capacity(&user, at("2024-06-02 01:00:00")));
        assert_eq!(remaining(&user, at("2024-06-02 01:00:00")), 10);
    }

    #[test]
    fn consume_increments_by_exactly_one() {
        let user = test_user(10, 3, "2024-06-01 08:00:00");
        let outcome = consume(&user, at("2024-06-01 09:00:00"));
        assert!(outcome.ok);
        assert_eq!(outcome.updated.used_today, 4);
    }

    #[test]
    fn consume_at_limit_fails_and_leaves_record_unchanged() {
        let user = test_user(10, 10, "2024-06-01 08:00:00");
        let outcome = consume(&user, at("2024-06-01 09:00:00"));
        assert!(!outcome.ok);
        assert_eq!(outcome.updated.used_today, 10);
    }

    #[test]
    fn consume_with_zero_allowance_always_fails() {
        let user = test_user(0, 0, "2024-06-01 08:00:00");
        let outcome = consume(&user, at("2024-06-02 09:00:00"));
        assert!(!outcome.ok);
        assert_eq!(outcome.updated.used_today, 0);
    }

    #[test]
    fn remaining_is_never_negative() {
        // Corrupted state: more used than allowed.
        let user = test_user(5, 9, "2024-06-01 08:00:00");
        assert_eq!(remaining(&user, at("2024-06-01 09:00:00")), 0);
    }

    #[test]
    fn last_credit_then_exhaustion() {
        // Allowance 10, used 9 -> success with 0 remaining, immediate
        // second call is rejected.
        let user = test_user(10, 9, "2024-06-01 08:00:00");
        let now = at("2024-06-01 09:00:00");

        let first = consume(&user, now);
        assert!(first.ok);
        assert_eq!(first.updated.used_today, 10);
        assert_eq!(remaining(&first.updated, now), 0);

        let second = consume(&first.updated, now);
        assert!(!second.ok);
        assert_eq!(remaining(&second.updated, now), 0);
    }

    #[test]
    fn referral_bonus_raises_allowance_and_counter() {
        let user = test_user(10, 2, "2024-06-01 08:00:00");
        let updated = grant_referral_bonus(&user, 20);
        assert_eq!(updated.daily_allowance, 30);
        assert_eq!(updated.referral_count, 1);
        assert_eq!(updated.used_today, 2);
    }
}
