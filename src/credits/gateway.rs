//! The single choke point for credit-gated features.
//!
//! Debit first, run the delegated operation second, refund on failure.
//! The debit is persisted *before* the operation starts, so a crash
//! mid-operation costs the user at most one credit instead of granting an
//! unlimited free retry.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use super::engine;
use super::CreditError;
use crate::storage::db::{self, DbPool};
use crate::storage::get_connection;

/// What a gated call reports back to the user, whichever entry point it
/// came from (bot message, callback button, mini-app request).
#[derive(Debug)]
pub struct GatedOutcome<T> {
    /// Payload produced by the delegated operation
    pub payload: T,
    /// 0 or 1 — premium accounts spend nothing
    pub credits_used: i64,
    /// Credits left today after this call
    pub remaining: i64,
}

/// Runs `operation` for `telegram_id`, spending one credit.
///
/// Sequence: load record → atomic conditional debit (persisted) → run the
/// opaque async operation → on failure, refund the debit (best effort,
/// floored at zero) and surface [`CreditError::OperationFailed`].
///
/// The debit itself is a single conditional UPDATE in the store
/// ([`db::try_consume_credit`]), so N concurrent calls against k remaining
/// credits yield exactly k successes — no per-identity lock is needed and
/// the property holds across processes.
///
/// Premium accounts skip the debit entirely and report `credits_used = 0`.
pub async fn perform_gated_action<F, Fut, T>(
    db_pool: &Arc<DbPool>,
    telegram_id: i64,
    operation: F,
) -> Result<GatedOutcome<T>, CreditError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    // Step 1: load the record. Connection is scoped so it never lives
    // across an await point.
    let user = {
        let conn = get_connection(db_pool)?;
        db::get_user(&conn, telegram_id)?.ok_or(CreditError::UserNotRegistered)?
    };

    if user.is_premium {
        let payload = operation().await.map_err(CreditError::OperationFailed)?;
        let remaining = load_remaining(db_pool, telegram_id)?;
        return Ok(GatedOutcome {
            payload,
            credits_used: 0,
            remaining,
        });
    }

    // Steps 2-3: pessimistic debit, persisted before the operation runs.
    let debited = {
        let conn = get_connection(db_pool)?;
        let debited = db::try_consume_credit(&conn, telegram_id)?;
        if !debited {
            // The counter may still be stale if the allowance is zero;
            // persist the reset normalization anyway.
            db::reset_daily_usage_if_stale(&conn, telegram_id)?;
        }
        debited
    };

    if !debited {
        return Err(CreditError::NoCreditsRemaining);
    }

    // Step 4: the delegated operation. Opaque, single invocation; timeouts
    // are the operation's own concern and surface here as a failure reason.
    match operation().await {
        Ok(payload) => {
            let remaining = load_remaining(db_pool, telegram_id)?;
            Ok(GatedOutcome {
                payload,
                credits_used: 1,
                remaining,
            })
        }
        Err(reason) => {
            // Step 5: compensate. Best effort; if the refund itself fails
            // the user loses one credit until the next daily reset.
            match get_connection(db_pool) {
                Ok(conn) => {
                    if let Err(e) = db::refund_credit(&conn, telegram_id) {
                        log::error!(
                            "Failed to refund credit for user {} after operation failure: {}",
                            telegram_id,
                            e
                        );
                    }
                }
                Err(e) => {
                    log::error!(
                        "No DB connection to refund credit for user {}: {}",
                        telegram_id,
                        e
                    );
                }
            }
            Err(CreditError::OperationFailed(reason))
        }
    }
}

/// Current remaining-credits count straight from the store.
pub fn load_remaining(db_pool: &Arc<DbPool>, telegram_id: i64) -> Result<i64, CreditError> {
    let conn = get_connection(db_pool)?;
    let user = db::get_user(&conn, telegram_id)?.ok_or(CreditError::UserNotRegistered)?;
    Ok(engine::remaining(&user, Utc::now()))
}
