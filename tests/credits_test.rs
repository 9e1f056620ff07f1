//! Integration tests for the credit gateway against a real SQLite store
//!
//! Run with: cargo test --test credits_test

use std::sync::Arc;

use pretty_assertions::assert_eq;

use kopilka::credits::gateway::perform_gated_action;
use kopilka::credits::CreditError;
use kopilka::storage::db::{self, create_user, get_user, DbPool, User};
use kopilka::storage::{create_pool, get_connection};

fn setup() -> (tempfile::TempDir, Arc<DbPool>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.sqlite");
    let pool = create_pool(path.to_str().unwrap()).expect("pool");
    (dir, Arc::new(pool))
}

fn register(pool: &Arc<DbPool>, telegram_id: i64) -> User {
    let conn = get_connection(pool).unwrap();
    create_user(&conn, telegram_id, Some("tester".to_string()), None).unwrap()
}

fn set_allowance(pool: &Arc<DbPool>, telegram_id: i64, allowance: i64) {
    let conn = get_connection(pool).unwrap();
    conn.execute(
        "UPDATE users SET daily_allowance = ?1 WHERE telegram_id = ?2",
        rusqlite::params![allowance, telegram_id],
    )
    .unwrap();
}

fn set_premium(pool: &Arc<DbPool>, telegram_id: i64) {
    let conn = get_connection(pool).unwrap();
    conn.execute(
        "UPDATE users SET is_premium = 1 WHERE telegram_id = ?1",
        rusqlite::params![telegram_id],
    )
    .unwrap();
}

fn used_today(pool: &Arc<DbPool>, telegram_id: i64) -> i64 {
    let conn = get_connection(pool).unwrap();
    get_user(&conn, telegram_id).unwrap().unwrap().used_today
}

#[tokio::test]
async fn gated_action_spends_exactly_one_credit() {
    let (_dir, pool) = setup();
    let user = register(&pool, 100);

    let outcome = perform_gated_action(&pool, 100, || async { Ok::<_, String>("done") })
        .await
        .unwrap();

    assert_eq!(outcome.payload, "done");
    assert_eq!(outcome.credits_used, 1);
    assert_eq!(outcome.remaining, user.daily_allowance - 1);
    assert_eq!(used_today(&pool, 100), 1);
}

#[tokio::test]
async fn unregistered_user_is_rejected() {
    let (_dir, pool) = setup();

    let result = perform_gated_action(&pool, 999, || async { Ok::<_, String>(()) }).await;

    assert!(matches!(result, Err(CreditError::UserNotRegistered)));
}

#[tokio::test]
async fn exhausted_allowance_blocks_without_spending() {
    let (_dir, pool) = setup();
    register(&pool, 101);
    set_allowance(&pool, 101, 1);

    perform_gated_action(&pool, 101, || async { Ok::<_, String>(()) })
        .await
        .unwrap();

    let result = perform_gated_action(&pool, 101, || async { Ok::<_, String>(()) }).await;

    assert!(matches!(result, Err(CreditError::NoCreditsRemaining)));
    assert_eq!(used_today(&pool, 101), 1);
}

#[tokio::test]
async fn zero_allowance_never_succeeds() {
    let (_dir, pool) = setup();
    register(&pool, 102);
    set_allowance(&pool, 102, 0);

    let result = perform_gated_action(&pool, 102, || async { Ok::<_, String>(()) }).await;

    assert!(matches!(result, Err(CreditError::NoCreditsRemaining)));
    assert_eq!(used_today(&pool, 102), 0);
}

#[tokio::test]
async fn failed_operation_refunds_the_debit() {
    let (_dir, pool) = setup();
    register(&pool, 103);

    let result: Result<_, CreditError> =
        perform_gated_action(&pool, 103, || async { Err::<(), _>("model down".to_string()) }).await;

    match result {
        Err(CreditError::OperationFailed(reason)) => assert_eq!(reason, "model down"),
        other => panic!("expected OperationFailed, got {other:?}"),
    }
    assert_eq!(used_today(&pool, 103), 0);
}

#[tokio::test]
async fn refund_after_failure_allows_a_retry() {
    let (_dir, pool) = setup();
    register(&pool, 104);
    set_allowance(&pool, 104, 1);

    let _ = perform_gated_action(&pool, 104, || async { Err::<(), _>("boom".to_string()) }).await;

    // The single credit was refunded, the retry must succeed.
    let outcome = perform_gated_action(&pool, 104, || async { Ok::<_, String>(()) })
        .await
        .unwrap();
    assert_eq!(outcome.remaining, 0);
}

#[tokio::test]
async fn premium_bypasses_the_quota() {
    let (_dir, pool) = setup();
    register(&pool, 105);
    set_allowance(&pool, 105, 0);
    set_premium(&pool, 105);

    let outcome = perform_gated_action(&pool, 105, || async { Ok::<_, String>(()) })
        .await
        .unwrap();

    assert_eq!(outcome.credits_used, 0);
    assert_eq!(used_today(&pool, 105), 0);
}

#[tokio::test]
async fn allowance_is_consumable_exactly_once_per_credit() {
    let (_dir, pool) = setup();
    register(&pool, 106);
    set_allowance(&pool, 106, 10);

    // Spend nine credits.
    for _ in 0..9 {
        perform_gated_action(&pool, 106, || async { Ok::<_, String>(()) })
            .await
            .unwrap();
    }

    // The tenth succeeds with nothing left over.
    let outcome = perform_gated_action(&pool, 106, || async { Ok::<_, String>(()) })
        .await
        .unwrap();
    assert_eq!(outcome.remaining, 0);

    // The eleventh is rejected.
    let result = perform_gated_action(&pool, 106, || async { Ok::<_, String>(()) }).await;
    assert!(matches!(result, Err(CreditError::NoCreditsRemaining)));
    assert_eq!(used_today(&pool, 106), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_spends_never_exceed_the_allowance() {
    let (_dir, pool) = setup();
    register(&pool, 107);
    set_allowance(&pool, 107, 3);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            perform_gated_action(&pool, 107, || async { Ok::<_, String>(()) })
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    // 10 racing requests against 3 credits: exactly 3 may win.
    assert_eq!(successes, 3);
    assert_eq!(used_today(&pool, 107), 3);
}

#[tokio::test]
async fn stale_quota_rolls_over_before_the_check() {
    let (_dir, pool) = setup();
    register(&pool, 108);
    set_allowance(&pool, 108, 2);

    // Simulate yesterday's fully-spent quota.
    {
        let conn = get_connection(&pool).unwrap();
        conn.execute(
            "UPDATE users SET used_today = 2, last_reset_at = datetime('now', '-1 day')
             WHERE telegram_id = ?1",
            rusqlite::params![108],
        )
        .unwrap();
    }

    let outcome = perform_gated_action(&pool, 108, || async { Ok::<_, String>(()) })
        .await
        .unwrap();

    // New day: the counter restarted and this spend is the first of the day.
    assert_eq!(outcome.remaining, 1);
    assert_eq!(used_today(&pool, 108), 1);
}

#[test]
fn duplicate_registration_loses_on_the_primary_key() {
    let (_dir, pool) = setup();
    let conn = get_connection(&pool).unwrap();

    create_user(&conn, 109, None, None).unwrap();
    let err = create_user(&conn, 109, None, None).unwrap_err();

    assert!(db::is_duplicate_identity(&err));
}

#[test]
fn reset_all_stale_quotas_touches_only_stale_rows() {
    let (_dir, pool) = setup();
    let conn = get_connection(&pool).unwrap();

    create_user(&conn, 110, None, None).unwrap();
    create_user(&conn, 111, None, None).unwrap();
    conn.execute(
        "UPDATE users SET used_today = 4, last_reset_at = datetime('now', '-1 day')
         WHERE telegram_id = 110",
        [],
    )
    .unwrap();
    conn.execute("UPDATE users SET used_today = 2 WHERE telegram_id = 111", []).unwrap();

    assert_eq!(db::count_stale_quotas(&conn).unwrap(), 1);
    assert_eq!(db::reset_all_stale_quotas(&conn).unwrap(), 1);

    assert_eq!(get_user(&conn, 110).unwrap().unwrap().used_today, 0);
    assert_eq!(get_user(&conn, 111).unwrap().unwrap().used_today, 2);
}
