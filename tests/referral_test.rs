//! Integration tests for the referral program
//!
//! Run with: cargo test --test referral_test

use std::sync::Arc;

use pretty_assertions::assert_eq;

use kopilka::core::config;
use kopilka::credits::referral::apply_referral_code;
use kopilka::credits::CreditError;
use kopilka::storage::db::{create_user, get_user, DbPool, User};
use kopilka::storage::{create_pool, get_connection};

fn setup() -> (tempfile::TempDir, Arc<DbPool>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.sqlite");
    let pool = create_pool(path.to_str().unwrap()).expect("pool");
    (dir, Arc::new(pool))
}

fn register(pool: &Arc<DbPool>, telegram_id: i64) -> User {
    let conn = get_connection(pool).unwrap();
    create_user(&conn, telegram_id, None, None).unwrap()
}

fn load(pool: &Arc<DbPool>, telegram_id: i64) -> User {
    let conn = get_connection(pool).unwrap();
    get_user(&conn, telegram_id).unwrap().unwrap()
}

#[test]
fn valid_code_raises_both_allowances() {
    let (_dir, pool) = setup();
    let referrer = register(&pool, 1);
    let friend = register(&pool, 2);
    let bonus = *config::credits::REFERRAL_BONUS;

    let outcome = {
        let conn = get_connection(&pool).unwrap();
        apply_referral_code(&conn, 2, &referrer.referral_code).unwrap()
    };

    assert_eq!(outcome.bonus, bonus);
    assert_eq!(outcome.referrer_id, 1);

    let referrer_after = load(&pool, 1);
    let friend_after = load(&pool, 2);

    assert_eq!(referrer_after.daily_allowance, referrer.daily_allowance + bonus);
    assert_eq!(referrer_after.referral_count, 1);
    assert_eq!(friend_after.daily_allowance, friend.daily_allowance + bonus);
    assert_eq!(friend_after.referred_by.as_deref(), Some(referrer.referral_code.as_str()));
}

#[test]
fn codes_are_case_insensitive_on_input() {
    let (_dir, pool) = setup();
    let referrer = register(&pool, 3);
    register(&pool, 4);

    let conn = get_connection(&pool).unwrap();
    let lowered = format!("  {}  ", referrer.referral_code.to_lowercase());
    let outcome = apply_referral_code(&conn, 4, &lowered).unwrap();

    assert_eq!(outcome.referrer_id, 3);
}

#[test]
fn second_redemption_is_rejected() {
    let (_dir, pool) = setup();
    let first = register(&pool, 5);
    let second = register(&pool, 6);
    let friend = register(&pool, 7);

    let conn = get_connection(&pool).unwrap();
    apply_referral_code(&conn, 7, &first.referral_code).unwrap();

    let result = apply_referral_code(&conn, 7, &second.referral_code);
    assert!(matches!(result, Err(CreditError::AlreadyRedeemed)));

    // The second referrer got nothing.
    let second_after = load(&pool, 6);
    assert_eq!(second_after.daily_allowance, second.daily_allowance);
    assert_eq!(second_after.referral_count, 0);

    // And the friend's allowance grew exactly once.
    let bonus = *config::credits::REFERRAL_BONUS;
    assert_eq!(load(&pool, 7).daily_allowance, friend.daily_allowance + bonus);
}

#[test]
fn self_referral_is_rejected() {
    let (_dir, pool) = setup();
    let user = register(&pool, 8);

    let conn = get_connection(&pool).unwrap();
    let result = apply_referral_code(&conn, 8, &user.referral_code);

    assert!(matches!(result, Err(CreditError::SelfReferral)));
    assert_eq!(load(&pool, 8).daily_allowance, user.daily_allowance);
}

#[test]
fn unknown_or_malformed_codes_are_rejected() {
    let (_dir, pool) = setup();
    register(&pool, 9);

    let conn = get_connection(&pool).unwrap();

    assert!(matches!(
        apply_referral_code(&conn, 9, "ZZZZZZZZ"),
        Err(CreditError::InvalidCode)
    ));
    assert!(matches!(
        apply_referral_code(&conn, 9, "short"),
        Err(CreditError::InvalidCode)
    ));
    assert!(matches!(
        apply_referral_code(&conn, 9, ""),
        Err(CreditError::InvalidCode)
    ));
}

#[test]
fn unregistered_redeemer_is_rejected() {
    let (_dir, pool) = setup();
    let referrer = register(&pool, 10);

    let conn = get_connection(&pool).unwrap();
    let result = apply_referral_code(&conn, 999, &referrer.referral_code);

    assert!(matches!(result, Err(CreditError::UserNotRegistered)));
}

#[test]
fn every_new_user_gets_a_distinct_code() {
    let (_dir, pool) = setup();

    let a = register(&pool, 11);
    let b = register(&pool, 12);
    let c = register(&pool, 13);

    assert_ne!(a.referral_code, b.referral_code);
    assert_ne!(b.referral_code, c.referral_code);
    assert_eq!(a.referral_code.len(), config::credits::REFERRAL_CODE_LEN);
}
