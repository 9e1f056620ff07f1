//! Credits: the daily quota engine, the gated-action gateway, and referrals.
//!
//! Every paid feature of the bot and the mini-app goes through
//! [`gateway::perform_gated_action`] — there is no other code path that
//! spends a credit.

pub mod engine;
pub mod gateway;
pub mod referral;

use thiserror::Error;

use crate::core::error::AppError;

/// Outcomes of credit-gated and referral operations.
///
/// The first six variants are expected, user-facing outcomes; only
/// `Persistence` represents an infrastructure failure. When the store is
/// unreachable the safe default is to reject the action (deny on
/// uncertainty) rather than risk granting a credit twice.
#[derive(Error, Debug)]
pub enum CreditError {
    /// No record for this identity; caller should run the registration flow
    #[error("user is not registered")]
    UserNotRegistered,

    /// Daily allowance exhausted — expected, not logged as an error
    #[error("no credits remaining today")]
    NoCreditsRemaining,

    /// Identity was created concurrently; caller should re-load the record
    #[error("user already exists")]
    DuplicateIdentity,

    /// No record owns the supplied referral code
    #[error("invalid referral code")]
    InvalidCode,

    /// This account has already redeemed a referral code
    #[error("referral code already redeemed")]
    AlreadyRedeemed,

    /// A code cannot be redeemed by its own owner
    #[error("cannot redeem your own referral code")]
    SelfReferral,

    /// The delegated operation failed after the debit; the credit has been
    /// refunded (best effort)
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Store unreachable or corrupt — fatal for the current request
    #[error("storage unavailable: {0}")]
    Persistence(#[from] AppError),
}

impl From<rusqlite::Error> for CreditError {
    fn from(err: rusqlite::Error) -> Self {
        CreditError::Persistence(AppError::Database(err))
    }
}

impl From<r2d2::Error> for CreditError {
    fn from(err: r2d2::Error) -> Self {
        CreditError::Persistence(AppError::DatabasePool(err))
    }
}
