use thiserror::Error;

use crate::types::{Amount, MarketId};

/// Coarse error classes shared by every ledger entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state change
    Validation,
    /// Call is not allowed in the market's current state
    State,
    /// Caller is not the resolver identity
    Authorization,
    /// External token transfer failed
    Transfer,
}

/// Errors raised by the external token-transfer capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient balance for {user}: needed {needed}, available {available}")]
    InsufficientBalance { user: String, needed: Amount, available: Amount },

    #[error("balance overflow for {user}")]
    BalanceOverflow { user: String },

    #[error("transfer unavailable: {0}")]
    Unavailable(String),
}

/// Market/bet ledger and settlement errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("mismatched arrays: {questions} questions, {options} options, {durations} durations")]
    MismatchedArrays { questions: usize, options: usize, durations: usize },

    #[error("batch entry {index}: question is empty")]
    EmptyQuestion { index: usize },

    #[error("batch entry {index}: at least 2 options required, got {got}")]
    TooFewOptions { index: usize, got: usize },

    #[error("batch entry {index}: option label '{label}' is empty or duplicated")]
    InvalidOptionLabel { index: usize, label: String },

    #[error("batch entry {index}: duration must be positive, got {secs}s")]
    InvalidDuration { index: usize, secs: i64 },

    #[error("market {market_id}: option index {index} out of range ({options} options)")]
    InvalidOptionIndex { market_id: MarketId, index: usize, options: usize },

    #[error("bet amount must be greater than zero")]
    ZeroAmount,

    #[error("amount arithmetic overflowed")]
    ArithmeticOverflow,

    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    #[error("market {market_id}: betting is closed ({reason})")]
    BettingClosed { market_id: MarketId, reason: &'static str },

    #[error("market {0} is already resolved")]
    AlreadyResolved(MarketId),

    #[error("market {0} is not resolved yet")]
    NotResolved(MarketId),

    #[error("market {market_id}: nothing to claim for {user}")]
    NothingToClaim { market_id: MarketId, user: String },

    #[error("market {market_id}: {user} has already claimed")]
    DoubleClaim { market_id: MarketId, user: String },

    #[error("{caller} is not the authorized resolver")]
    Unauthorized { caller: String },

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

impl LedgerError {
    /// Classify this error into the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::MismatchedArrays { .. }
            | LedgerError::EmptyQuestion { .. }
            | LedgerError::TooFewOptions { .. }
            | LedgerError::InvalidOptionLabel { .. }
            | LedgerError::InvalidDuration { .. }
            | LedgerError::InvalidOptionIndex { .. }
            | LedgerError::ZeroAmount
            | LedgerError::ArithmeticOverflow => ErrorKind::Validation,
            LedgerError::MarketNotFound(_)
            | LedgerError::BettingClosed { .. }
            | LedgerError::AlreadyResolved(_)
            | LedgerError::NotResolved(_)
            | LedgerError::NothingToClaim { .. }
            | LedgerError::DoubleClaim { .. } => ErrorKind::State,
            LedgerError::Unauthorized { .. } => ErrorKind::Authorization,
            LedgerError::Transfer(_) => ErrorKind::Transfer,
        }
    }
}

/// Batch submission failures. The whole batch is rolled back in every case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("gas limit {limit} exceeds per-submission cap {cap}")]
    LimitAboveCap { limit: u64, cap: u64 },

    #[error("out of gas: batch needs {required}, limit is {limit}")]
    OutOfGas { required: u64, limit: u64 },

    #[error("store rejected batch: {0}")]
    Rejected(#[source] LedgerError),

    #[error("submission not confirmed: {0}")]
    Unconfirmed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LedgerError::MismatchedArrays { questions: 3, options: 2, durations: 3 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(LedgerError::AlreadyResolved(4).kind(), ErrorKind::State);
        assert_eq!(
            LedgerError::Unauthorized { caller: "mallory".to_string() }.kind(),
            ErrorKind::Authorization
        );
        let transfer: LedgerError = TransferError::Unavailable("down".to_string()).into();
        assert_eq!(transfer.kind(), ErrorKind::Transfer);
    }

    #[test]
    fn test_error_messages() {
        let err = LedgerError::MismatchedArrays { questions: 3, options: 2, durations: 3 };
        assert!(err.to_string().contains("mismatched arrays"));

        let err = SubmissionError::OutOfGas { required: 10, limit: 5 };
        assert_eq!(err.to_string(), "out of gas: batch needs 10, limit is 5");
    }
}
