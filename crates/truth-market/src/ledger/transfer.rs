//! Token transfer seam
//!
//! The ledger never holds balances itself. Bets call `debit` before any pool
//! update and claims call `credit` before flipping claimed flags, so a failed
//! transfer leaves the market untouched.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransferError;
use crate::types::Amount;

/// External value-transfer capability. Each call is atomic.
pub trait TokenTransfer: Send + Sync {
    /// Take `amount` from `user` into escrow
    fn debit(&self, user: &str, amount: Amount) -> Result<(), TransferError>;

    /// Pay `amount` from escrow to `user`
    fn credit(&self, user: &str, amount: Amount) -> Result<(), TransferError>;
}

/// In-memory balances with an escrow counter
#[derive(Default)]
pub struct BalanceBook {
    inner: Mutex<BookState>,
}

#[derive(Default)]
struct BookState {
    balances: HashMap<String, Amount>,
    escrow: Amount,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add funds to a user's balance
    pub fn deposit(&self, user: &str, amount: Amount) -> Result<(), TransferError> {
        let mut state = self.inner.lock();
        let balance = state.balances.entry(user.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::BalanceOverflow { user: user.to_string() })?;
        Ok(())
    }

    pub fn balance(&self, user: &str) -> Amount {
        self.inner.lock().balances.get(user).copied().unwrap_or(0)
    }

    /// Funds currently held on behalf of open positions
    pub fn escrow(&self) -> Amount {
        self.inner.lock().escrow
    }
}

impl TokenTransfer for BalanceBook {
    fn debit(&self, user: &str, amount: Amount) -> Result<(), TransferError> {
        let mut state = self.inner.lock();
        let available = state.balances.get(user).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                user: user.to_string(),
                needed: amount,
                available,
            });
        }
        let escrow = state
            .escrow
            .checked_add(amount)
            .ok_or_else(|| TransferError::BalanceOverflow { user: user.to_string() })?;
        state.balances.insert(user.to_string(), available - amount);
        state.escrow = escrow;
        debug!("debit {} from {}", amount, user);
        Ok(())
    }

    fn credit(&self, user: &str, amount: Amount) -> Result<(), TransferError> {
        let mut state = self.inner.lock();
        if state.escrow < amount {
            return Err(TransferError::Unavailable(format!(
                "escrow holds {}, cannot pay {}",
                state.escrow, amount
            )));
        }
        let current = state.balances.get(user).copied().unwrap_or(0);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| TransferError::BalanceOverflow { user: user.to_string() })?;
        state.escrow -= amount;
        state.balances.insert(user.to_string(), updated);
        debug!("credit {} to {}", amount, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_and_credit() {
        let book = BalanceBook::new();
        book.deposit("alice", 100).unwrap();

        book.debit("alice", 60).unwrap();
        assert_eq!(book.balance("alice"), 40);
        assert_eq!(book.escrow(), 60);

        book.credit("bob", 60).unwrap();
        assert_eq!(book.balance("bob"), 60);
        assert_eq!(book.escrow(), 0);
    }

    #[test]
    fn test_insufficient_balance_leaves_state() {
        let book = BalanceBook::new();
        book.deposit("alice", 10).unwrap();

        let err = book.debit("alice", 11).unwrap_err();
        assert!(matches!(
            err,
            TransferError::InsufficientBalance { needed: 11, available: 10, .. }
        ));
        assert_eq!(book.balance("alice"), 10);
        assert_eq!(book.escrow(), 0);
    }

    #[test]
    fn test_credit_beyond_escrow_fails() {
        let book = BalanceBook::new();
        assert!(book.credit("alice", 1).is_err());
        assert_eq!(book.balance("alice"), 0);
    }
}
