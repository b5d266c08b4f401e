//! Market/Bet ledger and settlement engine
//!
//! # Components
//! - `MarketLedger`: append-only market table with per-market locking
//! - `settlement`: fee, void and payout math
//! - `TokenTransfer`: debit/credit seam to the external token ledger
//! - `LedgerSnapshot`: JSON persistence shared by the create and resolve runs

pub mod settlement;
mod snapshot;
mod store;
mod transfer;

pub use snapshot::{LedgerFileLock, LedgerSnapshot, SNAPSHOT_VERSION};
pub use store::MarketLedger;
pub use transfer::{BalanceBook, TokenTransfer};
