//! Truth Market
//!
//! Pari-mutuel prediction markets on real-world sports fixtures.
//!
//! # Components
//! - `ledger`: market/bet store and settlement engine (resolve, claim)
//! - `fixtures`: football-data.org client, per-league fetch and market formatter
//! - `submitter`: budgeted, all-or-nothing batch submission to the ledger
//! - `oracle`: scheduled reconciliation of expired markets against final scores
//!
//! # Provider Documentation
//! - football-data.org v4: https://docs.football-data.org/general/v4/index.html
//! - Match resource: https://docs.football-data.org/general/v4/match.html

pub mod config;
pub mod error;
pub mod fixtures;
pub mod ledger;
pub mod oracle;
pub mod submitter;
pub mod types;

pub use error::*;
pub use types::*;

/// football-data.org v4 REST base URL
pub const FOOTBALL_DATA_API_BASE: &str = "https://api.football-data.org/v4";

/// Protocol fee in basis points (5%)
pub const FEE_RATE_BPS: u128 = 500;

/// Basis point denominator
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Markets are never created with less than this much betting time
pub const MIN_MARKET_DURATION_SECS: i64 = 60;

/// Fixed outcome schema for every sports market, indexed Home/Draw/Away
pub const SPORTS_OUTCOMES: [&str; 3] = ["Home Win", "Draw", "Away Win"];
