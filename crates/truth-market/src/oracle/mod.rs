//! Resolution Oracle
//!
//! Periodically walks every market, finds expired unresolved ones, looks up
//! the final score of the linked fixture and resolves the market with the
//! Home/Draw/Away outcome index.

mod resolver;

pub use resolver::{MarketCheck, OracleConfig, ResolutionOracle, ScanReport};
