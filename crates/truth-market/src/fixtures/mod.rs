//! Fixture Source Adapter and Market Formatter
//!
//! # Components
//! - `FixtureSource`: read-only query seam over a fixture provider
//! - `FootballDataClient`: football-data.org v4 implementation
//! - `fetch_fixtures_for_league(s)`: windowed, capped, failure-isolated fetching
//! - `formatter`: fixture -> market draft, plus the legacy question parser

mod client;
pub mod formatter;
pub mod source;

pub use client::FootballDataClient;
pub use formatter::{format_market, format_markets, parse_question, ParsedQuestion};
pub use source::{
    fetch_fixtures_for_league, fetch_fixtures_for_leagues, FetchConfig, FixtureSource,
    DEFAULT_LEAGUES,
};
