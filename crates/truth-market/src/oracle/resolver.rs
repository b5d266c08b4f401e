//! Resolution Oracle - reconciles expired markets against final scores
//!
//! # Design Principles
//! 1. Better to wait than to settle on the wrong match: no match or no final
//!    score means the market is left for the next scan
//! 2. One market's failure never stops the scan
//! 3. Re-running is always safe: resolved markets are skipped, and the ledger
//!    rejects a second resolve
//!
//! # Algorithm (per market id, 0..next_market_id)
//! 1. Skip resolved and still-live markets
//! 2. Identify the fixture: structured `FixtureRef`, else parse the question
//! 3. Query the Fixture Source within +/- N days of the betting deadline
//! 4. Match by provider id when known, else by exact team names
//! 5. FINISHED -> Home/Draw/Away index -> `resolve_market`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::LedgerError;
use crate::fixtures::{parse_question, FixtureSource};
use crate::ledger::MarketLedger;
use crate::types::{Fixture, FixtureQuery, FixtureStatus, Market, MarketId, Resolution};

/// Oracle configuration
#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// Days either side of the betting deadline to search
    pub window_days: i64,
    /// Upper bound on one fixture lookup
    pub lookup_timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self { window_days: 1, lookup_timeout: Duration::from_secs(20) }
    }
}

/// What the oracle decided for one market
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum MarketCheck {
    AlreadyResolved,
    /// Betting still open
    Live,
    /// No fixture reference and the question does not parse
    Unlinked,
    /// Provider returned no matching fixture
    Unmatched,
    /// Fixture found but not finished
    Waiting { status: FixtureStatus },
    Resolved { winning_option_index: usize },
    Voided { winning_option_index: usize },
}

/// Summary of one scan
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned: u64,
    pub skipped_resolved: u64,
    pub skipped_live: u64,
    pub unlinked: u64,
    pub unmatched: u64,
    pub waiting: u64,
    pub resolved: Vec<MarketId>,
    pub voided: Vec<MarketId>,
    /// Markets whose check errored, with the error text
    pub failed: Vec<(MarketId, String)>,
    /// Winning option index of every market resolved or voided in this scan
    pub decisions: Vec<(MarketId, usize)>,
}

impl ScanReport {
    fn record(&mut self, id: MarketId, check: &MarketCheck) {
        match check {
            MarketCheck::AlreadyResolved => self.skipped_resolved += 1,
            MarketCheck::Live => self.skipped_live += 1,
            MarketCheck::Unlinked => self.unlinked += 1,
            MarketCheck::Unmatched => self.unmatched += 1,
            MarketCheck::Waiting { .. } => self.waiting += 1,
            MarketCheck::Resolved { winning_option_index } => {
                self.resolved.push(id);
                self.decisions.push((id, *winning_option_index));
            }
            MarketCheck::Voided { winning_option_index } => {
                self.voided.push(id);
                self.decisions.push((id, *winning_option_index));
            }
        }
    }

    /// Replay this scan's decisions on another copy of the ledger, typically
    /// the latest file reloaded under its lock. Markets already resolved
    /// there are left alone. Returns how many markets were resolved.
    pub fn apply_to(&self, ledger: &MarketLedger, resolver_id: &str) -> Result<usize> {
        let mut applied = 0;
        for &(id, winning_option_index) in &self.decisions {
            match ledger.resolve_market(resolver_id, id, winning_option_index) {
                Ok(_) => applied += 1,
                Err(LedgerError::AlreadyResolved(_)) => {
                    debug!("Market #{} already resolved on disk, skipping", id);
                }
                Err(e) => return Err(e).with_context(|| format!("Failed to apply market #{}", id)),
            }
        }
        Ok(applied)
    }
}

/// Fixture identity the oracle searches for
struct FixtureTarget {
    fixture_id: Option<u64>,
    competition: String,
    home_team: String,
    away_team: String,
}

impl FixtureTarget {
    fn for_market(market: &Market) -> Option<Self> {
        if let Some(link) = &market.fixture {
            return Some(Self {
                fixture_id: link.fixture_id,
                competition: link.competition.clone(),
                home_team: link.home_team.clone(),
                away_team: link.away_team.clone(),
            });
        }
        parse_question(&market.question).map(|p| Self {
            fixture_id: None,
            competition: p.league,
            home_team: p.home_team,
            away_team: p.away_team,
        })
    }

    fn matches(&self, fixture: &Fixture) -> bool {
        match (self.fixture_id, fixture.id) {
            (Some(want), Some(got)) => want == got,
            _ => fixture.home_team == self.home_team && fixture.away_team == self.away_team,
        }
    }
}

/// Resolution Oracle
pub struct ResolutionOracle {
    ledger: Arc<MarketLedger>,
    source: Arc<dyn FixtureSource>,
    resolver_id: String,
    config: OracleConfig,
    scan_guard: Mutex<()>,
}

impl ResolutionOracle {
    /// Create an oracle acting as `resolver_id`
    pub fn new(
        ledger: Arc<MarketLedger>,
        source: Arc<dyn FixtureSource>,
        resolver_id: impl Into<String>,
    ) -> Self {
        Self::with_config(ledger, source, resolver_id, OracleConfig::default())
    }

    pub fn with_config(
        ledger: Arc<MarketLedger>,
        source: Arc<dyn FixtureSource>,
        resolver_id: impl Into<String>,
        config: OracleConfig,
    ) -> Self {
        Self { ledger, source, resolver_id: resolver_id.into(), config, scan_guard: Mutex::new(()) }
    }

    /// Run one full scan. Fails only if another scan on this oracle is running.
    pub async fn scan(&self, asof: DateTime<Utc>) -> Result<ScanReport> {
        let _guard = self
            .scan_guard
            .try_lock()
            .map_err(|_| anyhow::anyhow!("Resolution scan already in progress"))?;

        let total = self.ledger.next_market_id();
        info!("Starting resolution scan over {} markets (asof {})", total, asof);

        let mut report = ScanReport::default();
        for id in 0..total {
            report.scanned += 1;
            match self.check_market(id, asof).await {
                Ok(check) => report.record(id, &check),
                Err(e) => {
                    error!("Error processing market #{}: {:#}", id, e);
                    report.failed.push((id, format!("{:#}", e)));
                }
            }
        }

        info!(
            "Resolution scan complete: {} resolved, {} voided, {} waiting, {} unmatched, {} failed",
            report.resolved.len(),
            report.voided.len(),
            report.waiting,
            report.unmatched,
            report.failed.len()
        );
        Ok(report)
    }

    /// Reconcile a single market
    pub async fn check_market(&self, id: MarketId, asof: DateTime<Utc>) -> Result<MarketCheck> {
        let market = self.ledger.market(id).with_context(|| format!("Market #{} not found", id))?;

        if market.resolved {
            return Ok(MarketCheck::AlreadyResolved);
        }
        if asof < market.betting_ends_at {
            debug!("Market #{} still live until {}", id, market.betting_ends_at);
            return Ok(MarketCheck::Live);
        }

        info!("Checking market #{}: \"{}\" (expired)", id, market.question);

        let Some(target) = FixtureTarget::for_market(&market) else {
            warn!(
                "Market #{}: no fixture link and question does not parse: \"{}\"",
                id, market.question
            );
            return Ok(MarketCheck::Unlinked);
        };

        let query = FixtureQuery::around(
            &target.competition,
            market.betting_ends_at,
            self.config.window_days,
        );
        let fixtures = tokio::time::timeout(self.config.lookup_timeout, self.source.query(&query))
            .await
            .map_err(|_| {
                anyhow::anyhow!("Fixture lookup timed out after {:?}", self.config.lookup_timeout)
            })?
            .with_context(|| format!("Fixture lookup failed for {}", target.competition))?;

        let Some(fixture) = fixtures.iter().find(|f| target.matches(f)) else {
            info!(
                "Market #{}: match not found for {} vs {}",
                id, target.home_team, target.away_team
            );
            return Ok(MarketCheck::Unmatched);
        };

        if fixture.status != FixtureStatus::Finished {
            info!("Market #{}: match status {:?}, waiting", id, fixture.status);
            return Ok(MarketCheck::Waiting { status: fixture.status });
        }

        let score = fixture
            .score
            .with_context(|| {
                format!(
                    "Match {} vs {} finished without a score",
                    fixture.home_team, fixture.away_team
                )
            })?;
        let winning_option_index = score.outcome_index();
        info!(
            "Market #{}: finished {}-{}, resolving with option {}",
            id, score.home, score.away, winning_option_index
        );

        let resolution = self.ledger.resolve_market(&self.resolver_id, id, winning_option_index)?;
        Ok(match resolution {
            Resolution::Voided => MarketCheck::Voided { winning_option_index },
            Resolution::Settled(_) => MarketCheck::Resolved { winning_option_index },
        })
    }
}
