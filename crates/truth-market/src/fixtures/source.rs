//! Fixture Source seam and per-league fetching
//!
//! A failing league never aborts a multi-league run: the error is logged and
//! that league contributes zero fixtures.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use tracing::{info, warn};

use crate::types::{Fixture, FixtureQuery, FixtureStatus};

/// Read-only access to real-world fixtures
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// Fixtures of one competition between two dates (inclusive)
    async fn query(&self, query: &FixtureQuery) -> Result<Vec<Fixture>>;
}

/// Fetch window and pacing for the create run
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// First day of the forward window, relative to today
    pub window_start_days: i64,
    /// Last day of the forward window, relative to today
    pub window_end_days: i64,
    /// Cap on fixtures taken per league
    pub max_per_league: usize,
    /// Pause between league queries (provider rate limit)
    pub league_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            window_start_days: 3,
            window_end_days: 10,
            max_per_league: 2,
            league_delay: Duration::from_secs(6), // free tier: 10 requests/minute
        }
    }
}

/// Default competitions for the create run
pub const DEFAULT_LEAGUES: [&str; 5] = ["PL", "PD", "BL1", "SA", "FL1"];

/// Upcoming fixtures for one league, capped. Errors yield an empty list.
pub async fn fetch_fixtures_for_league(
    source: &dyn FixtureSource,
    code: &str,
    today: NaiveDate,
    config: &FetchConfig,
) -> Vec<Fixture> {
    let query = FixtureQuery {
        competition: code.to_string(),
        date_from: today + ChronoDuration::days(config.window_start_days),
        date_to: today + ChronoDuration::days(config.window_end_days),
        statuses: vec![FixtureStatus::Scheduled, FixtureStatus::Timed],
    };

    match source.query(&query).await {
        Ok(fixtures) => {
            let found = fixtures.len();
            let mut taken: Vec<Fixture> = fixtures
                .into_iter()
                .filter(|f| f.status.is_upcoming())
                .collect();
            taken.sort_by_key(|f| f.kickoff);
            taken.truncate(config.max_per_league);
            info!("{}: {} fixtures found, taking {}", code, found, taken.len());
            taken
        }
        Err(e) => {
            warn!("{}: fixture query failed, skipping league: {:#}", code, e);
            Vec::new()
        }
    }
}

/// Fetch every league in order, pausing between queries
pub async fn fetch_fixtures_for_leagues(
    source: &dyn FixtureSource,
    codes: &[String],
    today: NaiveDate,
    config: &FetchConfig,
) -> Vec<Fixture> {
    let mut all = Vec::new();
    for (i, code) in codes.iter().enumerate() {
        if i > 0 && !config.league_delay.is_zero() {
            tokio::time::sleep(config.league_delay).await;
        }
        all.extend(fetch_fixtures_for_league(source, code, today, config).await);
    }
    info!("Fetched {} fixtures across {} leagues", all.len(), codes.len());
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;

    struct ScriptedSource {
        calls: Mutex<Vec<FixtureQuery>>,
    }

    fn fixture(league: &str, home: &str, kickoff: DateTime<Utc>, status: FixtureStatus) -> Fixture {
        Fixture {
            id: None,
            league: league.to_string(),
            home_team: home.to_string(),
            away_team: "Visitors".to_string(),
            kickoff,
            status,
            score: None,
        }
    }

    #[async_trait]
    impl FixtureSource for ScriptedSource {
        async fn query(&self, query: &FixtureQuery) -> Result<Vec<Fixture>> {
            self.calls.lock().push(query.clone());
            let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 15, 0, 0).unwrap();
            match query.competition.as_str() {
                "PL" => Ok(vec![
                    fixture("PL", "Late", day(12), FixtureStatus::Scheduled),
                    fixture("PL", "Early", day(5), FixtureStatus::Scheduled),
                    // kickoff time confirmed
                    fixture("PL", "Middle", day(8), FixtureStatus::Timed),
                    fixture("PL", "Moved", day(4), FixtureStatus::Postponed),
                ]),
                "PD" => anyhow::bail!("HTTP 503"),
                code => Ok(vec![fixture(code, "Solo", day(6), FixtureStatus::Scheduled)]),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_caps_and_orders_fixtures() {
        let source = ScriptedSource { calls: Mutex::new(Vec::new()) };
        let fixtures =
            fetch_fixtures_for_league(&source, "PL", today(), &FetchConfig::default()).await;

        let homes: Vec<_> = fixtures.iter().map(|f| f.home_team.as_str()).collect();
        assert_eq!(homes, vec!["Early", "Middle"]);

        let calls = source.calls.lock();
        assert_eq!(calls[0].date_from, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        assert_eq!(calls[0].date_to, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(calls[0].statuses, vec![FixtureStatus::Scheduled, FixtureStatus::Timed]);
    }

    #[tokio::test]
    async fn test_failed_league_is_isolated() {
        let source = ScriptedSource { calls: Mutex::new(Vec::new()) };
        let config = FetchConfig { league_delay: Duration::ZERO, ..FetchConfig::default() };
        let codes: Vec<String> = ["PL", "PD", "SA"].iter().map(|s| s.to_string()).collect();

        let fixtures = fetch_fixtures_for_leagues(&source, &codes, today(), &config).await;
        assert_eq!(fixtures.len(), 3);
        assert!(fixtures.iter().all(|f| f.league != "PD"));
        assert_eq!(source.calls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_leagues() {
        let source = ScriptedSource { calls: Mutex::new(Vec::new()) };
        let config = FetchConfig { league_delay: Duration::from_secs(6), ..FetchConfig::default() };
        let codes: Vec<String> = ["SA", "BL1", "FL1"].iter().map(|s| s.to_string()).collect();

        let started = tokio::time::Instant::now();
        fetch_fixtures_for_leagues(&source, &codes, today(), &config).await;
        assert!(started.elapsed() >= Duration::from_secs(12));
    }
}
