//! Domain and provider types
//!
//! # Design Principles
//! 1. Amounts are integer base units (`u128`), never floats
//! 2. Market ids are dense indexes into an append-only table
//! 3. Provider payloads keep unknown fields in `#[serde(flatten)] extra`
//! 4. Unknown provider statuses fall back to `FixtureStatus::Unknown` - never fail a parse
//!
//! # Sources
//! - Match resource: https://docs.football-data.org/general/v4/match.html

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dense market identifier assigned from the ledger counter
pub type MarketId = u64;

/// Token amount in base units
pub type Amount = u128;

// ============================================================================
// Markets and Bets
// ============================================================================

/// Structured link from a market to the real-world fixture it settles on
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureRef {
    /// Provider fixture id, when the market was created from provider data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture_id: Option<u64>,
    /// Competition code (e.g. "PL")
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    /// Scheduled kickoff
    pub kickoff: DateTime<Utc>,
}

/// Figures fixed at resolution time for a non-void market
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub winning_option_index: usize,
    /// Stake on the winning option
    pub winning_pool: Amount,
    /// Protocol fee actually taken (0 when waived)
    pub fee: Amount,
    /// Amount distributed to winners
    pub net_pot: Amount,
    /// Fee was waived to keep winners whole
    pub fee_waived: bool,
}

/// A pari-mutuel market
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Market {
    pub id: MarketId,
    pub question: String,
    /// Mutually exclusive outcome labels, at least 2
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Bets are accepted strictly before this instant
    pub betting_ends_at: DateTime<Utc>,
    pub resolved: bool,
    pub voided: bool,
    /// Only meaningful when `resolved && !voided`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_option_index: Option<usize>,
    /// Stake per option index
    pub option_pools: Vec<Amount>,
    /// Always equals the sum of `option_pools`
    pub total_pool: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<FixtureRef>,
}

impl Market {
    /// Betting window is open at `asof`
    pub fn is_open(&self, asof: DateTime<Utc>) -> bool {
        !self.resolved && asof < self.betting_ends_at
    }

    /// Lifecycle state as seen at `asof`
    pub fn state(&self, asof: DateTime<Utc>) -> MarketState {
        if self.voided {
            MarketState::Voided
        } else if let (true, Some(index)) = (self.resolved, self.winning_option_index) {
            MarketState::Resolved { winning_option_index: index }
        } else if asof < self.betting_ends_at {
            MarketState::Open
        } else {
            MarketState::ExpiredUnresolved
        }
    }

    /// Check the pool invariant: total equals the per-option sum
    pub fn pools_consistent(&self) -> bool {
        self.option_pools.len() == self.options.len()
            && self
                .option_pools
                .iter()
                .try_fold(0u128, |acc, p| acc.checked_add(*p))
                .is_some_and(|sum| sum == self.total_pool)
    }
}

/// Market lifecycle
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarketState {
    Open,
    ExpiredUnresolved,
    Resolved { winning_option_index: usize },
    Voided,
}

/// A single stake. Users may hold several per market, even on the same option.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bet {
    pub market_id: MarketId,
    pub user: String,
    pub option_index: usize,
    pub amount: Amount,
    pub placed_at: DateTime<Utc>,
    pub claimed: bool,
}

/// Validated input for one market in a creation batch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketDraft {
    pub question: String,
    pub options: Vec<String>,
    /// Seconds from creation until betting closes
    pub duration_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<FixtureRef>,
}

/// Outcome of `resolve_market`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// One side had no stake; every bettor is refunded in full
    Voided,
    Settled(Settlement),
}

/// Result of a successful claim
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub market_id: MarketId,
    pub user: String,
    /// Amount credited (0 for a losing position)
    pub payout: Amount,
    /// Payout is a principal refund from a voided market
    pub refund: bool,
    /// Number of bets flipped to claimed
    pub bets_claimed: usize,
}

// ============================================================================
// Fixture Provider Types
// Source: https://docs.football-data.org/general/v4/match.html
// ============================================================================

/// Match status as reported by the provider
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixtureStatus {
    Scheduled,
    Timed,
    InPlay,
    Paused,
    Finished,
    Postponed,
    Suspended,
    Cancelled,
    Awarded,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

impl FixtureStatus {
    /// Wire value used in `status=` query filters
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureStatus::Scheduled => "SCHEDULED",
            FixtureStatus::Timed => "TIMED",
            FixtureStatus::InPlay => "IN_PLAY",
            FixtureStatus::Paused => "PAUSED",
            FixtureStatus::Finished => "FINISHED",
            FixtureStatus::Postponed => "POSTPONED",
            FixtureStatus::Suspended => "SUSPENDED",
            FixtureStatus::Cancelled => "CANCELLED",
            FixtureStatus::Awarded => "AWARDED",
            FixtureStatus::Unknown => "UNKNOWN",
        }
    }

    /// Not yet kicked off. The provider reports `TIMED` once kickoff is fixed.
    pub fn is_upcoming(&self) -> bool {
        matches!(self, FixtureStatus::Scheduled | FixtureStatus::Timed)
    }
}

/// Full-time score
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalScore {
    pub home: u32,
    pub away: u32,
}

impl FinalScore {
    /// Winning index under the Home/Draw/Away schema
    pub fn outcome_index(&self) -> usize {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => 0,
            std::cmp::Ordering::Equal => 1,
            std::cmp::Ordering::Less => 2,
        }
    }
}

/// A real-world event. Read-only input, never persisted as-is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fixture {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
    /// Present once the match is finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<FinalScore>,
}

impl Fixture {
    /// Structured reference stored on the market created from this fixture
    pub fn to_ref(&self) -> FixtureRef {
        FixtureRef {
            fixture_id: self.id,
            competition: self.league.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            kickoff: self.kickoff,
        }
    }
}

/// Fixture Source query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixtureQuery {
    pub competition: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Accepted statuses; empty means any
    pub statuses: Vec<FixtureStatus>,
}

impl FixtureQuery {
    /// Matches within `days` either side of `center`
    pub fn around(competition: &str, center: DateTime<Utc>, days: i64) -> Self {
        Self {
            competition: competition.to_string(),
            date_from: (center - Duration::days(days)).date_naive(),
            date_to: (center + Duration::days(days)).date_naive(),
            statuses: Vec::new(),
        }
    }
}

/// Team object inside a provider match
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTeam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Null for undecided knockout slots
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Home/away goal pair; both null before kickoff
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiScoreLine {
    #[serde(default)]
    pub home: Option<u32>,
    #[serde(default)]
    pub away: Option<u32>,
}

/// Score block of a provider match
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScore {
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub full_time: ApiScoreLine,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Competition summary embedded in a match
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiCompetition {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Match object from GET /competitions/{code}/matches
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMatch {
    pub id: u64,
    /// Kickoff (ISO 8601, UTC)
    pub utc_date: DateTime<Utc>,
    pub status: FixtureStatus,
    pub home_team: ApiTeam,
    pub away_team: ApiTeam,
    #[serde(default)]
    pub score: ApiScore,
    #[serde(default)]
    pub competition: Option<ApiCompetition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiMatch {
    /// Convert to a domain fixture. Returns None while either team is undecided.
    pub fn into_fixture(self, requested_competition: &str) -> Option<Fixture> {
        let home_team = self.home_team.name?;
        let away_team = self.away_team.name?;
        let league = self
            .competition
            .and_then(|c| c.code)
            .unwrap_or_else(|| requested_competition.to_string());
        let score = match (self.score.full_time.home, self.score.full_time.away) {
            (Some(home), Some(away)) => Some(FinalScore { home, away }),
            _ => None,
        };

        Some(Fixture {
            id: Some(self.id),
            league,
            home_team,
            away_team,
            kickoff: self.utc_date,
            status: self.status,
            score,
        })
    }
}

/// Envelope of GET /competitions/{code}/matches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchesResponse {
    #[serde(default)]
    pub matches: Vec<ApiMatch>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn market(ends_at: DateTime<Utc>) -> Market {
        Market {
            id: 0,
            question: "[PL] Arsenal FC vs Chelsea FC".to_string(),
            options: SPORTS.iter().map(|s| s.to_string()).collect(),
            created_at: ends_at - Duration::hours(1),
            betting_ends_at: ends_at,
            resolved: false,
            voided: false,
            winning_option_index: None,
            option_pools: vec![10, 0, 5],
            total_pool: 15,
            settlement: None,
            fixture: None,
        }
    }

    const SPORTS: [&str; 3] = crate::SPORTS_OUTCOMES;

    #[test]
    fn test_market_state_transitions() {
        let ends = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        let mut m = market(ends);
        assert_eq!(m.state(ends - Duration::seconds(1)), MarketState::Open);
        assert_eq!(m.state(ends), MarketState::ExpiredUnresolved);
        assert!(!m.is_open(ends));

        m.resolved = true;
        m.winning_option_index = Some(2);
        assert_eq!(m.state(ends), MarketState::Resolved { winning_option_index: 2 });

        m.voided = true;
        m.winning_option_index = None;
        assert_eq!(m.state(ends), MarketState::Voided);
    }

    #[test]
    fn test_pools_consistent() {
        let ends = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        let mut m = market(ends);
        assert!(m.pools_consistent());
        m.total_pool = 16;
        assert!(!m.pools_consistent());
    }

    #[test]
    fn test_outcome_index() {
        assert_eq!(FinalScore { home: 2, away: 1 }.outcome_index(), 0);
        assert_eq!(FinalScore { home: 1, away: 1 }.outcome_index(), 1);
        assert_eq!(FinalScore { home: 0, away: 3 }.outcome_index(), 2);
    }

    #[test]
    fn test_parse_finished_match() {
        let json = r#"{
            "id": 497410,
            "utcDate": "2024-08-16T19:00:00Z",
            "status": "FINISHED",
            "matchday": 1,
            "homeTeam": {"id": 66, "name": "Manchester United FC", "shortName": "Man United"},
            "awayTeam": {"id": 63, "name": "Fulham FC", "shortName": "Fulham"},
            "score": {"winner": "HOME_TEAM", "duration": "REGULAR",
                      "fullTime": {"home": 1, "away": 0}, "halfTime": {"home": 0, "away": 0}},
            "competition": {"id": 2021, "name": "Premier League", "code": "PL"}
        }"#;

        let api: ApiMatch = serde_json::from_str(json).unwrap();
        assert!(api.extra.contains_key("matchday"));

        let fixture = api.into_fixture("XX").unwrap();
        assert_eq!(fixture.id, Some(497410));
        assert_eq!(fixture.league, "PL");
        assert_eq!(fixture.home_team, "Manchester United FC");
        assert_eq!(fixture.status, FixtureStatus::Finished);
        assert_eq!(fixture.score, Some(FinalScore { home: 1, away: 0 }));
    }

    #[test]
    fn test_parse_scheduled_match_without_score() {
        let json = r#"{
            "id": 1,
            "utcDate": "2025-05-10T14:00:00Z",
            "status": "TIMED",
            "homeTeam": {"id": 1, "name": "A"},
            "awayTeam": {"id": 2, "name": "B"},
            "score": {"winner": null, "fullTime": {"home": null, "away": null}}
        }"#;

        let fixture = serde_json::from_str::<ApiMatch>(json).unwrap().into_fixture("PD").unwrap();
        assert_eq!(fixture.league, "PD");
        assert_eq!(fixture.status, FixtureStatus::Timed);
        assert!(fixture.score.is_none());
    }

    #[test]
    fn test_upcoming_statuses() {
        assert!(FixtureStatus::Scheduled.is_upcoming());
        assert!(FixtureStatus::Timed.is_upcoming());
        assert!(!FixtureStatus::InPlay.is_upcoming());
        assert!(!FixtureStatus::Postponed.is_upcoming());
        assert!(!FixtureStatus::Finished.is_upcoming());
    }

    #[test]
    fn test_unknown_status_and_undecided_team() {
        let json = r#"{
            "id": 2,
            "utcDate": "2025-05-10T14:00:00Z",
            "status": "SOME_FUTURE_STATUS",
            "homeTeam": {"id": null, "name": null},
            "awayTeam": {"id": 2, "name": "B"}
        }"#;

        let api: ApiMatch = serde_json::from_str(json).unwrap();
        assert_eq!(api.status, FixtureStatus::Unknown);
        assert!(api.into_fixture("CL").is_none());
    }

    #[test]
    fn test_fixture_query_window() {
        let center = Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap();
        let q = FixtureQuery::around("PL", center, 1);
        assert_eq!(q.date_from, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(q.date_to, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert!(q.statuses.is_empty());
    }
}
