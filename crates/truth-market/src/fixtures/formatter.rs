//! Market Formatter
//!
//! Fixture -> market draft:
//! - question: `[LEAGUE] Home vs Away`
//! - options: Home Win / Draw / Away Win
//! - duration: seconds until kickoff, never below the minimum
//!
//! The draft also carries a `FixtureRef`, so the oracle does not depend on
//! the question wording. `parse_question` exists only for markets created
//! without that reference.

use chrono::{DateTime, Utc};

use crate::types::{Fixture, MarketDraft};
use crate::{MIN_MARKET_DURATION_SECS, SPORTS_OUTCOMES};

/// Teams and league recovered from a question string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQuestion {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
}

pub fn question_for(fixture: &Fixture) -> String {
    format!("[{}] {} vs {}", fixture.league, fixture.home_team, fixture.away_team)
}

/// The fixed Home/Draw/Away option list
pub fn sports_options() -> Vec<String> {
    SPORTS_OUTCOMES.iter().map(|s| s.to_string()).collect()
}

/// Build the market draft for one fixture
pub fn format_market(fixture: &Fixture, asof: DateTime<Utc>) -> MarketDraft {
    let until_kickoff = (fixture.kickoff - asof).num_seconds();
    MarketDraft {
        question: question_for(fixture),
        options: sports_options(),
        duration_secs: until_kickoff.max(MIN_MARKET_DURATION_SECS),
        fixture: Some(fixture.to_ref()),
    }
}

pub fn format_markets(fixtures: &[Fixture], asof: DateTime<Utc>) -> Vec<MarketDraft> {
    fixtures.iter().map(|f| format_market(f, asof)).collect()
}

/// Inverse of `question_for`. Returns None for any other wording.
pub fn parse_question(question: &str) -> Option<ParsedQuestion> {
    let rest = question.strip_prefix('[')?;
    let (league, teams) = rest.split_once("] ")?;
    let (home, away) = teams.split_once(" vs ")?;
    if league.is_empty() || home.is_empty() || away.is_empty() {
        return None;
    }
    Some(ParsedQuestion {
        league: league.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixtureStatus;
    use chrono::{Duration, TimeZone};

    fn fixture(kickoff: DateTime<Utc>) -> Fixture {
        Fixture {
            id: Some(77),
            league: "PL".to_string(),
            home_team: "Arsenal FC".to_string(),
            away_team: "Tottenham Hotspur FC".to_string(),
            kickoff,
            status: FixtureStatus::Scheduled,
            score: None,
        }
    }

    #[test]
    fn test_format_market() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let draft = format_market(&fixture(now + Duration::days(1)), now);

        assert_eq!(draft.question, "[PL] Arsenal FC vs Tottenham Hotspur FC");
        assert_eq!(draft.options, vec!["Home Win", "Draw", "Away Win"]);
        assert_eq!(draft.duration_secs, 86_400);

        let link = draft.fixture.unwrap();
        assert_eq!(link.fixture_id, Some(77));
        assert_eq!(link.competition, "PL");
        assert_eq!(link.home_team, "Arsenal FC");
    }

    #[test]
    fn test_duration_floor() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_market(&fixture(now + Duration::seconds(10)), now).duration_secs, 60);
        assert_eq!(format_market(&fixture(now - Duration::hours(2)), now).duration_secs, 60);
    }

    #[test]
    fn test_parse_question_round_trip() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let f = fixture(now);
        let parsed = parse_question(&question_for(&f)).unwrap();
        assert_eq!(parsed.league, "PL");
        assert_eq!(parsed.home_team, f.home_team);
        assert_eq!(parsed.away_team, f.away_team);
    }

    #[test]
    fn test_parse_question_rejects_other_wording() {
        assert!(parse_question("Who wins: Arsenal vs Spurs?").is_none());
        assert!(parse_question("[PL] Arsenal - Spurs").is_none());
        assert!(parse_question("[] A vs B").is_none());
        assert!(parse_question("Will it rain?").is_none());
    }
}
