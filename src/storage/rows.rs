//! Row structs and their column mappers.
//!
//! One struct per table shape, mapped by hand from `SqliteRow` so the
//! TEXT decimal columns and status tokens parse into domain types in one
//! place. Mapping failures surface as errors; callers decide whether a
//! bad row aborts the operation or is skipped with a warning.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::parse_opt_decimal;
use crate::bots::rules::{BotAction, RuleSet};
use crate::types::{BetKind, BetOutcome, MatchPhase, OddsTriple, Outcome, Score};

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// A row of `matches` or `ended_matches` (same shape).
#[derive(Debug, Clone, Serialize)]
pub struct MatchRow {
    pub match_id: String,
    pub competition_name: Option<String>,
    /// Sport, e.g. "football".
    pub category: Option<String>,
    pub country: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub event_status: String,
    pub live: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub match_time: String,
}

impl MatchRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(MatchRow {
            match_id: row.try_get("match_id")?,
            competition_name: row.try_get("competition_name")?,
            category: row.try_get("category")?,
            country: row.try_get("country")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
            event_status: row.try_get("event_status")?,
            live: row.try_get("live")?,
            start_time: row.try_get("start_time")?,
            match_time: row.try_get("match_time")?,
        })
    }

    pub fn phase(&self) -> MatchPhase {
        MatchPhase::from_status(&self.event_status)
    }
}

/// The projection live-tick reconciliation works on.
#[derive(Debug, Clone)]
pub struct MatchStateRow {
    pub match_id: String,
    pub live: bool,
    pub event_status: String,
    pub match_time: String,
}

impl MatchStateRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(MatchStateRow {
            match_id: row.try_get("match_id")?,
            live: row.try_get("live")?,
            event_status: row.try_get("event_status")?,
            match_time: row.try_get("match_time")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// A snapshot row, from `odds` or any of the derived view tables.
#[derive(Debug, Clone, Serialize)]
pub struct OddsSnapshotRow {
    pub odds_id: i64,
    pub match_id: String,
    pub event_status: String,
    pub match_time: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub home_win: Option<Decimal>,
    pub draw: Option<Decimal>,
    pub away_win: Option<Decimal>,
    pub fetched_at: DateTime<Utc>,
}

impl OddsSnapshotRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(OddsSnapshotRow {
            odds_id: row.try_get("odds_id")?,
            match_id: row.try_get("match_id")?,
            event_status: row.try_get("event_status")?,
            match_time: row.try_get("match_time")?,
            home_score: row.try_get("home_score")?,
            away_score: row.try_get("away_score")?,
            home_win: parse_opt_decimal(row.try_get("home_win")?)?,
            draw: parse_opt_decimal(row.try_get("draw")?)?,
            away_win: parse_opt_decimal(row.try_get("away_win")?)?,
            fetched_at: row.try_get("fetched_at")?,
        })
    }

    pub fn odds(&self) -> OddsTriple {
        OddsTriple::new(self.home_win, self.draw, self.away_win)
    }

    /// Both scores, or None when either is absent.
    pub fn score(&self) -> Option<Score> {
        Some(Score::new(self.home_score?, self.away_score?))
    }
}

// ---------------------------------------------------------------------------
// Bots, bets, users
// ---------------------------------------------------------------------------

/// A bot with its conditions already parsed into the typed rule set.
#[derive(Debug, Clone)]
pub struct BotRow {
    pub bot_id: i64,
    pub user_id: i64,
    pub name: String,
    pub rules: RuleSet,
    pub action: BotAction,
    pub stake: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl BotRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let conditions: String = row.try_get("conditions")?;
        let action: String = row.try_get("action")?;
        let stake: String = row.try_get("stake")?;
        Ok(BotRow {
            bot_id: row.try_get("bot_id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            rules: serde_json::from_str(&conditions)?,
            action: action.parse()?,
            stake: super::parse_decimal(&stake)?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BetRow {
    pub bet_id: i64,
    pub user_id: i64,
    pub kind: BetKind,
    pub stake: Decimal,
    pub expected_payout: Decimal,
    pub outcome: BetOutcome,
    pub bot_id: Option<i64>,
    pub match_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BetRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let kind: String = row.try_get("kind")?;
        let stake: String = row.try_get("stake")?;
        let expected_payout: String = row.try_get("expected_payout")?;
        let outcome: String = row.try_get("outcome")?;
        Ok(BetRow {
            bet_id: row.try_get("bet_id")?,
            user_id: row.try_get("user_id")?,
            kind: kind.parse()?,
            stake: super::parse_decimal(&stake)?,
            expected_payout: super::parse_decimal(&expected_payout)?,
            outcome: outcome.parse()?,
            bot_id: row.try_get("bot_id")?,
            match_id: row.try_get("match_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BetEventRow {
    pub bet_event_id: i64,
    pub bet_id: i64,
    pub match_id: String,
    pub selection: Outcome,
    pub odds_id: i64,
    pub outcome: BetOutcome,
}

impl BetEventRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let selection: String = row.try_get("selection")?;
        let outcome: String = row.try_get("outcome")?;
        Ok(BetEventRow {
            bet_event_id: row.try_get("bet_event_id")?,
            bet_id: row.try_get("bet_id")?,
            match_id: row.try_get("match_id")?,
            selection: selection.parse()?,
            odds_id: row.try_get("odds_id")?,
            outcome: outcome.parse()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub email: String,
    pub name: Option<String>,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let balance: String = row.try_get("balance")?;
        Ok(UserRow {
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            balance: super::parse_decimal(&balance)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Entities and external results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LeagueRow {
    pub league_id: i64,
    pub name: String,
    pub country_code: Option<String>,
}

impl LeagueRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(LeagueRow {
            league_id: row.try_get("league_id")?,
            name: row.try_get("name")?,
            country_code: row.try_get("country_code")?,
        })
    }
}

/// A stored external result record, raw names plus whatever resolution
/// has succeeded so far (null FKs for the rest).
#[derive(Debug, Clone, Serialize)]
pub struct ExternalResultRow {
    pub result_id: i64,
    pub external_id: i64,
    pub competition_name: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub event_status: Option<String>,
    pub league_id: Option<i64>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub match_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExternalResultRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(ExternalResultRow {
            result_id: row.try_get("result_id")?,
            external_id: row.try_get("external_id")?,
            competition_name: row.try_get("competition_name")?,
            category: row.try_get("category")?,
            country: row.try_get("country")?,
            country_code: row.try_get("country_code")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
            home_score: row.try_get("home_score")?,
            away_score: row.try_get("away_score")?,
            start_time: row.try_get("start_time")?,
            event_status: row.try_get("event_status")?,
            league_id: row.try_get("league_id")?,
            home_team_id: row.try_get("home_team_id")?,
            away_team_id: row.try_get("away_team_id")?,
            match_id: row.try_get("match_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Payload for inserting a new external result.
#[derive(Debug, Clone)]
pub struct NewExternalResult {
    pub external_id: i64,
    pub competition_name: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub event_status: Option<String>,
    pub league_id: Option<i64>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub match_id: Option<String>,
}
