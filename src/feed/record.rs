//! Wire-to-domain parsing for odds feed records.
//!
//! The feed sends one JSON object per match. Odds arrive either as flat
//! `home_odd`/`neutral_odd`/`away_odd` fields (pregame shape) or as an
//! array of named odds groups of which only `"1X2"` is consumed. A record
//! that cannot identify its match, score, or kickoff is dropped; the rest
//! of the batch proceeds.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::clock::normalized_clock;
use crate::types::{OddsTriple, Score};

// ---------------------------------------------------------------------------
// Wire types (feed JSON → Rust)
// ---------------------------------------------------------------------------

/// Raw match record as the feed sends it. Every field is optional on the
/// wire; validation happens in [`FeedRecord::from_wire`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMatch {
    /// Any scalar; coerced to string. Records without one are dropped.
    #[serde(default)]
    pub match_id: Option<serde_json::Value>,
    #[serde(default)]
    pub competition_name: Option<String>,
    /// The feed's country field.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub event_status: Option<String>,
    #[serde(default)]
    pub match_time: Option<String>,
    /// ISO-8601, possibly naive (interpreted at the configured UTC offset).
    #[serde(default)]
    pub start_time: Option<String>,
    /// `"H:A"`, or `"-:-"` meaning 0:0.
    #[serde(default)]
    pub current_score: Option<String>,
    #[serde(default)]
    pub home_odd: Option<serde_json::Value>,
    #[serde(default)]
    pub neutral_odd: Option<serde_json::Value>,
    #[serde(default)]
    pub away_odd: Option<serde_json::Value>,
    #[serde(default)]
    pub odds: Vec<WireOddsGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireOddsGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub odds: Vec<WireOddsEntry>,
}

/// One selection inside an odds group: `"1"` home, `"X"` draw
/// (case-insensitive), `"2"` away.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireOddsEntry {
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub odd_value: Option<serde_json::Value>,
}

/// Which feed a record came from. Pregame records get their status and
/// clock forced regardless of what the wire says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    Live,
    Pregame,
}

// ---------------------------------------------------------------------------
// Parsed record
// ---------------------------------------------------------------------------

/// A validated feed record, ready for ingestion.
#[derive(Debug, Clone)]
pub struct FeedRecord {
    pub match_id: String,
    pub competition_name: Option<String>,
    pub country: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub event_status: String,
    /// Elapsed-clock token, already normalized through the sentinel table.
    pub match_time: String,
    pub start_time: Option<DateTime<Utc>>,
    pub score: Score,
    pub odds: OddsTriple,
    pub fetched_at: DateTime<Utc>,
}

impl FeedRecord {
    /// Parse one wire record. Returns `None` when the record must be
    /// dropped: missing match id, unparsable score, or unparsable kickoff.
    pub fn from_wire(wire: WireMatch, scope: FeedScope, utc_offset_hours: i64) -> Option<Self> {
        let match_id = scalar_to_string(wire.match_id.as_ref())?;

        let start_time = match wire.start_time.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(parse_start_time(raw, utc_offset_hours)?),
        };

        let score = parse_score(wire.current_score.as_deref())?;

        let (event_status, match_time) = match scope {
            FeedScope::Pregame => ("pregame".to_string(), "00:00".to_string()),
            FeedScope::Live => {
                let status = wire.event_status.clone().unwrap_or_default();
                let clock = wire.match_time.clone().unwrap_or_default();
                let normalized = normalized_clock(&status, &clock);
                (status, normalized)
            }
        };

        let odds = extract_odds(&wire, &event_status);

        Some(FeedRecord {
            match_id,
            competition_name: wire.competition_name,
            country: wire.category,
            home_team: wire.home_team,
            away_team: wire.away_team,
            event_status,
            match_time,
            start_time,
            score,
            odds,
            fetched_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// Coerce the wire match id to a string. Null, missing, or empty → `None`.
fn scalar_to_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a wire odds value to a decimal. Absent or null stays `None`;
/// present but unparsable becomes 0.
fn scalar_to_decimal(value: Option<&serde_json::Value>) -> Option<Decimal> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            Some(s.trim().parse::<Decimal>().unwrap_or(Decimal::ZERO))
        }
        serde_json::Value::Number(n) => {
            Some(n.to_string().parse::<Decimal>().unwrap_or(Decimal::ZERO))
        }
        _ => Some(Decimal::ZERO),
    }
}

/// Parse `"H:A"`. Missing, empty, or `"-:-"` means 0:0; anything else that
/// fails to parse drops the record.
fn parse_score(raw: Option<&str>) -> Option<Score> {
    let raw = match raw {
        None | Some("") | Some("-:-") => return Some(Score { home: 0, away: 0 }),
        Some(s) => s,
    };
    let (home, away) = raw.split_once(':')?;
    let home = home.trim().parse::<i64>().ok()?;
    let away = away.trim().parse::<i64>().ok()?;
    Some(Score { home, away })
}

/// Parse a kickoff timestamp. RFC 3339 values keep their own offset; naive
/// values are interpreted at the configured UTC offset. Everything is
/// stored as UTC.
fn parse_start_time(raw: &str, utc_offset_hours: i64) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Some(naive.and_utc() - Duration::hours(utc_offset_hours))
}

/// Pull the 1X2 triple out of a wire record. Flat fields win when present
/// and the record is not live; otherwise the `"1X2"` odds group is used.
/// Later entries for the same selection overwrite earlier ones.
fn extract_odds(wire: &WireMatch, event_status: &str) -> OddsTriple {
    let flat_home = scalar_to_decimal(wire.home_odd.as_ref());
    if flat_home.is_some() && !event_status.eq_ignore_ascii_case("live") {
        return OddsTriple {
            home: flat_home,
            draw: scalar_to_decimal(wire.neutral_odd.as_ref()),
            away: scalar_to_decimal(wire.away_odd.as_ref()),
        };
    }

    let mut triple = OddsTriple::default();
    for group in &wire.odds {
        if group.name != "1X2" {
            continue;
        }
        for entry in &group.odds {
            let value = scalar_to_decimal(entry.odd_value.as_ref());
            if value.is_none() {
                continue;
            }
            if entry.display == "1" {
                triple.home = value;
            } else if entry.display.eq_ignore_ascii_case("x") {
                triple.draw = value;
            } else if entry.display == "2" {
                triple.away = value;
            }
        }
    }
    triple
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
