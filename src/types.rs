//! Shared types for the NINETY engine.
//!
//! These types form the domain vocabulary used across all modules.
//! Storage row structs live in `storage::rows`; everything here is
//! plain data that the registry, settlement, resolver and bot modules
//! can depend on without circular references.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One of the three 1X2 outcomes of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    /// All outcomes in home/draw/away order. The order is load-bearing:
    /// favourite and outsider ties are broken by it.
    pub const ALL: &'static [Outcome] = &[Outcome::Home, Outcome::Draw, Outcome::Away];

    /// Storage token for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempt to parse a string into an Outcome (case-insensitive).
impl std::str::FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "home" => Ok(Outcome::Home),
            "draw" => Ok(Outcome::Draw),
            "away" => Ok(Outcome::Away),
            _ => Err(anyhow::anyhow!("Unknown outcome: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Bet state
// ---------------------------------------------------------------------------

/// Settlement state of a bet or a bet event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Pending,
    Won,
    Lost,
}

impl BetOutcome {
    /// Storage token for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            BetOutcome::Pending => "pending",
            BetOutcome::Won => "won",
            BetOutcome::Lost => "lost",
        }
    }

    /// Whether this state is still awaiting settlement.
    pub fn is_pending(&self) -> bool {
        *self == BetOutcome::Pending
    }
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BetOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(BetOutcome::Pending),
            "won" => Ok(BetOutcome::Won),
            "lost" => Ok(BetOutcome::Lost),
            _ => Err(anyhow::anyhow!("Unknown bet outcome: {s}")),
        }
    }
}

/// Bet composition. A single owns one event; a parlay owns several and
/// wins only if every event wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetKind {
    Single,
    Parlay,
}

impl BetKind {
    /// Storage token for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            BetKind::Single => "single",
            BetKind::Parlay => "parlay",
        }
    }
}

impl fmt::Display for BetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(BetKind::Single),
            "parlay" => Ok(BetKind::Parlay),
            _ => Err(anyhow::anyhow!("Unknown bet kind: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Match lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle phase of a match row.
///
/// The engine itself writes the `pregame`, `pending` and `ended` status
/// tokens; while a match is live the feed's free-text status is stored
/// verbatim. Anything that is not one of the three engine tokens is
/// therefore a live status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Pregame,
    Live,
    Pending,
    Ended,
}

impl MatchPhase {
    /// Canonical status token for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::Pregame => "pregame",
            MatchPhase::Live => "live",
            MatchPhase::Pending => "pending",
            MatchPhase::Ended => "ended",
        }
    }

    /// Classify a stored status token.
    pub fn from_status(status: &str) -> MatchPhase {
        match status.trim().to_lowercase().as_str() {
            "pregame" => MatchPhase::Pregame,
            "pending" => MatchPhase::Pending,
            "ended" => MatchPhase::Ended,
            _ => MatchPhase::Live,
        }
    }

    /// Whether the match has finished and will be archived.
    pub fn is_terminal(&self) -> bool {
        *self == MatchPhase::Ended
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// A running or final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: i64,
    pub away: i64,
}

impl Score {
    pub fn new(home: i64, away: i64) -> Self {
        Score { home, away }
    }

    /// The outcome this score settles to.
    pub fn winner(&self) -> Outcome {
        if self.home > self.away {
            Outcome::Home
        } else if self.away > self.home {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    /// Absolute goal difference.
    pub fn difference(&self) -> i64 {
        (self.home - self.away).abs()
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.home, self.away)
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// The 1X2 odds of one snapshot. Any leg may be missing; favourite and
/// outsider selection requires all three legs, matching the fail-closed
/// rule evaluation semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OddsTriple {
    pub home: Option<Decimal>,
    pub draw: Option<Decimal>,
    pub away: Option<Decimal>,
}

impl OddsTriple {
    pub fn new(home: Option<Decimal>, draw: Option<Decimal>, away: Option<Decimal>) -> Self {
        OddsTriple { home, draw, away }
    }

    /// The odds for a given outcome.
    pub fn get(&self, outcome: Outcome) -> Option<Decimal> {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Whether no leg carries a value.
    pub fn is_empty(&self) -> bool {
        self.home.is_none() && self.draw.is_none() && self.away.is_none()
    }

    /// All three legs in home/draw/away order, or None if any is missing.
    fn complete(&self) -> Option<[(Outcome, Decimal); 3]> {
        Some([
            (Outcome::Home, self.home?),
            (Outcome::Draw, self.draw?),
            (Outcome::Away, self.away?),
        ])
    }

    /// Lowest value across the three legs; None unless all are present.
    pub fn lowest(&self) -> Option<Decimal> {
        self.favourite().map(|(_, value)| value)
    }

    /// The favourite: lowest odds. Ties resolve towards home, then draw,
    /// via a stable sort over the home/draw/away order.
    pub fn favourite(&self) -> Option<(Outcome, Decimal)> {
        let mut legs = self.complete()?;
        legs.sort_by(|a, b| a.1.cmp(&b.1));
        Some(legs[0])
    }

    /// The outsider: highest odds. Ties resolve towards away, then draw.
    pub fn outsider(&self) -> Option<(Outcome, Decimal)> {
        let mut legs = self.complete()?;
        legs.sort_by(|a, b| a.1.cmp(&b.1));
        Some(legs[2])
    }
}

impl fmt::Display for OddsTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leg = |v: Option<Decimal>| match v {
            Some(d) => d.to_string(),
            None => "-".to_string(),
        };
        write!(
            f,
            "1={} X={} 2={}",
            leg(self.home),
            leg(self.draw),
            leg(self.away),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for NINETY.
#[derive(Debug, thiserror::Error)]
pub enum NinetyError {
    #[error("Feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    #[error("Invalid bot condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid bot action: {0}")]
    InvalidAction(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
