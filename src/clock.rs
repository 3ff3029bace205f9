//! Match-clock tokens.
//!
//! The live feed reports an elapsed clock as a `"mm:ss"` string, except
//! during a handful of statuses where the reported value is garbage. This
//! module is the single source of truth for those sentinel statuses, for
//! the full-time token, and for decoding a stored token into the lifecycle
//! ruling applied when a match vanishes from the feed.

use rust_decimal::Decimal;

/// The unique token meaning the match reached full time.
pub const FULL_TIME: &str = "90:00";

/// What the lifecycle does with a match that vanished from the live feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsenceRuling {
    /// The stored clock reached full time; the match is over.
    Ended,
    /// Anything else; park the match and wait for a re-sighting.
    Pending,
}

/// Normalize the feed's clock for storage. Statuses in the sentinel table
/// map to a fixed clock regardless of what the feed reported; any other
/// status keeps the feed's literal clock. The status match is exact.
pub fn normalized_clock(event_status: &str, feed_clock: &str) -> String {
    match event_status {
        "Extra time halftime" => "105:00".to_string(),
        "Awaiting extra time" => "90:00".to_string(),
        "Penalties" => "120:00".to_string(),
        "Halftime" => "45:00".to_string(),
        "Not started" => "00:00".to_string(),
        _ => feed_clock.to_string(),
    }
}

/// Decode a stored clock token into an absence ruling.
pub fn on_absence(clock: &str) -> AbsenceRuling {
    if clock == FULL_TIME {
        AbsenceRuling::Ended
    } else {
        AbsenceRuling::Pending
    }
}

/// Parse a `"mm:ss"` token into fractional minutes. Returns None for
/// anything that does not split into exactly two integers.
pub fn clock_minutes(clock: &str) -> Option<Decimal> {
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let minutes: i64 = parts[0].trim().parse().ok()?;
    let seconds: i64 = parts[1].trim().parse().ok()?;
    Some(Decimal::from(minutes) + Decimal::from(seconds) / Decimal::from(60))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
