//! Feed integrations.
//!
//! Defines the `OddsFeed` and `ResultsProvider` traits and provides the
//! HTTP implementations:
//! - Sportsbook feed: live and pregame 1X2 odds per sport
//! - Results provider: category catalog plus per-date finished events

pub mod record;
pub mod results;
pub mod sportsbook;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub use record::{FeedRecord, FeedScope, WireMatch};
pub use results::{ProviderCategory, ProviderEvent};
pub use sportsbook::SportsbookFeed;

/// Sports covered by the pregame feed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sport {
    Football,
    Basketball,
}

impl Sport {
    pub const ALL: [Sport; 2] = [Sport::Football, Sport::Basketball];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
        }
    }
}

/// Abstraction over the odds feed.
///
/// Implementors return raw wire records; parsing into [`FeedRecord`] is the
/// caller's job so that fetch failures and per-record failures stay separate.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Fetch the current batch of live match records.
    async fn fetch_live(&self) -> Result<Vec<WireMatch>>;

    /// Fetch upcoming match records for one sport.
    async fn fetch_pregame(&self, sport: Sport) -> Result<Vec<WireMatch>>;

    /// Feed name for logging and identification.
    fn name(&self) -> &str;
}

/// Abstraction over the external results provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultsProvider: Send + Sync {
    /// Fetch the provider's category catalog (id + optional alpha-2 code).
    async fn fetch_categories(&self) -> Result<Vec<ProviderCategory>>;

    /// Fetch finished events for one category on one date.
    async fn fetch_events(&self, category_id: i64, date: NaiveDate) -> Result<Vec<ProviderEvent>>;

    /// Provider name for logging and identification.
    fn name(&self) -> &str;
}
