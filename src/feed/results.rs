//! External results provider client.
//!
//! The provider exposes a category catalog (one entry per country, with an
//! optional alpha-2 code) and per-date scheduled-event listings that carry
//! final normal-time scores once a match has finished. Category ids are
//! resolved through [`crate::resolver::CategoryCache`], not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::ResultsProvider;
use crate::config::ResultsConfig;

const PROVIDER_NAME: &str = "results";

// ---------------------------------------------------------------------------
// Wire types (provider JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CategoriesEnvelope {
    #[serde(default)]
    categories: Vec<ProviderCategory>,
}

#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    #[serde(default)]
    events: Vec<ProviderEvent>,
}

/// One country bucket in the provider's catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderCategory {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    /// Absent for international competitions.
    #[serde(default)]
    pub alpha2: Option<String>,
}

/// One finished (or scheduled) event as the provider reports it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvent {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub tournament: WireTournament,
    #[serde(default)]
    pub home_team: WireTeamRef,
    #[serde(default)]
    pub away_team: WireTeamRef,
    #[serde(default)]
    pub home_score: WireScoreRef,
    #[serde(default)]
    pub away_score: WireScoreRef,
    /// Unix seconds.
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub status: WireStatusRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireTournament {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: WireCategoryRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireCategoryRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alpha2: Option<String>,
    #[serde(default)]
    pub sport: WireSportRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireSportRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireTeamRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireScoreRef {
    #[serde(default)]
    pub normaltime: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireStatusRef {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl ProviderEvent {
    /// Kickoff as UTC. Zero, negative, or missing timestamps are invalid.
    pub fn kickoff(&self) -> Option<DateTime<Utc>> {
        let ts = self.start_timestamp?;
        if ts <= 0 {
            return None;
        }
        Utc.timestamp_opt(ts, 0).single()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the results provider.
pub struct ResultsClient {
    http: Client,
    base_url: String,
}

impl ResultsClient {
    pub fn new(cfg: &ResultsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("ninety/0.1.0 (results-ingest)")
            .build()
            .context("Failed to build HTTP client for the results provider")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ResultsProvider for ResultsClient {
    async fn fetch_categories(&self) -> Result<Vec<ProviderCategory>> {
        let url = format!("{}/sport/football/categories", self.base_url);
        debug!(url = %url, "Fetching results categories");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Results category request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Results category request error {status}: {body}");
        }

        let envelope: CategoriesEnvelope = resp
            .json()
            .await
            .context("Failed to parse results category response")?;

        Ok(envelope.categories)
    }

    async fn fetch_events(&self, category_id: i64, date: NaiveDate) -> Result<Vec<ProviderEvent>> {
        let url = format!(
            "{}/category/{}/scheduled-events/{}",
            self.base_url,
            category_id,
            date.format("%Y-%m-%d"),
        );
        debug!(url = %url, "Fetching results events");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Results event request failed")?;

        // A category with no programme for the date 404s; that is not an error.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Results event request error {status}: {body}");
        }

        let envelope: EventsEnvelope = resp
            .json()
            .await
            .context("Failed to parse results event response")?;

        Ok(envelope.events)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
