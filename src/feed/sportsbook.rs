//! Sportsbook odds feed client.
//!
//! One endpoint streams the currently-live matches; two more list the
//! upcoming football and basketball programmes. Every response wraps its
//! records in a `data` array. Reads are public; deployments that front the
//! feed with a gateway can set an API key, sent as `x-api-key`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{OddsFeed, Sport};
use crate::config::{AppConfig, FeedsConfig};
use crate::feed::record::WireMatch;

const FEED_NAME: &str = "sportsbook";

/// Every feed endpoint wraps its payload the same way.
#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    #[serde(default)]
    data: Vec<WireMatch>,
}

/// HTTP client for the sportsbook feed.
pub struct SportsbookFeed {
    http: Client,
    live_url: String,
    football_url: String,
    basketball_url: String,
    api_key: Option<SecretString>,
}

impl SportsbookFeed {
    /// Build a feed client from config. The API key env var is resolved
    /// here so a misconfigured deployment fails at startup, not mid-tick.
    pub fn new(cfg: &FeedsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("ninety/0.1.0 (odds-ingest)")
            .build()
            .context("Failed to build HTTP client for the sportsbook feed")?;

        let api_key = match &cfg.api_key_env {
            Some(env_name) => Some(SecretString::from(AppConfig::resolve_env(env_name)?)),
            None => None,
        };

        Ok(Self {
            http,
            live_url: cfg.live_url.clone(),
            football_url: cfg.football_url.clone(),
            basketball_url: cfg.basketball_url.clone(),
            api_key,
        })
    }

    async fn fetch_envelope(&self, url: &str) -> Result<Vec<WireMatch>> {
        debug!(url = %url, "Fetching sportsbook feed");

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .context("Sportsbook feed request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Sportsbook feed error {status}: {body}");
        }

        let envelope: FeedEnvelope = resp
            .json()
            .await
            .context("Failed to parse sportsbook feed response")?;

        Ok(envelope.data)
    }
}

#[async_trait]
impl OddsFeed for SportsbookFeed {
    async fn fetch_live(&self) -> Result<Vec<WireMatch>> {
        self.fetch_envelope(&self.live_url).await
    }

    async fn fetch_pregame(&self, sport: Sport) -> Result<Vec<WireMatch>> {
        let url = match sport {
            Sport::Football => &self.football_url,
            Sport::Basketball => &self.basketball_url,
        };
        self.fetch_envelope(url).await
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}
