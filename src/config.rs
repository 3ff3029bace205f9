//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub feeds: FeedsConfig,
    pub results: ResultsConfig,
    pub bots: BotsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub live_interval_secs: u64,
    pub pregame_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub archive_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsConfig {
    pub live_url: String,
    pub football_url: String,
    pub basketball_url: String,
    /// Env var holding the feed API key (sent as a header when set).
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub pregame_enabled: bool,
    /// Offset applied to naive feed timestamps before converting to UTC.
    pub utc_offset_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResultsConfig {
    pub base_url: String,
    pub category_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotsConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub seed_presets: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
