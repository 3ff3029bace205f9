//! SQLite persistence.
//!
//! Schema bootstrap plus one submodule per table family. All decision
//! logic lives above this layer; these functions are plain reads and
//! writes. Monetary and odds columns are stored as TEXT holding
//! `rust_decimal` canonical strings, timestamps as `chrono` UTC values.
//!
//! Functions that must participate in a caller's transaction take
//! `&mut SqliteConnection`; standalone reads take a pool or any executor.

pub mod bets;
pub mod entities;
pub mod matches;
pub mod odds;
pub mod rows;

use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::DatabaseConfig;

/// Open the pool and bootstrap the schema.
pub async fn connect(cfg: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&cfg.url)
        .with_context(|| format!("Invalid database URL: {}", cfg.url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    initialize_schema(&pool).await?;
    info!(url = %cfg.url, "Database ready");
    Ok(pool)
}

/// Create every table and index if absent. Safe to run on every startup.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            match_id         TEXT PRIMARY KEY,
            competition_name TEXT,
            category         TEXT,
            country          TEXT,
            home_team        TEXT,
            away_team        TEXT,
            event_status     TEXT NOT NULL DEFAULT '',
            live             INTEGER NOT NULL DEFAULT 0,
            start_time       TEXT,
            match_time       TEXT NOT NULL DEFAULT ''
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ended_matches (
            match_id         TEXT PRIMARY KEY,
            competition_name TEXT,
            category         TEXT,
            country          TEXT,
            home_team        TEXT,
            away_team        TEXT,
            event_status     TEXT NOT NULL DEFAULT '',
            live             INTEGER NOT NULL DEFAULT 0,
            start_time       TEXT,
            match_time       TEXT NOT NULL DEFAULT ''
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS odds (
            odds_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id     TEXT NOT NULL,
            event_status TEXT NOT NULL DEFAULT '',
            match_time   TEXT NOT NULL DEFAULT '',
            home_score   INTEGER,
            away_score   INTEGER,
            home_win     TEXT,
            draw         TEXT,
            away_win     TEXT,
            fetched_at   TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS leagues (
            league_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL,
            country_code TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            team_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name    TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS league_teams (
            league_id INTEGER NOT NULL REFERENCES leagues(league_id),
            team_id   INTEGER NOT NULL REFERENCES teams(team_id),
            PRIMARY KEY (league_id, team_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS league_aliases (
            alias_id  INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues(league_id),
            alias     TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS team_aliases (
            alias_id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id  INTEGER NOT NULL REFERENCES teams(team_id),
            alias    TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS external_results (
            result_id        INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id      INTEGER NOT NULL UNIQUE,
            competition_name TEXT,
            category         TEXT,
            country          TEXT,
            country_code     TEXT,
            home_team        TEXT,
            away_team        TEXT,
            home_score       INTEGER,
            away_score       INTEGER,
            start_time       TEXT,
            event_status     TEXT,
            league_id        INTEGER,
            home_team_id     INTEGER,
            away_team_id     INTEGER,
            match_id         TEXT,
            created_at       TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            email      TEXT NOT NULL UNIQUE,
            name       TEXT,
            balance    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS bots (
            bot_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id    INTEGER NOT NULL REFERENCES users(user_id),
            name       TEXT NOT NULL,
            conditions TEXT NOT NULL,
            action     TEXT NOT NULL,
            stake      TEXT NOT NULL,
            active     INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS bets (
            bet_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(user_id),
            kind            TEXT NOT NULL,
            stake           TEXT NOT NULL,
            expected_payout TEXT NOT NULL,
            outcome         TEXT NOT NULL DEFAULT 'pending',
            bot_id          INTEGER,
            match_id        TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS bet_events (
            bet_event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            bet_id       INTEGER NOT NULL REFERENCES bets(bet_id),
            match_id     TEXT NOT NULL,
            selection    TEXT NOT NULL,
            odds_id      INTEGER NOT NULL,
            outcome      TEXT NOT NULL DEFAULT 'pending'
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_odds_match_fetched ON odds(match_id, fetched_at)",
        "CREATE INDEX IF NOT EXISTS idx_matches_category_status ON matches(category, event_status)",
        "CREATE INDEX IF NOT EXISTS idx_ended_matches_start ON ended_matches(start_time)",
        "CREATE INDEX IF NOT EXISTS idx_bet_events_match ON bet_events(match_id)",
        "CREATE INDEX IF NOT EXISTS idx_bet_events_bet ON bet_events(bet_id)",
        // Backs the at-most-one-bet-per-(bot, match) guarantee.
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_bets_bot_match \
         ON bets(bot_id, match_id) WHERE bot_id IS NOT NULL",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to initialize schema")?;
    }

    // The derived odds views share the snapshot shape, one row per match.
    for view in ["latest_odd", "initial_odd", "max_odds_home", "max_odds_draw", "max_odds_away"] {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {view} (
                match_id     TEXT PRIMARY KEY,
                odds_id      INTEGER NOT NULL,
                event_status TEXT NOT NULL DEFAULT '',
                match_time   TEXT NOT NULL DEFAULT '',
                home_score   INTEGER,
                away_score   INTEGER,
                home_win     TEXT,
                draw         TEXT,
                away_win     TEXT,
                fetched_at   TEXT NOT NULL
            )
            "#
        );
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create view table {view}"))?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Decimal columns
// ---------------------------------------------------------------------------

/// Parse a TEXT decimal column.
pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal in storage: {raw:?}"))
}

/// Parse a nullable TEXT decimal column.
pub(crate) fn parse_opt_decimal(raw: Option<String>) -> Result<Option<Decimal>> {
    raw.map(|s| parse_decimal(&s)).transpose()
}

/// A fresh in-memory database with the schema applied. Each call names
/// its own database; the shared cache keeps every pooled connection on
/// that one database rather than a private empty one.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_DB: AtomicU64 = AtomicU64::new(0);
    let url = format!(
        "sqlite:file:ninety_test_{}?mode=memory&cache=shared",
        NEXT_DB.fetch_add(1, Ordering::Relaxed)
    );
    let pool = SqlitePool::connect(&url).await.expect("test pool");
    initialize_schema(&pool).await.expect("test schema");
    pool
}
