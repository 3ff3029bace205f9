//! Reads and writes for leagues, teams, aliases and external results.
//!
//! Name lookups fold case and surrounding whitespace on both sides of the
//! comparison; alias lookups apply the same folding to the alias table.
//! Team lookups are always scoped to a league through `league_teams`, so
//! the same club name in two leagues never cross-matches.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use super::rows::{ExternalResultRow, NewExternalResult};

// ---------------------------------------------------------------------------
// Leagues and teams
// ---------------------------------------------------------------------------

pub async fn create_league(
    conn: &mut SqliteConnection,
    name: &str,
    country_code: Option<&str>,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        "INSERT INTO leagues (name, country_code) VALUES (?1, ?2) RETURNING league_id",
    )
    .bind(name)
    .bind(country_code)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn create_team(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let id = sqlx::query_scalar("INSERT INTO teams (name) VALUES (?1) RETURNING team_id")
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

pub async fn link_team_to_league(
    conn: &mut SqliteConnection,
    league_id: i64,
    team_id: i64,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO league_teams (league_id, team_id) VALUES (?1, ?2)")
        .bind(league_id)
        .bind(team_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn add_league_alias(
    conn: &mut SqliteConnection,
    league_id: i64,
    alias: &str,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        "INSERT INTO league_aliases (league_id, alias) VALUES (?1, ?2) RETURNING alias_id",
    )
    .bind(league_id)
    .bind(alias)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn add_team_alias(
    conn: &mut SqliteConnection,
    team_id: i64,
    alias: &str,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        "INSERT INTO team_aliases (team_id, alias) VALUES (?1, ?2) RETURNING alias_id",
    )
    .bind(team_id)
    .bind(alias)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Resolve a league id from a name and country code: exact name first,
/// then the alias table, both constrained to the country.
pub async fn find_league(pool: &SqlitePool, name: &str, country_code: &str) -> Result<Option<i64>> {
    let direct: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT league_id FROM leagues
        WHERE lower(trim(name)) = lower(trim(?1)) AND country_code = ?2
        LIMIT 1
        "#,
    )
    .bind(name)
    .bind(country_code)
    .fetch_optional(pool)
    .await?;
    if direct.is_some() {
        return Ok(direct);
    }

    let aliased: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT l.league_id
        FROM league_aliases la
        JOIN leagues l ON l.league_id = la.league_id
        WHERE lower(trim(la.alias)) = lower(trim(?1)) AND l.country_code = ?2
        LIMIT 1
        "#,
    )
    .bind(name)
    .bind(country_code)
    .fetch_optional(pool)
    .await?;
    Ok(aliased)
}

/// Resolve a team id from a name within one league: exact name first,
/// then the alias table, both through the league's `league_teams` links.
pub async fn find_team(pool: &SqlitePool, name: &str, league_id: i64) -> Result<Option<i64>> {
    let direct: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT t.team_id
        FROM teams t
        JOIN league_teams lt ON lt.team_id = t.team_id
        WHERE lower(trim(t.name)) = lower(trim(?1)) AND lt.league_id = ?2
        LIMIT 1
        "#,
    )
    .bind(name)
    .bind(league_id)
    .fetch_optional(pool)
    .await?;
    if direct.is_some() {
        return Ok(direct);
    }

    let aliased: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT ta.team_id
        FROM team_aliases ta
        JOIN league_teams lt ON lt.team_id = ta.team_id
        WHERE lower(trim(ta.alias)) = lower(trim(?1)) AND lt.league_id = ?2
        LIMIT 1
        "#,
    )
    .bind(name)
    .bind(league_id)
    .fetch_optional(pool)
    .await?;
    Ok(aliased)
}

// ---------------------------------------------------------------------------
// External results
// ---------------------------------------------------------------------------

/// Insert an external result, keyed by the provider's event id. Returns
/// false when the id is already on file.
pub async fn insert_external_result(
    conn: &mut SqliteConnection,
    result: &NewExternalResult,
) -> Result<bool> {
    let done = sqlx::query(
        r#"
        INSERT OR IGNORE INTO external_results
            (external_id, competition_name, category, country, country_code,
             home_team, away_team, home_score, away_score, start_time,
             event_status, league_id, home_team_id, away_team_id, match_id,
             created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(result.external_id)
    .bind(&result.competition_name)
    .bind(&result.category)
    .bind(&result.country)
    .bind(&result.country_code)
    .bind(&result.home_team)
    .bind(&result.away_team)
    .bind(result.home_score)
    .bind(result.away_score)
    .bind(result.start_time)
    .bind(&result.event_status)
    .bind(result.league_id)
    .bind(result.home_team_id)
    .bind(result.away_team_id)
    .bind(&result.match_id)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(done.rows_affected() > 0)
}

/// Results with any resolution column still null, oldest first. The
/// reprocess pass walks these after new aliases are added.
pub async fn unresolved_results(pool: &SqlitePool) -> Result<Vec<ExternalResultRow>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM external_results
        WHERE league_id IS NULL
           OR home_team_id IS NULL
           OR away_team_id IS NULL
           OR match_id IS NULL
        ORDER BY result_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(ExternalResultRow::from_row).collect()
}

/// Overwrite the four resolution columns of one stored result.
pub async fn update_result_resolution(
    conn: &mut SqliteConnection,
    result_id: i64,
    league_id: Option<i64>,
    home_team_id: Option<i64>,
    away_team_id: Option<i64>,
    match_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE external_results
        SET league_id = ?1, home_team_id = ?2, away_team_id = ?3, match_id = ?4
        WHERE result_id = ?5
        "#,
    )
    .bind(league_id)
    .bind(home_team_id)
    .bind(away_team_id)
    .bind(match_id)
    .bind(result_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Distinct country codes of leagues that had an archived match kicking
/// off inside `[from, to)`. Drives which provider categories a results
/// ingest date touches.
pub async fn archived_country_codes(
    pool: &SqlitePool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<String>> {
    let codes = sqlx::query_scalar(
        r#"
        SELECT DISTINCT l.country_code
        FROM ended_matches em
        JOIN leagues l ON em.competition_name = l.name
        WHERE l.country_code IS NOT NULL
          AND em.start_time >= ?1
          AND em.start_time < ?2
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(codes)
}

pub async fn count_unresolved<'e, E>(exec: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM external_results
        WHERE league_id IS NULL
           OR home_team_id IS NULL
           OR away_team_id IS NULL
           OR match_id IS NULL
        "#,
    )
    .fetch_one(exec)
    .await?)
}
