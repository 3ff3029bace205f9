//! The append-only odds ledger and its derived views.
//!
//! Every accepted feed record appends one snapshot row; within the same
//! transaction four derived views are maintained: `latest_odd` is an
//! unconditional overwrite, `initial_odd` is first-write-wins, and the
//! three `max_odds_*` tables replace their full row only when the
//! incoming value for their own outcome is present and strictly greater
//! than the stored one. The other two legs are carried along unfiltered.
//!
//! All of this runs on the caller's connection so a whole tick's batch
//! commits or rolls back as one unit.

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{Executor, Sqlite, SqliteConnection};

use super::rows::OddsSnapshotRow;
use super::parse_opt_decimal;
use crate::feed::record::FeedRecord;
use crate::types::Outcome;

fn max_view(outcome: Outcome) -> (&'static str, &'static str) {
    match outcome {
        Outcome::Home => ("max_odds_home", "home_win"),
        Outcome::Draw => ("max_odds_draw", "draw"),
        Outcome::Away => ("max_odds_away", "away_win"),
    }
}

/// Append one snapshot and maintain the derived views. Returns the new
/// snapshot's `odds_id`.
pub async fn record_snapshot(conn: &mut SqliteConnection, rec: &FeedRecord) -> Result<i64> {
    let odds_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO odds (match_id, event_status, match_time, home_score, away_score,
                          home_win, draw, away_win, fetched_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING odds_id
        "#,
    )
    .bind(&rec.match_id)
    .bind(&rec.event_status)
    .bind(&rec.match_time)
    .bind(rec.score.home)
    .bind(rec.score.away)
    .bind(rec.odds.home.map(|d| d.to_string()))
    .bind(rec.odds.draw.map(|d| d.to_string()))
    .bind(rec.odds.away.map(|d| d.to_string()))
    .bind(rec.fetched_at)
    .fetch_one(&mut *conn)
    .await?;

    overwrite_view(conn, "latest_odd", odds_id, rec).await?;
    insert_initial_if_absent(conn, odds_id, rec).await?;

    for outcome in Outcome::ALL {
        let Some(incoming) = rec.odds.get(*outcome) else {
            continue;
        };
        let (table, column) = max_view(*outcome);
        let stored = stored_max(conn, table, column, &rec.match_id).await?;
        if stored.map_or(true, |current| incoming > current) {
            overwrite_view(conn, table, odds_id, rec).await?;
        }
    }

    Ok(odds_id)
}

/// Upsert the full snapshot payload into a one-row-per-match view table.
async fn overwrite_view(
    conn: &mut SqliteConnection,
    table: &str,
    odds_id: i64,
    rec: &FeedRecord,
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {table} (match_id, odds_id, event_status, match_time,
                             home_score, away_score, home_win, draw, away_win, fetched_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(match_id) DO UPDATE SET
            odds_id      = excluded.odds_id,
            event_status = excluded.event_status,
            match_time   = excluded.match_time,
            home_score   = excluded.home_score,
            away_score   = excluded.away_score,
            home_win     = excluded.home_win,
            draw         = excluded.draw,
            away_win     = excluded.away_win,
            fetched_at   = excluded.fetched_at
        "#
    );
    bind_snapshot(sqlx::query(&sql), odds_id, rec)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_initial_if_absent(
    conn: &mut SqliteConnection,
    odds_id: i64,
    rec: &FeedRecord,
) -> Result<()> {
    let sql = r#"
        INSERT INTO initial_odd (match_id, odds_id, event_status, match_time,
                                 home_score, away_score, home_win, draw, away_win, fetched_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(match_id) DO NOTHING
    "#;
    bind_snapshot(sqlx::query(sql), odds_id, rec)
        .execute(conn)
        .await?;
    Ok(())
}

fn bind_snapshot<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    odds_id: i64,
    rec: &'q FeedRecord,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&rec.match_id)
        .bind(odds_id)
        .bind(&rec.event_status)
        .bind(&rec.match_time)
        .bind(rec.score.home)
        .bind(rec.score.away)
        .bind(rec.odds.home.map(|d| d.to_string()))
        .bind(rec.odds.draw.map(|d| d.to_string()))
        .bind(rec.odds.away.map(|d| d.to_string()))
        .bind(rec.fetched_at)
}

/// The stored gate value for one max view. The column is non-null
/// whenever the row exists, but an absent row reads as `None`.
async fn stored_max(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    match_id: &str,
) -> Result<Option<Decimal>> {
    let sql = format!("SELECT {column} FROM {table} WHERE match_id = ?1");
    let raw: Option<Option<String>> = sqlx::query_scalar(&sql)
        .bind(match_id)
        .fetch_optional(&mut *conn)
        .await?;
    parse_opt_decimal(raw.flatten())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn view_row<'e, E>(exec: E, table: &str, match_id: &str) -> Result<Option<OddsSnapshotRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT * FROM {table} WHERE match_id = ?1");
    let row = sqlx::query(&sql).bind(match_id).fetch_optional(exec).await?;
    row.as_ref().map(OddsSnapshotRow::from_row).transpose()
}

/// The newest snapshot for a match.
pub async fn latest_for<'e, E>(exec: E, match_id: &str) -> Result<Option<OddsSnapshotRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    view_row(exec, "latest_odd", match_id).await
}

/// The first snapshot ever recorded for a match.
pub async fn initial_for<'e, E>(exec: E, match_id: &str) -> Result<Option<OddsSnapshotRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    view_row(exec, "initial_odd", match_id).await
}

/// The snapshot that produced the maximum observed odds for one outcome.
pub async fn max_for<'e, E>(
    exec: E,
    outcome: Outcome,
    match_id: &str,
) -> Result<Option<OddsSnapshotRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (table, _) = max_view(outcome);
    view_row(exec, table, match_id).await
}

pub async fn count_snapshots<'e, E>(exec: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM odds")
        .fetch_one(exec)
        .await?)
}
