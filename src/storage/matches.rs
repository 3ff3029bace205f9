//! Reads and writes for `matches` and `ended_matches`.
//!
//! Status tokens are compared case-folded because live statuses arrive
//! as free text from the feed; the engine's own tokens (`pregame`,
//! `pending`, `ended`) are always written lowercase.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection};

use super::rows::{MatchRow, MatchStateRow};
use crate::feed::record::FeedRecord;

/// Full-row overwrite upsert from a feed record. Live sightings pass
/// `live = true`; pregame ingestion passes `false`.
pub async fn upsert_match(
    conn: &mut SqliteConnection,
    sport: &str,
    rec: &FeedRecord,
    live: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO matches (match_id, competition_name, category, country,
                             home_team, away_team, event_status, live,
                             start_time, match_time)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(match_id) DO UPDATE SET
            competition_name = excluded.competition_name,
            category         = excluded.category,
            country          = excluded.country,
            home_team        = excluded.home_team,
            away_team        = excluded.away_team,
            event_status     = excluded.event_status,
            live             = excluded.live,
            start_time       = excluded.start_time,
            match_time       = excluded.match_time
        "#,
    )
    .bind(&rec.match_id)
    .bind(&rec.competition_name)
    .bind(sport)
    .bind(&rec.country)
    .bind(&rec.home_team)
    .bind(&rec.away_team)
    .bind(&rec.event_status)
    .bind(live)
    .bind(rec.start_time)
    .bind(&rec.match_time)
    .execute(conn)
    .await?;
    Ok(())
}

/// Rows of one sport that are neither pregame nor ended. This is the set
/// live-tick reconciliation compares against the feed's reported ids.
pub async fn open_states(
    conn: &mut SqliteConnection,
    sport: &str,
) -> Result<Vec<MatchStateRow>> {
    let rows = sqlx::query(
        r#"
        SELECT match_id, live, event_status, match_time
        FROM matches
        WHERE category = ?1
          AND lower(event_status) NOT IN ('pregame', 'ended')
        "#,
    )
    .bind(sport)
    .fetch_all(conn)
    .await?;
    rows.iter().map(MatchStateRow::from_row).collect()
}

pub async fn mark_pending(conn: &mut SqliteConnection, match_id: &str) -> Result<()> {
    sqlx::query("UPDATE matches SET live = 0, event_status = 'pending' WHERE match_id = ?1")
        .bind(match_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_ended(conn: &mut SqliteConnection, match_id: &str) -> Result<()> {
    sqlx::query("UPDATE matches SET live = 0, event_status = 'ended' WHERE match_id = ?1")
        .bind(match_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Ids of non-terminal, non-pregame rows whose kickoff is older than the
/// cutoff. The staleness sweep force-ends these.
pub async fn stale_open_ids(
    conn: &mut SqliteConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT match_id
        FROM matches
        WHERE lower(event_status) NOT IN ('pregame', 'ended')
          AND start_time IS NOT NULL
          AND start_time < ?1
        "#,
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Up to `limit` ids currently marked ended, oldest kickoff first.
pub async fn ended_ids(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT match_id
        FROM matches
        WHERE lower(event_status) = 'ended'
        ORDER BY start_time
        LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Move one ended row into the archive (idempotent upsert by id) and
/// delete it from the live table. The caller owns the transaction.
pub async fn archive_match(conn: &mut SqliteConnection, match_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ended_matches (match_id, competition_name, category, country,
                                   home_team, away_team, event_status, live,
                                   start_time, match_time)
        SELECT match_id, competition_name, category, country,
               home_team, away_team, event_status, live,
               start_time, match_time
        FROM matches
        WHERE match_id = ?1
        ON CONFLICT(match_id) DO UPDATE SET
            competition_name = excluded.competition_name,
            category         = excluded.category,
            country          = excluded.country,
            home_team        = excluded.home_team,
            away_team        = excluded.away_team,
            event_status     = excluded.event_status,
            live             = excluded.live,
            start_time       = excluded.start_time,
            match_time       = excluded.match_time
        "#,
    )
    .bind(match_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM matches WHERE match_id = ?1")
        .bind(match_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn get_match<'e, E>(exec: E, match_id: &str) -> Result<Option<MatchRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM matches WHERE match_id = ?1")
        .bind(match_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(MatchRow::from_row).transpose()
}

/// Every match currently flagged live.
pub async fn live_matches<'e, E>(exec: E) -> Result<Vec<MatchRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM matches WHERE live = 1")
        .fetch_all(exec)
        .await?;
    rows.iter().map(MatchRow::from_row).collect()
}

/// Archived matches with a kickoff inside `[from, to]`, inclusive.
pub async fn archived_in_window<'e, E>(
    exec: E,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<MatchRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT * FROM ended_matches WHERE start_time >= ?1 AND start_time <= ?2",
    )
    .bind(from)
    .bind(to)
    .fetch_all(exec)
    .await?;
    rows.iter().map(MatchRow::from_row).collect()
}

pub async fn count_open<'e, E>(exec: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM matches")
        .fetch_one(exec)
        .await?)
}

pub async fn count_live<'e, E>(exec: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM matches WHERE live = 1")
        .fetch_one(exec)
        .await?)
}

pub async fn count_archived<'e, E>(exec: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM ended_matches")
        .fetch_one(exec)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_pool;
    use crate::types::{OddsTriple, Score};
    use chrono::Duration;
    use sqlx::SqlitePool;

    async fn make_pool() -> SqlitePool {
        test_pool().await
    }

    fn make_record(match_id: &str, status: &str, clock: &str) -> FeedRecord {
        FeedRecord {
            match_id: match_id.to_string(),
            competition_name: Some("Premier League".to_string()),
            country: Some("England".to_string()),
            home_team: Some("Arsenal".to_string()),
            away_team: Some("Chelsea".to_string()),
            event_status: status.to_string(),
            match_time: clock.to_string(),
            start_time: Some(Utc::now() - Duration::minutes(30)),
            score: Score::new(0, 0),
            odds: OddsTriple::default(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_full_row() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_match(&mut conn, "football", &make_record("m1", "1st half", "10:00"), true)
            .await
            .unwrap();
        upsert_match(&mut conn, "football", &make_record("m1", "2nd half", "70:00"), true)
            .await
            .unwrap();

        let row = get_match(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(row.event_status, "2nd half");
        assert_eq!(row.match_time, "70:00");
        assert!(row.live);
    }

    #[tokio::test]
    async fn test_open_states_excludes_pregame_and_ended() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_match(&mut conn, "football", &make_record("live1", "live", "30:00"), true)
            .await
            .unwrap();
        upsert_match(&mut conn, "football", &make_record("pre1", "pregame", "00:00"), false)
            .await
            .unwrap();
        upsert_match(&mut conn, "football", &make_record("done1", "ended", "90:00"), false)
            .await
            .unwrap();
        upsert_match(&mut conn, "basketball", &make_record("other", "live", "05:00"), true)
            .await
            .unwrap();

        let states = open_states(&mut conn, "football").await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].match_id, "live1");
    }

    #[tokio::test]
    async fn test_pending_rows_stay_in_open_scope() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_match(&mut conn, "football", &make_record("m1", "live", "44:00"), true)
            .await
            .unwrap();
        mark_pending(&mut conn, "m1").await.unwrap();

        let states = open_states(&mut conn, "football").await.unwrap();
        assert_eq!(states.len(), 1);
        assert!(!states[0].live);
        assert_eq!(states[0].event_status, "pending");
    }

    #[tokio::test]
    async fn test_stale_open_ids_honours_cutoff() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut old = make_record("old1", "pending", "80:00");
        old.start_time = Some(Utc::now() - Duration::hours(4));
        upsert_match(&mut conn, "football", &old, false).await.unwrap();

        let mut recent = make_record("new1", "live", "10:00");
        recent.start_time = Some(Utc::now() - Duration::hours(1));
        upsert_match(&mut conn, "football", &recent, true).await.unwrap();

        let mut no_kickoff = make_record("nokick", "pending", "20:00");
        no_kickoff.start_time = None;
        upsert_match(&mut conn, "football", &no_kickoff, false).await.unwrap();

        let cutoff = Utc::now() - Duration::hours(3);
        let stale = stale_open_ids(&mut conn, cutoff).await.unwrap();
        assert_eq!(stale, vec!["old1".to_string()]);
    }

    #[tokio::test]
    async fn test_archive_match_moves_row() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_match(&mut conn, "football", &make_record("m1", "ended", "90:00"), false)
            .await
            .unwrap();
        archive_match(&mut conn, "m1").await.unwrap();

        assert!(get_match(&pool, "m1").await.unwrap().is_none());
        assert_eq!(count_archived(&pool).await.unwrap(), 1);

        // Re-archiving after a second sighting upserts, never duplicates.
        upsert_match(&mut conn, "football", &make_record("m1", "ended", "90:00"), false)
            .await
            .unwrap();
        archive_match(&mut conn, "m1").await.unwrap();
        assert_eq!(count_archived(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_archived_in_window() {
        let pool = make_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let kickoff = Utc::now() - Duration::hours(5);
        let mut rec = make_record("m1", "ended", "90:00");
        rec.start_time = Some(kickoff);
        upsert_match(&mut conn, "football", &rec, false).await.unwrap();
        archive_match(&mut conn, "m1").await.unwrap();

        let hits = archived_in_window(
            &pool,
            kickoff - Duration::minutes(15),
            kickoff + Duration::minutes(15),
        )
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = archived_in_window(
            &pool,
            kickoff + Duration::minutes(16),
            kickoff + Duration::minutes(45),
        )
        .await
        .unwrap();
        assert!(misses.is_empty());
    }
}
