//! Match registry: lifecycle transitions and the loops that drive them.
//!
//! `MatchRegistry` owns every state transition a match can take
//! (pregame → live → pending/ended → archived) and runs each ingest tick
//! as one transaction, so a tick either lands completely or not at all.
//! The worker structs at the bottom wrap the registry in fixed-interval
//! tokio loops with cooperative shutdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{on_absence, AbsenceRuling};
use crate::feed::{FeedRecord, FeedScope, OddsFeed, Sport};
use crate::settlement;
use crate::storage::{matches, odds};
use crate::types::MatchPhase;

/// Rows past their kickoff by this many hours are force-ended by the
/// cleanup sweep.
const STALE_AFTER_HOURS: i64 = 3;

/// Archive sweep batch size; each batch commits on its own.
const ARCHIVE_BATCH: i64 = 1000;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct LiveIngestReport {
    pub records: usize,
    pub marked_pending: usize,
    pub marked_ended: usize,
    pub bets_won: usize,
    pub bets_lost: usize,
}

#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub marked_ended: usize,
    pub bets_won: usize,
    pub bets_lost: usize,
}

/// All lifecycle writes go through here.
#[derive(Clone)]
pub struct MatchRegistry {
    pool: SqlitePool,
}

impl MatchRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        MatchRegistry { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply one live tick for one sport as a single transaction: upsert
    /// every sighted record with its snapshot, then reconcile the open
    /// rows of that sport against the sighted id set. Absent rows end if
    /// their stored clock reached full time and park as pending
    /// otherwise; a pending row sighted again simply re-enters as live
    /// via the upsert. A tick with zero records reconciles only rows
    /// currently flagged live.
    pub async fn ingest_live(
        &self,
        sport: Sport,
        records: &[FeedRecord],
    ) -> Result<LiveIngestReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = LiveIngestReport {
            records: records.len(),
            ..LiveIngestReport::default()
        };

        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        for rec in records {
            matches::upsert_match(&mut tx, sport.as_str(), rec, true).await?;
            odds::record_snapshot(&mut tx, rec).await?;
            seen.insert(rec.match_id.as_str());
        }

        for state in matches::open_states(&mut tx, sport.as_str()).await? {
            if seen.contains(state.match_id.as_str()) {
                continue;
            }
            if records.is_empty() && !state.live {
                continue;
            }
            match on_absence(&state.match_time) {
                AbsenceRuling::Ended => {
                    matches::mark_ended(&mut tx, &state.match_id).await?;
                    let settled = settlement::settle_match(&mut tx, &state.match_id).await?;
                    report.marked_ended += 1;
                    report.bets_won += settled.bets_won;
                    report.bets_lost += settled.bets_lost;
                }
                AbsenceRuling::Pending => {
                    if MatchPhase::from_status(&state.event_status) != MatchPhase::Pending {
                        matches::mark_pending(&mut tx, &state.match_id).await?;
                        report.marked_pending += 1;
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Upsert upcoming matches as pregame rows, snapshots included. The
    /// first snapshot a match ever gets becomes its initial odds, so
    /// pregame prices seed `initial_odd` before the match goes live.
    pub async fn ingest_pregame(&self, sport: Sport, records: &[FeedRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for rec in records {
            matches::upsert_match(&mut tx, sport.as_str(), rec, false).await?;
            odds::record_snapshot(&mut tx, rec).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Force-end open rows whose kickoff is more than the staleness
    /// cutoff in the past, settling each inside the same transaction.
    pub async fn sweep_stale(&self) -> Result<SweepReport> {
        let cutoff = Utc::now() - chrono::Duration::hours(STALE_AFTER_HOURS);
        let mut tx = self.pool.begin().await?;

        let ids = matches::stale_open_ids(&mut tx, cutoff).await?;
        let mut report = SweepReport {
            marked_ended: ids.len(),
            ..SweepReport::default()
        };
        for match_id in &ids {
            matches::mark_ended(&mut tx, match_id).await?;
            let settled = settlement::settle_match(&mut tx, match_id).await?;
            report.bets_won += settled.bets_won;
            report.bets_lost += settled.bets_lost;
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Move every ended row into `ended_matches`, in batches, each batch
    /// one transaction. Returns how many rows moved.
    pub async fn archive_ended(&self) -> Result<usize> {
        let mut moved = 0usize;
        loop {
            let mut conn = self.pool.acquire().await?;
            let ids = matches::ended_ids(&mut conn, ARCHIVE_BATCH).await?;
            drop(conn);
            if ids.is_empty() {
                break;
            }

            let mut tx = self.pool.begin().await?;
            for match_id in &ids {
                matches::archive_match(&mut tx, match_id).await?;
            }
            tx.commit().await?;

            moved += ids.len();
            if (ids.len() as i64) < ARCHIVE_BATCH {
                break;
            }
        }
        Ok(moved)
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Parse a wire batch, logging how many records were dropped.
fn parse_batch(
    wires: Vec<crate::feed::WireMatch>,
    scope: FeedScope,
    utc_offset_hours: i64,
) -> Vec<FeedRecord> {
    let total = wires.len();
    let records: Vec<FeedRecord> = wires
        .into_iter()
        .filter_map(|wire| FeedRecord::from_wire(wire, scope, utc_offset_hours))
        .collect();
    if records.len() < total {
        debug!(
            dropped = total - records.len(),
            total, "Dropped unparsable feed records"
        );
    }
    records
}

/// Polls the live feed and applies each tick to the registry.
pub struct LivePoller {
    pub feed: Arc<dyn OddsFeed>,
    pub registry: MatchRegistry,
    pub utc_offset_hours: i64,
    pub interval_secs: u64,
    pub shutdown: watch::Receiver<bool>,
}

impl LivePoller {
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "Live poller running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Live tick failed, continuing to next");
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("Live poller stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let tick = Uuid::new_v4();
        // The live endpoint serves football.
        let sport = Sport::Football;

        let wires = match self.feed.fetch_live().await {
            Ok(wires) => wires,
            Err(e) => {
                warn!(
                    tick = %tick,
                    feed = self.feed.name(),
                    error = %e,
                    "Live fetch failed, reconciling with zero records"
                );
                Vec::new()
            }
        };

        let records = parse_batch(wires, FeedScope::Live, self.utc_offset_hours);
        let report = self.registry.ingest_live(sport, &records).await?;
        info!(
            tick = %tick,
            records = report.records,
            pending = report.marked_pending,
            ended = report.marked_ended,
            bets_won = report.bets_won,
            bets_lost = report.bets_lost,
            "Live tick complete"
        );
        Ok(())
    }
}

/// Polls the pregame feed for every sport on a slow cadence.
pub struct PregamePoller {
    pub feed: Arc<dyn OddsFeed>,
    pub registry: MatchRegistry,
    pub utc_offset_hours: i64,
    pub interval_secs: u64,
    pub shutdown: watch::Receiver<bool>,
}

impl PregamePoller {
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "Pregame poller running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Pregame tick failed, continuing to next");
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("Pregame poller stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let tick = Uuid::new_v4();
        for sport in Sport::ALL {
            let wires = match self.feed.fetch_pregame(sport).await {
                Ok(wires) => wires,
                Err(e) => {
                    warn!(
                        tick = %tick,
                        feed = self.feed.name(),
                        sport = sport.as_str(),
                        error = %e,
                        "Pregame fetch failed, skipping sport this tick"
                    );
                    continue;
                }
            };
            let records = parse_batch(wires, FeedScope::Pregame, self.utc_offset_hours);
            let upserted = self.registry.ingest_pregame(sport, &records).await?;
            info!(
                tick = %tick,
                sport = sport.as_str(),
                records = upserted,
                "Pregame tick complete"
            );
        }
        Ok(())
    }
}

/// Force-ends matches stuck past the staleness cutoff.
pub struct CleanupSweeper {
    pub registry: MatchRegistry,
    pub interval_secs: u64,
    pub shutdown: watch::Receiver<bool>,
}

impl CleanupSweeper {
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "Cleanup sweeper running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.registry.sweep_stale().await {
                        Ok(report) if report.marked_ended > 0 => info!(
                            ended = report.marked_ended,
                            bets_won = report.bets_won,
                            bets_lost = report.bets_lost,
                            "Cleanup sweep force-ended stale matches"
                        ),
                        Ok(_) => debug!("Cleanup sweep found nothing stale"),
                        Err(e) => error!(error = %e, "Cleanup sweep failed, continuing to next"),
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("Cleanup sweeper stopping");
                    break;
                }
            }
        }
    }
}

/// Moves ended matches into the archive table.
pub struct ArchiveSweeper {
    pub registry: MatchRegistry,
    pub interval_secs: u64,
    pub shutdown: watch::Receiver<bool>,
}

impl ArchiveSweeper {
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "Archive sweeper running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.registry.archive_ended().await {
                        Ok(moved) if moved > 0 => info!(moved, "Archived ended matches"),
                        Ok(_) => debug!("No matches to archive"),
                        Err(e) => error!(error = %e, "Archive sweep failed, continuing to next"),
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("Archive sweeper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::bets::{create_user, get_bet, get_user, place_bot_bet, BotBetSlip};
    use crate::storage::test_pool;
    use crate::types::{BetOutcome, OddsTriple, Outcome, Score};
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn make_record(match_id: &str, status: &str, clock: &str) -> FeedRecord {
        FeedRecord {
            match_id: match_id.to_string(),
            competition_name: Some("Premier League".to_string()),
            country: Some("England".to_string()),
            home_team: Some("Arsenal".to_string()),
            away_team: Some("Chelsea".to_string()),
            event_status: status.to_string(),
            match_time: clock.to_string(),
            start_time: Some(Utc::now() - ChronoDuration::minutes(30)),
            score: Score::new(1, 0),
            odds: OddsTriple::new(Some(dec!(2.0)), Some(dec!(3.0)), Some(dec!(4.0))),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_live_ingest_records_rows_and_snapshots() {
        let registry = MatchRegistry::new(test_pool().await);

        let records = vec![
            make_record("m1", "1st half", "30:00"),
            make_record("m2", "2nd half", "60:00"),
        ];
        let report = registry.ingest_live(Sport::Football, &records).await.unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.marked_pending, 0);
        assert_eq!(report.marked_ended, 0);

        let row = matches::get_match(registry.pool(), "m1").await.unwrap().unwrap();
        assert!(row.live);
        assert_eq!(row.event_status, "1st half");
        assert_eq!(odds::count_snapshots(registry.pool()).await.unwrap(), 2);
        assert!(odds::latest_for(registry.pool(), "m2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_absent_match_parks_pending_and_relists_live() {
        let registry = MatchRegistry::new(test_pool().await);

        registry
            .ingest_live(Sport::Football, &[make_record("m1", "1st half", "30:00")])
            .await
            .unwrap();

        // Absent from the next tick with a mid-game clock: parked.
        let report = registry
            .ingest_live(Sport::Football, &[make_record("m2", "1st half", "10:00")])
            .await
            .unwrap();
        assert_eq!(report.marked_pending, 1);
        let row = matches::get_match(registry.pool(), "m1").await.unwrap().unwrap();
        assert!(!row.live);
        assert_eq!(row.event_status, "pending");

        // Sighted again: back to live with the raw feed status.
        registry
            .ingest_live(Sport::Football, &[make_record("m1", "2nd half", "50:00")])
            .await
            .unwrap();
        let row = matches::get_match(registry.pool(), "m1").await.unwrap().unwrap();
        assert!(row.live);
        assert_eq!(row.event_status, "2nd half");
    }

    #[tokio::test]
    async fn test_absent_at_full_time_ends_and_settles() {
        let registry = MatchRegistry::new(test_pool().await);

        registry
            .ingest_live(Sport::Football, &[make_record("m1", "2nd half", "90:00")])
            .await
            .unwrap();

        // A bot bet riding on the home side, placed off the live snapshot.
        let mut conn = registry.pool().acquire().await.unwrap();
        let user_id = create_user(&mut conn, "a@b.c", None, dec!(100)).await.unwrap();
        drop(conn);
        let latest = odds::latest_for(registry.pool(), "m1").await.unwrap().unwrap();
        let bet_id = place_bot_bet(
            registry.pool(),
            &BotBetSlip {
                user_id,
                bot_id: 1,
                match_id: "m1".to_string(),
                selection: Outcome::Home,
                odds_id: latest.odds_id,
                stake: dec!(10),
                expected_payout: dec!(20),
            },
        )
        .await
        .unwrap()
        .unwrap();

        let report = registry
            .ingest_live(Sport::Football, &[make_record("m2", "1st half", "05:00")])
            .await
            .unwrap();
        assert_eq!(report.marked_ended, 1);
        assert_eq!(report.bets_won, 1);

        let row = matches::get_match(registry.pool(), "m1").await.unwrap().unwrap();
        assert_eq!(row.event_status, "ended");
        assert!(!row.live);
        let bet = get_bet(registry.pool(), bet_id).await.unwrap().unwrap();
        assert_eq!(bet.outcome, BetOutcome::Won);
        // 100 - 10 stake + 20 payout.
        let user = get_user(registry.pool(), user_id).await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(110));
    }

    #[tokio::test]
    async fn test_zero_records_reconciles_only_live_rows() {
        let registry = MatchRegistry::new(test_pool().await);

        registry
            .ingest_live(
                Sport::Football,
                &[
                    make_record("m1", "2nd half", "90:00"),
                    make_record("m2", "1st half", "30:00"),
                ],
            )
            .await
            .unwrap();
        // Park m2, then pin its clock at full time to make the scope
        // distinction observable.
        registry
            .ingest_live(Sport::Football, &[make_record("m1", "2nd half", "90:00")])
            .await
            .unwrap();
        sqlx::query("UPDATE matches SET match_time = '90:00' WHERE match_id = 'm2'")
            .execute(registry.pool())
            .await
            .unwrap();

        let report = registry.ingest_live(Sport::Football, &[]).await.unwrap();

        // Only the live row was reconciled: m1 ended, m2 stayed pending.
        assert_eq!(report.marked_ended, 1);
        assert_eq!(report.marked_pending, 0);
        let m1 = matches::get_match(registry.pool(), "m1").await.unwrap().unwrap();
        assert_eq!(m1.event_status, "ended");
        let m2 = matches::get_match(registry.pool(), "m2").await.unwrap().unwrap();
        assert_eq!(m2.event_status, "pending");
    }

    #[tokio::test]
    async fn test_pregame_ingest_seeds_initial_odds() {
        let registry = MatchRegistry::new(test_pool().await);

        let mut rec = make_record("m1", "pregame", "00:00");
        rec.score = Score::new(0, 0);
        registry.ingest_pregame(Sport::Football, &[rec]).await.unwrap();

        let row = matches::get_match(registry.pool(), "m1").await.unwrap().unwrap();
        assert_eq!(row.event_status, "pregame");
        assert!(!row.live);

        let initial = odds::initial_for(registry.pool(), "m1").await.unwrap().unwrap();
        assert_eq!(initial.home_win, Some(dec!(2.0)));

        // Going live later keeps the pregame price as the initial one.
        registry
            .ingest_live(Sport::Football, &[make_record("m1", "1st half", "05:00")])
            .await
            .unwrap();
        let initial = odds::initial_for(registry.pool(), "m1").await.unwrap().unwrap();
        assert_eq!(initial.home_win, Some(dec!(2.0)));
    }

    #[tokio::test]
    async fn test_sweep_stale_force_ends_old_open_rows() {
        let registry = MatchRegistry::new(test_pool().await);

        let stale_kickoff = Utc::now() - ChronoDuration::hours(4);
        let mut parked = make_record("stale-pending", "1st half", "55:00");
        parked.start_time = Some(stale_kickoff);
        let mut still_live = make_record("stale-live", "2nd half", "70:00");
        still_live.start_time = Some(stale_kickoff);
        let fresh = make_record("fresh", "1st half", "20:00");
        let mut upcoming = make_record("upcoming", "pregame", "00:00");
        upcoming.start_time = Some(stale_kickoff);

        registry
            .ingest_live(Sport::Football, &[still_live, fresh])
            .await
            .unwrap();
        registry
            .ingest_live(
                Sport::Football,
                &[
                    make_record("stale-live", "2nd half", "70:00"),
                    make_record("fresh", "1st half", "20:00"),
                    parked,
                ],
            )
            .await
            .unwrap();
        registry.ingest_pregame(Sport::Football, &[upcoming]).await.unwrap();
        // Park the pending row by leaving it out of a tick.
        registry
            .ingest_live(
                Sport::Football,
                &[
                    make_record("stale-live", "2nd half", "70:00"),
                    make_record("fresh", "1st half", "20:00"),
                ],
            )
            .await
            .unwrap();

        let report = registry.sweep_stale().await.unwrap();
        assert_eq!(report.marked_ended, 2);

        for (id, expected) in [
            ("stale-pending", "ended"),
            ("stale-live", "ended"),
            ("fresh", "1st half"),
            ("upcoming", "pregame"),
        ] {
            let row = matches::get_match(registry.pool(), id).await.unwrap().unwrap();
            assert_eq!(row.event_status, expected, "{id}");
        }
    }

    #[tokio::test]
    async fn test_archive_moves_every_ended_row() {
        let registry = MatchRegistry::new(test_pool().await);

        let mut records = Vec::new();
        for i in 0..3 {
            records.push(make_record(&format!("m{i}"), "2nd half", "90:00"));
        }
        registry.ingest_live(Sport::Football, &records).await.unwrap();
        // All three vanish at full time.
        registry.ingest_live(Sport::Football, &[]).await.unwrap();

        assert_eq!(registry.archive_ended().await.unwrap(), 3);
        assert_eq!(matches::count_open(registry.pool()).await.unwrap(), 0);
        assert_eq!(matches::count_archived(registry.pool()).await.unwrap(), 3);

        // Nothing left to move on the next sweep.
        assert_eq!(registry.archive_ended().await.unwrap(), 0);
    }
}
