//! Entity resolver: external results against internal leagues, teams and
//! archived matches.
//!
//! Resolution is two-stage exact matching, canonical name first and alias
//! second, scoped by country code for leagues and by league membership for
//! teams. Nothing fuzzy happens here; a name either resolves or the result
//! persists with null foreign keys until an alias arrives and a reprocess
//! pass picks it up.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::feed::{ProviderCategory, ProviderEvent, ResultsProvider};
use crate::storage::entities;
use crate::storage::matches;
use crate::storage::rows::NewExternalResult;

/// Reconciliation window around the external kickoff, each side.
const RECONCILE_WINDOW_MINUTES: i64 = 15;

/// Country-code bucket for competitions the provider lists without an
/// alpha-2 code.
const INT_CODE: &str = "INT";

// ---------------------------------------------------------------------------
// Category cache
// ---------------------------------------------------------------------------

/// TTL cache over the provider's category catalog. The catalog changes
/// rarely; one fetch serves a whole ingest run and then some.
pub struct CategoryCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Vec<ProviderCategory>)>>,
}

impl CategoryCache {
    pub fn new(ttl: Duration) -> Self {
        CategoryCache {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// The catalog, fetched through `provider` when the cached copy is
    /// missing or older than the TTL.
    pub async fn categories(
        &self,
        provider: &dyn ResultsProvider,
    ) -> Result<Vec<ProviderCategory>> {
        let mut slot = self.slot.lock().await;
        if let Some((fetched_at, catalog)) = slot.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(catalog.clone());
            }
        }
        let catalog = provider.fetch_categories().await?;
        info!(categories = catalog.len(), "Refreshed results category catalog");
        *slot = Some((Instant::now(), catalog.clone()));
        Ok(catalog)
    }

    /// Drop the cached catalog; the next lookup refetches.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

/// Category ids whose alpha-2 code appears in `codes`. Categories with no
/// code at all fall into the `"INT"` bucket.
fn category_ids(catalog: &[ProviderCategory], codes: &HashSet<String>) -> Vec<i64> {
    let mut ids = Vec::new();
    for cat in catalog {
        match cat.alpha2.as_deref() {
            Some(code) if !code.is_empty() => {
                if codes.contains(code) {
                    ids.push(cat.id);
                }
            }
            _ => {
                if codes.contains(INT_CODE) {
                    ids.push(cat.id);
                }
            }
        }
    }
    ids
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Outcome of matching one external result to the archive. `NotFound` and
/// `Ambiguous` are distinct on purpose; neither links a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Matched(String),
    NotFound,
    Ambiguous,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ResultsIngestReport {
    pub dates_processed: usize,
    pub dates_skipped: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub league_missing: usize,
    pub teams_missing: usize,
    pub fully_matched: usize,
    pub reconciled: usize,
    pub ambiguous: usize,
}

#[derive(Clone)]
pub struct EntityResolver {
    pool: SqlitePool,
    provider: Arc<dyn ResultsProvider>,
    categories: Arc<CategoryCache>,
}

impl EntityResolver {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn ResultsProvider>,
        categories: Arc<CategoryCache>,
    ) -> Self {
        EntityResolver {
            pool,
            provider,
            categories,
        }
    }

    /// Ingest provider results for every date in `[from, to]`, one date at
    /// a time. A date only queries the categories whose country codes had
    /// archived matches that day; dates with none are skipped outright.
    /// Each date's records persist in one transaction.
    pub async fn ingest_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ResultsIngestReport> {
        let mut report = ResultsIngestReport::default();
        let mut seen: HashSet<i64> = HashSet::new();

        let mut date = from;
        while date <= to {
            report.dates_processed += 1;
            self.ingest_date(date, &mut seen, &mut report).await?;
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        info!(
            dates = report.dates_processed,
            skipped = report.dates_skipped,
            fetched = report.fetched,
            inserted = report.inserted,
            duplicates = report.duplicates,
            fully_matched = report.fully_matched,
            reconciled = report.reconciled,
            ambiguous = report.ambiguous,
            "Results ingest complete"
        );
        Ok(report)
    }

    async fn ingest_date(
        &self,
        date: NaiveDate,
        seen: &mut HashSet<i64>,
        report: &mut ResultsIngestReport,
    ) -> Result<()> {
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let codes: HashSet<String> =
            entities::archived_country_codes(&self.pool, day_start, day_end)
                .await?
                .into_iter()
                .collect();
        if codes.is_empty() {
            debug!(date = %date, "No archived matches for date, skipping");
            report.dates_skipped += 1;
            return Ok(());
        }

        let catalog = match self.categories.categories(self.provider.as_ref()).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(date = %date, error = %e, "Category catalog unavailable, skipping date");
                report.dates_skipped += 1;
                return Ok(());
            }
        };
        let ids = category_ids(&catalog, &codes);
        if ids.is_empty() {
            warn!(date = %date, codes = codes.len(), "No provider categories for country codes");
            report.dates_skipped += 1;
            return Ok(());
        }

        let mut events: Vec<ProviderEvent> = Vec::new();
        for category_id in &ids {
            match self.provider.fetch_events(*category_id, date).await {
                Ok(batch) => events.extend(batch),
                Err(e) => {
                    warn!(category = category_id, date = %date, error = %e,
                          "Event fetch failed, skipping category");
                }
            }
        }
        info!(
            date = %date,
            codes = codes.len(),
            categories = ids.len(),
            events = events.len(),
            "Results ingest date"
        );

        let mut records: Vec<NewExternalResult> = Vec::new();
        for event in &events {
            let Some(kickoff) = event.kickoff() else {
                continue;
            };
            if kickoff < day_start || kickoff >= day_end {
                continue;
            }
            if !seen.insert(event.id) {
                report.duplicates += 1;
                continue;
            }
            report.fetched += 1;

            let mut record = event_to_record(event, kickoff);
            let (league_id, home_id, away_id) = self
                .resolve_ids(
                    record.competition_name.as_deref(),
                    record.country_code.as_deref(),
                    record.home_team.as_deref(),
                    record.away_team.as_deref(),
                )
                .await?;
            if league_id.is_none() {
                report.league_missing += 1;
            } else {
                if home_id.is_none() {
                    report.teams_missing += 1;
                }
                if away_id.is_none() {
                    report.teams_missing += 1;
                }
            }

            record.league_id = league_id;
            record.home_team_id = home_id;
            record.away_team_id = away_id;

            if let (Some(league), Some(home), Some(away)) = (league_id, home_id, away_id) {
                report.fully_matched += 1;
                let code = record.country_code.as_deref().unwrap_or(INT_CODE);
                match self.reconcile(code, league, home, away, kickoff).await? {
                    Reconciliation::Matched(match_id) => {
                        report.reconciled += 1;
                        record.match_id = Some(match_id);
                    }
                    Reconciliation::Ambiguous => {
                        report.ambiguous += 1;
                        warn!(
                            external_id = event.id,
                            "Ambiguous reconciliation, leaving result unlinked"
                        );
                    }
                    Reconciliation::NotFound => {
                        debug!(external_id = event.id, "No archived match for result");
                    }
                }
            }

            records.push(record);
        }

        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in &records {
            if entities::insert_external_result(&mut tx, record).await? {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Match one fully resolved result to an archived match. Exact kickoff
    /// equality wins when it singles out one candidate; otherwise the
    /// window around the kickoff must contain exactly one.
    pub async fn reconcile(
        &self,
        country_code: &str,
        league_id: i64,
        home_team_id: i64,
        away_team_id: i64,
        kickoff: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let margin = chrono::Duration::minutes(RECONCILE_WINDOW_MINUTES);
        let window =
            matches::archived_in_window(&self.pool, kickoff - margin, kickoff + margin).await?;

        let mut candidates: Vec<(String, Option<DateTime<Utc>>)> = Vec::new();
        for row in &window {
            let Some(competition) = row.competition_name.as_deref() else {
                continue;
            };
            let Some(candidate_league) =
                entities::find_league(&self.pool, competition, country_code).await?
            else {
                continue;
            };
            if candidate_league != league_id {
                continue;
            }
            let Some(home_name) = row.home_team.as_deref() else {
                continue;
            };
            let Some(away_name) = row.away_team.as_deref() else {
                continue;
            };
            if entities::find_team(&self.pool, home_name, league_id).await? != Some(home_team_id) {
                continue;
            }
            if entities::find_team(&self.pool, away_name, league_id).await? != Some(away_team_id) {
                continue;
            }
            candidates.push((row.match_id.clone(), row.start_time));
        }

        let exact: Vec<&(String, Option<DateTime<Utc>>)> = candidates
            .iter()
            .filter(|(_, start)| *start == Some(kickoff))
            .collect();
        if exact.len() == 1 {
            return Ok(Reconciliation::Matched(exact[0].0.clone()));
        }
        match candidates.len() {
            0 => Ok(Reconciliation::NotFound),
            1 => Ok(Reconciliation::Matched(candidates.remove(0).0)),
            _ => Ok(Reconciliation::Ambiguous),
        }
    }

    /// Re-run resolution and reconciliation over every stored result that
    /// still has a null column, overwriting whatever was there. Returns
    /// how many results ended up fully linked.
    pub async fn reprocess_unresolved(&self) -> Result<usize> {
        let rows = entities::unresolved_results(&self.pool).await?;
        let total = rows.len();
        let mut linked = 0usize;

        for row in rows {
            let (league_id, home_id, away_id) = self
                .resolve_ids(
                    row.competition_name.as_deref(),
                    row.country_code.as_deref(),
                    row.home_team.as_deref(),
                    row.away_team.as_deref(),
                )
                .await?;

            let mut match_id: Option<String> = None;
            if let (Some(league), Some(home), Some(away), Some(kickoff)) =
                (league_id, home_id, away_id, row.start_time)
            {
                let code = row.country_code.as_deref().unwrap_or(INT_CODE);
                if let Reconciliation::Matched(id) =
                    self.reconcile(code, league, home, away, kickoff).await?
                {
                    match_id = Some(id);
                }
            }

            let mut conn = self.pool.acquire().await?;
            entities::update_result_resolution(
                &mut conn,
                row.result_id,
                league_id,
                home_id,
                away_id,
                match_id.as_deref(),
            )
            .await?;

            if league_id.is_some() && home_id.is_some() && away_id.is_some() && match_id.is_some()
            {
                linked += 1;
            }
        }

        info!(reprocessed = total, linked, "Reprocessed unresolved results");
        Ok(linked)
    }

    /// League then teams, each stage exact-match canonical-then-alias.
    /// Without a league there is no scope to resolve teams in.
    async fn resolve_ids(
        &self,
        competition: Option<&str>,
        country_code: Option<&str>,
        home: Option<&str>,
        away: Option<&str>,
    ) -> Result<(Option<i64>, Option<i64>, Option<i64>)> {
        let league_id = match (competition, country_code) {
            (Some(name), Some(code)) => entities::find_league(&self.pool, name, code).await?,
            _ => None,
        };
        let Some(league) = league_id else {
            return Ok((None, None, None));
        };

        let home_id = match home {
            Some(name) => entities::find_team(&self.pool, name, league).await?,
            None => None,
        };
        let away_id = match away {
            Some(name) => entities::find_team(&self.pool, name, league).await?,
            None => None,
        };
        Ok((league_id, home_id, away_id))
    }
}

/// Flatten one provider event into a storable result record. Blank alpha-2
/// codes bucket under "INT"/"International"; the provider tags amateur
/// divisions by suffixing the country name, which is stripped.
fn event_to_record(event: &ProviderEvent, kickoff: DateTime<Utc>) -> NewExternalResult {
    let country_code = event
        .tournament
        .category
        .alpha2
        .as_deref()
        .filter(|code| !code.trim().is_empty())
        .unwrap_or(INT_CODE)
        .to_string();

    let country = if country_code == INT_CODE {
        Some("International".to_string())
    } else {
        event.tournament.category.name.clone()
    }
    .map(|name| name.replace("Amateur", "").trim().to_string());

    NewExternalResult {
        external_id: event.id,
        competition_name: event.tournament.name.clone(),
        category: event.tournament.category.sport.name.clone(),
        country,
        country_code: Some(country_code),
        home_team: event.home_team.name.clone(),
        away_team: event.away_team.name.clone(),
        home_score: event.home_score.normaltime,
        away_score: event.away_score.normaltime,
        start_time: Some(kickoff),
        event_status: event.status.kind.clone(),
        league_id: None,
        home_team_id: None,
        away_team_id: None,
        match_id: None,
    }
}
