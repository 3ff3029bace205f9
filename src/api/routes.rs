//! Status API route handlers.
//!
//! All endpoints return JSON. Read endpoints go straight to the pool; the
//! resolver handles the two POST operations.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::error;

use crate::resolver::{EntityResolver, ResultsIngestReport};
use crate::storage::rows::{BetRow, MatchRow, OddsSnapshotRow};
use crate::storage::{bets, entities, matches, odds};
use crate::types::Outcome;

const RECENT_BETS_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiContext {
    pub pool: SqlitePool,
    pub resolver: EntityResolver,
}

pub type ApiState = Arc<ApiContext>;

fn internal(e: anyhow::Error) -> StatusCode {
    error!(error = %e, "API handler failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub open_matches: i64,
    pub live_matches: i64,
    pub archived_matches: i64,
    pub odds_snapshots: i64,
    pub pending_bets: i64,
    pub unresolved_results: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub match_id: String,
    pub competition_name: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub event_status: String,
    pub match_time: String,
    pub start_time: Option<DateTime<Utc>>,
}

impl From<MatchRow> for MatchView {
    fn from(row: MatchRow) -> Self {
        MatchView {
            match_id: row.match_id,
            competition_name: row.competition_name,
            category: row.category,
            country: row.country,
            home_team: row.home_team,
            away_team: row.away_team,
            event_status: row.event_status,
            match_time: row.match_time,
            start_time: row.start_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OddsView {
    pub odds_id: i64,
    pub event_status: String,
    pub match_time: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub home_win: Option<Decimal>,
    pub draw: Option<Decimal>,
    pub away_win: Option<Decimal>,
    pub fetched_at: DateTime<Utc>,
}

impl From<OddsSnapshotRow> for OddsView {
    fn from(row: OddsSnapshotRow) -> Self {
        OddsView {
            odds_id: row.odds_id,
            event_status: row.event_status,
            match_time: row.match_time,
            home_score: row.home_score,
            away_score: row.away_score,
            home_win: row.home_win,
            draw: row.draw,
            away_win: row.away_win,
            fetched_at: row.fetched_at,
        }
    }
}

/// Derived views for one match, bundled.
#[derive(Debug, Clone, Serialize)]
pub struct OddsBundle {
    pub match_id: String,
    pub latest: Option<OddsView>,
    pub initial: Option<OddsView>,
    pub max_home: Option<OddsView>,
    pub max_draw: Option<OddsView>,
    pub max_away: Option<OddsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetView {
    pub bet_id: i64,
    pub user_id: i64,
    pub kind: String,
    pub stake: Decimal,
    pub expected_payout: Decimal,
    pub outcome: String,
    pub bot_id: Option<i64>,
    pub match_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<BetRow> for BetView {
    fn from(row: BetRow) -> Self {
        BetView {
            bet_id: row.bet_id,
            user_id: row.user_id,
            kind: row.kind.as_str().to_string(),
            stake: row.stake,
            expected_payout: row.expected_payout,
            outcome: row.outcome.as_str().to_string(),
            bot_id: row.bot_id,
            match_id: row.match_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReprocessResponse {
    pub linked: usize,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, StatusCode> {
    let pool = &state.pool;
    Ok(Json(StatusResponse {
        open_matches: matches::count_open(pool).await.map_err(internal)?,
        live_matches: matches::count_live(pool).await.map_err(internal)?,
        archived_matches: matches::count_archived(pool).await.map_err(internal)?,
        odds_snapshots: odds::count_snapshots(pool).await.map_err(internal)?,
        pending_bets: bets::count_pending_bets(pool).await.map_err(internal)?,
        unresolved_results: entities::count_unresolved(pool).await.map_err(internal)?,
    }))
}

/// GET /api/matches/live
pub async fn get_live_matches(
    State(state): State<ApiState>,
) -> Result<Json<Vec<MatchView>>, StatusCode> {
    let rows = matches::live_matches(&state.pool).await.map_err(internal)?;
    Ok(Json(rows.into_iter().map(MatchView::from).collect()))
}

/// GET /api/matches/:match_id/odds
pub async fn get_match_odds(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Result<Json<OddsBundle>, StatusCode> {
    let pool = &state.pool;
    let initial = odds::initial_for(pool, &match_id).await.map_err(internal)?;
    // The initial view is written with the first snapshot a match ever
    // gets, so its absence means the id is unknown to the ledger.
    if initial.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let latest = odds::latest_for(pool, &match_id).await.map_err(internal)?;
    let max_home = odds::max_for(pool, Outcome::Home, &match_id).await.map_err(internal)?;
    let max_draw = odds::max_for(pool, Outcome::Draw, &match_id).await.map_err(internal)?;
    let max_away = odds::max_for(pool, Outcome::Away, &match_id).await.map_err(internal)?;

    Ok(Json(OddsBundle {
        match_id,
        latest: latest.map(OddsView::from),
        initial: initial.map(OddsView::from),
        max_home: max_home.map(OddsView::from),
        max_draw: max_draw.map(OddsView::from),
        max_away: max_away.map(OddsView::from),
    }))
}

/// GET /api/bets/recent
pub async fn get_recent_bets(
    State(state): State<ApiState>,
) -> Result<Json<Vec<BetView>>, StatusCode> {
    let rows = bets::recent_bets(&state.pool, RECENT_BETS_LIMIT)
        .await
        .map_err(internal)?;
    Ok(Json(rows.into_iter().map(BetView::from).collect()))
}

/// POST /api/results/ingest
pub async fn post_results_ingest(
    State(state): State<ApiState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<ResultsIngestReport>, StatusCode> {
    if req.end_date < req.start_date {
        return Err(StatusCode::BAD_REQUEST);
    }
    let report = state
        .resolver
        .ingest_range(req.start_date, req.end_date)
        .await
        .map_err(internal)?;
    Ok(Json(report))
}

/// POST /api/resolver/reprocess
pub async fn post_reprocess(
    State(state): State<ApiState>,
) -> Result<Json<ReprocessResponse>, StatusCode> {
    let linked = state
        .resolver
        .reprocess_unresolved()
        .await
        .map_err(internal)?;
    Ok(Json(ReprocessResponse { linked }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
