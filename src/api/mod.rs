//! Status API: Axum web server over the engine's storage.
//!
//! Read-only JSON views of matches, odds and bets, plus the two resolver
//! operations (date-range results ingest, unresolved reprocess). CORS is
//! open for local tooling.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::ApiState;

/// Start the API server.
///
/// This spawns a background task and returns immediately; the server
/// drains and stops once the shutdown signal flips.
pub fn spawn_api(state: ApiState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Status API starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind API port");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .expect("API server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/matches/live", get(routes::get_live_matches))
        .route("/api/matches/:match_id/odds", get(routes::get_match_odds))
        .route("/api/bets/recent", get(routes::get_recent_bets))
        .route("/api/results/ingest", post(routes::post_results_ingest))
        .route("/api/resolver/reprocess", post(routes::post_reprocess))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
