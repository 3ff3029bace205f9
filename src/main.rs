//! NINETY: Sports odds lifecycle and settlement engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, seeds the preset bots, and spawns the polling
//! loops and the status API with graceful shutdown.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use ninety::api;
use ninety::api::routes::ApiContext;
use ninety::bots::{seed_presets, BotEngine, BotWorker};
use ninety::config;
use ninety::feed::results::ResultsClient;
use ninety::feed::SportsbookFeed;
use ninety::registry::{ArchiveSweeper, CleanupSweeper, LivePoller, MatchRegistry, PregamePoller};
use ninety::resolver::{CategoryCache, EntityResolver};
use ninety::storage;

const BANNER: &str = r#"
 _   _ ___ _   _ _____ _____ __   __
| \ | |_ _| \ | | ____|_   _|\ \ / /
|  \| || ||  \| |  _|   | |   \ V /
| |\  || || |\  | |___  | |    | |
|_| \_|___|_| \_|_____| |_|    |_|

  Match lifecycle, odds ledger, automated settlement
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        live_interval_secs = cfg.service.live_interval_secs,
        pregame_interval_secs = cfg.service.pregame_interval_secs,
        cleanup_interval_secs = cfg.service.cleanup_interval_secs,
        archive_interval_secs = cfg.service.archive_interval_secs,
        "NINETY starting up"
    );

    // -- Storage and components --------------------------------------------

    let pool = storage::connect(&cfg.database).await?;

    if cfg.bots.seed_presets {
        let created = seed_presets(&pool).await?;
        info!(created, "Preset bots ready");
    }

    let feed = Arc::new(SportsbookFeed::new(&cfg.feeds)?);
    let registry = MatchRegistry::new(pool.clone());
    let resolver = EntityResolver::new(
        pool.clone(),
        Arc::new(ResultsClient::new(&cfg.results)?),
        Arc::new(CategoryCache::new(std::time::Duration::from_secs(
            cfg.results.category_ttl_secs,
        ))),
    );

    // -- Workers ------------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    workers.push(tokio::spawn(
        LivePoller {
            feed: feed.clone(),
            registry: registry.clone(),
            utc_offset_hours: cfg.feeds.utc_offset_hours,
            interval_secs: cfg.service.live_interval_secs,
            shutdown: shutdown_rx.clone(),
        }
        .run(),
    ));

    if cfg.feeds.pregame_enabled {
        workers.push(tokio::spawn(
            PregamePoller {
                feed: feed.clone(),
                registry: registry.clone(),
                utc_offset_hours: cfg.feeds.utc_offset_hours,
                interval_secs: cfg.service.pregame_interval_secs,
                shutdown: shutdown_rx.clone(),
            }
            .run(),
        ));
    }

    workers.push(tokio::spawn(
        CleanupSweeper {
            registry: registry.clone(),
            interval_secs: cfg.service.cleanup_interval_secs,
            shutdown: shutdown_rx.clone(),
        }
        .run(),
    ));

    workers.push(tokio::spawn(
        ArchiveSweeper {
            registry: registry.clone(),
            interval_secs: cfg.service.archive_interval_secs,
            shutdown: shutdown_rx.clone(),
        }
        .run(),
    ));

    if cfg.bots.enabled {
        workers.push(tokio::spawn(
            BotWorker {
                engine: BotEngine::new(pool.clone()),
                interval_secs: cfg.bots.interval_secs,
                shutdown: shutdown_rx.clone(),
            }
            .run(),
        ));
    }

    if cfg.api.enabled {
        let state = Arc::new(ApiContext {
            pool: pool.clone(),
            resolver: resolver.clone(),
        });
        api::spawn_api(state, cfg.api.port, shutdown_rx.clone())?;
    }

    info!(
        workers = workers.len(),
        "Entering service loop. Press Ctrl+C to stop."
    );

    // -- Shutdown -----------------------------------------------------------

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(true);

    for worker in workers {
        let _ = worker.await;
    }

    info!("NINETY shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ninety=info"));

    let json_logging = std::env::var("NINETY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
