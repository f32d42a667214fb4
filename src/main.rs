//! ALCHEMIST: high-alchemy item recommendation engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the market adapters and the search coordinator, and runs the
//! tick loop with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use alchemist::config;
use alchemist::dashboard::{self, DashboardState, RefreshTracker};
use alchemist::display::LogDisplay;
use alchemist::engine::coordinator::SearchCoordinator;
use alchemist::market::item_db::ItemDatabase;
use alchemist::market::prices::WikiPriceClient;
use alchemist::market::volume::WikiVolumeClient;
use alchemist::types::SearchMode;

const BANNER: &str = r#"
    _    _     ____ _   _ _____ __  __ ___ ____ _____
   / \  | |   / ___| | | | ____|  \/  |_ _/ ___|_   _|
  / _ \ | |  | |   | |_| |  _| | |\/| || |\___ \ | |
 / ___ \| |__| |___|  _  | |___| |  | || | ___) || |
/_/   \_\_____\____|_| |_|_____|_|  |_|___|____/ |_|

  High-alchemy item recommendations
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("ALCHEMIST_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        tick_interval_ms = cfg.agent.tick_interval_ms,
        max_recommendations = cfg.selection.max_recommendations,
        membership = %cfg.selection.membership_filter,
        tiers = cfg.selection.tiers.len(),
        "ALCHEMIST starting up"
    );

    // -- Initialise components -------------------------------------------

    let prices = Arc::new(WikiPriceClient::new(&cfg.market)?);
    let volume = Arc::new(
        WikiVolumeClient::new(&cfg.market).context("Failed to build volume client")?,
    );
    let item_db = Arc::new(ItemDatabase::new(&cfg.market)?);

    // Membership data loads in the background; until then every item
    // classifies as unknown and passes the filter.
    {
        let item_db = item_db.clone();
        tokio::spawn(async move {
            match item_db.ensure_loaded().await {
                Ok(()) => info!(items = item_db.cache_size(), "Membership data ready"),
                Err(e) => warn!(error = %e, "Item database unavailable, membership filter inactive"),
            }
        });
    }

    let refresh = Arc::new(RefreshTracker::new());
    let coordinator = Arc::new(
        SearchCoordinator::from_config(&cfg.selection, prices, volume, item_db)
            .with_listener(Arc::new(LogDisplay::new(cfg.selection.max_total_cost)))
            .with_listener(refresh.clone()),
    );

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            coordinator.clone(),
            refresh,
            cfg.selection.max_total_cost,
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port)?;
    }

    if cfg.agent.search_on_start {
        coordinator.request_search(SearchMode::ReplaceAll);
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_millis(cfg.agent.tick_interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        tick_interval_ms = cfg.agent.tick_interval_ms,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if coordinator.is_search_allowed() {
                    let coordinator = coordinator.clone();
                    tokio::spawn(async move {
                        if coordinator.run_search().await.is_none() {
                            debug!("Search already running, tick skipped");
                        }
                    });
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let last = coordinator.last_run().await;
    info!(
        recommendations = coordinator.snapshot().await.len(),
        last_run = ?last.map(|r| r.run_id),
        "ALCHEMIST shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alchemist=info"));

    let json_logging = std::env::var("ALCHEMIST_LOG_JSON").is_ok();

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
