mod analytics;
mod api;
mod config;
mod db;
mod error;
mod maintenance;
mod market_clock;
mod state;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::{open_pool, run_migrations, Store};
use crate::error::Result;
use crate::maintenance::Maintenance;
use crate::market_clock::MarketClock;
use crate::state::CandleCache;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = open_pool(&cfg.db_path).await?;
    run_migrations(&pool).await?;
    let store = Store::new(pool);

    let counts = store.counts().await?;
    info!(
        event = "STARTUP",
        db_path = %cfg.db_path,
        stocks = counts.stocks,
        performance = counts.performance,
        daily_candles = counts.daily_candles,
        candles = counts.candles,
        "Database ready at {} | {} stocks | {} performance rows | {} daily candles | {} intraday candles",
        cfg.db_path,
        counts.stocks,
        counts.performance,
        counts.daily_candles,
        counts.candles,
    );

    // --- Shared state ---
    let cache = CandleCache::new();
    let health = Arc::new(HealthState::new());
    let clock = MarketClock::from_config(&cfg);

    // Maintenance (background, hourly)
    let maintenance = Maintenance::new(&cfg, store.clone(), Arc::clone(&cache), Arc::clone(&health));
    tokio::spawn(async move { maintenance.run().await });

    // HTTP API server
    let api_state = ApiState {
        store,
        cache,
        clock,
        latency: Arc::new(LatencyStats::new()),
        health,
        base_ticker: cfg.base_ticker.clone(),
        candle_history_days: cfg.candle_history_days,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        benchmark = %cfg.base_ticker,
        market_tz = %cfg.market_tz,
        "HTTP API listening on {bind_addr}"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
