use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::config::{Config, MAINTENANCE_INTERVAL_SECS};
use crate::db::Store;
use crate::error::Result;
use crate::state::CandleCache;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub stocks_evicted: u64,
    pub candles_pruned: u64,
}

/// Background task that evicts stale stock rows and prunes old daily candles.
pub struct Maintenance {
    store: Store,
    cache: Arc<CandleCache>,
    health: Arc<HealthState>,
    stock_retention_days: i64,
    candle_history_days: i64,
}

impl Maintenance {
    pub fn new(cfg: &Config, store: Store, cache: Arc<CandleCache>, health: Arc<HealthState>) -> Self {
        Self {
            store,
            cache,
            health,
            stock_retention_days: cfg.stock_retention_days,
            candle_history_days: cfg.candle_history_days,
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));

        loop {
            // first tick completes immediately: one pass at startup
            interval.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                error!("Maintenance error: {e}");
            }
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let stock_cutoff = now.date_naive() - TimeDelta::days(self.stock_retention_days);
        let candle_cutoff = now - TimeDelta::days(self.candle_history_days);

        let report = MaintenanceReport {
            stocks_evicted: self.store.evict_stale_stocks(stock_cutoff).await?,
            candles_pruned: self.store.prune_daily_candles(candle_cutoff).await?,
        };
        if report.candles_pruned > 0 {
            self.cache.clear();
        }
        self.health.record_maintenance();

        info!(
            event = "MAINTENANCE",
            stocks_evicted = report.stocks_evicted,
            candles_pruned = report.candles_pruned,
            %stock_cutoff,
            "Maintenance pass complete | evicted {} stocks | pruned {} candles",
            report.stocks_evicted,
            report.candles_pruned,
        );
        Ok(report)
    }
}
