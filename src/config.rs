use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{AppError, Result};

/// Benchmark every relative-strength figure is measured against.
pub const BASE_TICKER: &str = "SPY";

/// Stock reference rows older than this many days are evicted.
pub const STOCK_RETENTION_DAYS: i64 = 30;

/// Daily candles older than this many days are pruned and not served by default.
pub const CANDLE_HISTORY_DAYS: i64 = 2 * 365;

/// Maintenance (eviction + pruning) interval in seconds.
pub const MAINTENANCE_INTERVAL_SECS: u64 = 3_600;

/// Maximum connections in the SQLite pool. WAL supports concurrent readers.
pub const DB_MAX_CONNECTIONS: u32 = 4;

/// Milliseconds a connection waits on a locked database before erroring.
pub const DB_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on tickers whose daily series are held by the candle cache.
pub const MAX_CACHED_SERIES: usize = 1_024;

/// Upper bound on rows accepted by a single batch PUT.
pub const MAX_BATCH_ROWS: usize = 10_000;

/// RRG query defaults.
pub mod rrg_defaults {
    pub const TAIL: usize = 12;
    pub const HISTORY: usize = 52;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Benchmark ticker (BASE_TICKER)
    pub base_ticker: String,
    /// Days before a stock row is evicted (STOCK_RETENTION_DAYS)
    pub stock_retention_days: i64,
    /// Days of daily candles kept and served (CANDLE_HISTORY_DAYS)
    pub candle_history_days: i64,
    /// Regular session open in exchange time (MARKET_OPEN, HH:MM)
    pub market_open: NaiveTime,
    /// Regular session close in exchange time (MARKET_CLOSE, HH:MM)
    pub market_close: NaiveTime,
    /// Exchange time zone (MARKET_TZ, IANA name)
    pub market_tz: Tz,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let market_open = parse_time("MARKET_OPEN", "09:30")?;
        let market_close = parse_time("MARKET_CLOSE", "16:00")?;
        if market_open >= market_close {
            return Err(AppError::Config(
                "MARKET_OPEN must be earlier than MARKET_CLOSE".to_string(),
            ));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "stocks.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            base_ticker: std::env::var("BASE_TICKER")
                .map(|t| t.trim().to_uppercase())
                .ok()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| BASE_TICKER.to_string()),
            stock_retention_days: parse_days("STOCK_RETENTION_DAYS", STOCK_RETENTION_DAYS)?,
            candle_history_days: parse_days("CANDLE_HISTORY_DAYS", CANDLE_HISTORY_DAYS)?,
            market_open,
            market_close,
            market_tz: std::env::var("MARKET_TZ")
                .unwrap_or_else(|_| "America/New_York".to_string())
                .parse::<Tz>()
                .map_err(|_| AppError::Config("MARKET_TZ must be an IANA time zone".to_string()))?,
        })
    }
}

fn parse_time(var: &str, default: &str) -> Result<NaiveTime> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| AppError::Config(format!("{var} must be HH:MM, got {raw:?}")))
}

fn parse_days(var: &str, default: i64) -> Result<i64> {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(days) if days > 0 => Ok(days),
            _ => Err(AppError::Config(format!(
                "{var} must be a positive number of days"
            ))),
        },
        Err(_) => Ok(default),
    }
}
