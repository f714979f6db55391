//! Database row types matching the schema in `migrations/`.
//! Enum-valued columns are read as text and mapped onto domain types here.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppError;
use crate::types::{Candle, DataSource, ExtraInfo, Group, IntradayCandle, Performance, Stock, TickerType};

#[derive(Debug, sqlx::FromRow)]
pub struct StockRow {
    pub source: String,
    pub ticker: String,
    pub exchange: String,
    pub sector_name: String,
    pub sector_url: String,
    pub industry_name: String,
    pub industry_url: String,
    pub last_update: NaiveDate,
}

impl TryFrom<StockRow> for Stock {
    type Error = AppError;

    fn try_from(r: StockRow) -> Result<Self, Self::Error> {
        let source = r
            .source
            .parse::<DataSource>()
            .map_err(|_| AppError::InvalidData(format!("stocks.source = {:?}", r.source)))?;
        Ok(Stock {
            source,
            ticker: r.ticker,
            exchange: r.exchange,
            sector: Group {
                name: r.sector_name,
                url: r.sector_url,
            },
            industry: Group {
                name: r.industry_name,
                url: r.industry_url,
            },
            last_update: r.last_update,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PerformanceRow {
    pub id: i64,
    pub ticker: String,
    pub ticker_type: String,
    pub perf_1m: f64,
    pub perf_3m: f64,
    pub perf_6m: f64,
    pub perf_1y: f64,
    pub extra_info: String,
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<PerformanceRow> for Performance {
    type Error = AppError;

    fn try_from(r: PerformanceRow) -> Result<Self, Self::Error> {
        let ticker_type = r.ticker_type.parse::<TickerType>().map_err(|_| {
            AppError::InvalidData(format!("performance[{}].ticker_type = {:?}", r.id, r.ticker_type))
        })?;
        let extra_info = serde_json::from_str::<ExtraInfo>(&r.extra_info).map_err(|e| {
            AppError::InvalidData(format!("performance[{}].extra_info: {e}", r.id))
        })?;
        Ok(Performance {
            ticker: r.ticker,
            ticker_type,
            perf_1m: r.perf_1m,
            perf_3m: r.perf_3m,
            perf_6m: r.perf_6m,
            perf_1y: r.perf_1y,
            extra_info,
            last_updated: r.last_updated,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DailyCandleRow {
    pub ds: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub last_updated: DateTime<Utc>,
}

impl From<DailyCandleRow> for Candle {
    fn from(r: DailyCandleRow) -> Self {
        Candle {
            timestamp: r.ds,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume.max(0) as u64,
            last_updated: r.last_updated,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct IntradayCandleRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl From<IntradayCandleRow> for IntradayCandle {
    fn from(r: IntradayCandleRow) -> Self {
        IntradayCandle {
            timestamp: r.timestamp,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume.max(0) as u64,
        }
    }
}

/// Row counts reported by /health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableCounts {
    pub stocks: i64,
    pub performance: i64,
    pub daily_candles: i64,
    pub candles: i64,
}
