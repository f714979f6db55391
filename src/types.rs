use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Sources and ticker kinds
// ---------------------------------------------------------------------------

/// Data provider a stock row was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// TradingView
    Tv,
    /// Yahoo Finance
    Yf,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Tv => "tv",
            DataSource::Yf => "yf",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tv" => Ok(DataSource::Tv),
            "yf" => Ok(DataSource::Yf),
            other => Err(AppError::InvalidInput(format!("unknown data source: {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickerType {
    Sector,
    Industry,
    Stock,
}

impl TickerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickerType::Sector => "Sector",
            TickerType::Industry => "Industry",
            TickerType::Stock => "Stock",
        }
    }
}

impl std::fmt::Display for TickerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TickerType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sector" => Ok(TickerType::Sector),
            "industry" => Ok(TickerType::Industry),
            "stock" => Ok(TickerType::Stock),
            other => Err(AppError::InvalidInput(format!("unknown ticker type: {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stock reference data
// ---------------------------------------------------------------------------

/// A sector or industry classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub url: String,
}

impl Group {
    pub fn new(name: &str, url: impl Into<String>) -> Self {
        Self {
            name: normalize_group_name(name),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    #[serde(default = "default_source")]
    pub source: DataSource,
    pub ticker: String,
    pub exchange: String,
    pub sector: Group,
    pub industry: Group,
    pub last_update: NaiveDate,
}

fn default_source() -> DataSource {
    DataSource::Tv
}

impl Stock {
    /// Canonical form used for storage: upper-case ticker and exchange, normalized group names.
    pub fn normalized(mut self) -> Self {
        self.ticker = normalize_ticker(&self.ticker);
        self.exchange = self.exchange.trim().to_uppercase();
        self.sector.name = normalize_group_name(&self.sector.name);
        self.industry.name = normalize_group_name(&self.industry.name);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub exchange: String,
    pub ticker: String,
}

pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// Cleans a sector/industry name scraped from a provider.
///
/// Slash lookalikes become `/`, any unicode whitespace run collapses to one space,
/// and words are title-cased with both ' ' and '/' treated as word boundaries.
pub fn normalize_group_name(input: &str) -> String {
    let slashes = input.replace(['\u{FF0F}', '\u{2044}', '\u{2215}', '\u{29F8}'], "/");
    let collapsed = slashes.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::with_capacity(collapsed.len());
    let mut at_word_start = true;
    for ch in collapsed.chars() {
        if ch == ' ' || ch == '/' {
            out.push(ch);
            at_word_start = true;
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// Additional metrics stored next to the fixed return columns.
pub type ExtraInfo = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub ticker: String,
    pub ticker_type: TickerType,
    pub perf_1m: f64,
    pub perf_3m: f64,
    pub perf_6m: f64,
    pub perf_1y: f64,
    #[serde(default)]
    pub extra_info: ExtraInfo,
    pub last_updated: DateTime<Utc>,
}

impl std::fmt::Display for Performance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] 1M: {:.2}% 3M: {:.2}% 6M: {:.2}% 1Y: {:.2}%",
            self.ticker, self.ticker_type, self.perf_1m, self.perf_3m, self.perf_6m, self.perf_1y,
        )
    }
}

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

/// One intraday OHLCV bar. The intraday table carries no audit column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayCandle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Rejects bars whose prices are not finite and positive or whose high/low don't bracket the body.
pub fn validate_ohlc(open: f64, high: f64, low: f64, close: f64) -> Result<(), AppError> {
    let prices = [open, high, low, close];
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(AppError::InvalidInput(format!(
            "candle prices must be finite and positive: {prices:?}"
        )));
    }
    if high < low || high < open.max(close) || low > open.min(close) {
        return Err(AppError::InvalidInput(format!(
            "candle range is inconsistent: o={open} h={high} l={low} c={close}"
        )));
    }
    Ok(())
}
