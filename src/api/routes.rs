use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

use crate::analytics::perf::{compute_perf, rs_map};
use crate::analytics::rrg::{compute_rrg, Rrg, Timeframe};
use crate::analytics::summary::Summary;
use crate::api::health::HealthState;
use crate::api::latency::{track_latency, LatencyStats};
use crate::config::{rrg_defaults, MAX_BATCH_ROWS};
use crate::db::models::TableCounts;
use crate::db::store::StockFilter;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::market_clock::MarketClock;
use crate::state::CandleCache;
use crate::types::{
    normalize_ticker, validate_ohlc, Candle, DataSource, IntradayCandle, Performance, Stock,
    TickerType,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub cache: Arc<CandleCache>,
    pub clock: MarketClock,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
    pub base_ticker: String,
    pub candle_history_days: i64,
}

impl ApiState {
    fn default_candle_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::days(self.candle_history_days)
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stocks", get(list_stocks).put(put_stocks))
        .route("/stocks/:source/:ticker", get(get_stock))
        .route("/performance", get(list_performance).put(put_performance))
        .route("/performance/:ticker_type/:ticker", get(get_performance))
        .route(
            "/performance/:ticker_type/:ticker/compute",
            post(compute_performance),
        )
        .route(
            "/candles/daily/:ticker",
            get(get_daily_candles).put(put_daily_candles),
        )
        .route(
            "/candles/intraday/:ticker",
            get(get_intraday_candles).put(put_intraday_candles),
        )
        .route("/summary", get(get_summary))
        .route("/rrg/:ticker", get(get_rrg))
        .route("/stats/latency", get(get_stats_latency))
        .layer(middleware::from_fn_with_state(state.clone(), track_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct StocksQuery {
    pub source: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

#[derive(Deserialize)]
pub struct PerformanceQuery {
    #[serde(rename = "type")]
    pub ticker_type: Option<String>,
    pub fresh: Option<bool>,
}

#[derive(Deserialize)]
pub struct FreshQuery {
    pub fresh: Option<bool>,
}

#[derive(Deserialize)]
pub struct DailyCandlesQuery {
    pub since: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct IntradayCandlesQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub source: Option<String>,
}

#[derive(Deserialize)]
pub struct RrgQuery {
    pub timeframe: Option<String>,
    pub tail: Option<usize>,
    pub history: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub market_open: bool,
    pub counts: TableCounts,
    pub cached_series: usize,
    pub rows_written: u64,
    pub last_write_at_ms: Option<i64>,
    pub last_maintenance_at_ms: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WriteResponse {
    pub written: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SummaryResponse {
    pub benchmark: String,
    pub summary: Summary,
    pub sector_rs: BTreeMap<String, f64>,
    pub industry_rs: BTreeMap<String, f64>,
    pub stock_rs: BTreeMap<String, f64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LatencyResponse {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

// ---------------------------------------------------------------------------
// Handlers: health and stats
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>> {
    let counts = state.store.counts().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.health.uptime_secs(),
        market_open: state.clock.is_market_open(Utc::now()),
        counts,
        cached_series: state.cache.len(),
        rows_written: state.health.rows_written(),
        last_write_at_ms: state.health.last_write_at_ms(),
        last_maintenance_at_ms: state.health.last_maintenance_at_ms(),
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    let to_ms = |us: Option<u64>| us.map(|v| v as f64 / 1000.0);
    Json(LatencyResponse {
        p50_ms: to_ms(p50),
        p95_ms: to_ms(p95),
        p99_ms: to_ms(p99),
        sample_count: state.latency.len(),
    })
}

// ---------------------------------------------------------------------------
// Handlers: stocks
// ---------------------------------------------------------------------------

async fn list_stocks(
    State(state): State<ApiState>,
    Query(params): Query<StocksQuery>,
) -> Result<Json<Vec<Stock>>> {
    let filter = StockFilter {
        source: params.source.as_deref().map(str::parse).transpose()?,
        sector: params.sector,
        industry: params.industry,
    };
    Ok(Json(state.store.list_stocks(&filter).await?))
}

async fn put_stocks(
    State(state): State<ApiState>,
    Json(stocks): Json<Vec<Stock>>,
) -> Result<Json<WriteResponse>> {
    check_batch(stocks.len())?;
    let stocks: Vec<Stock> = stocks.into_iter().map(Stock::normalized).collect();
    if let Some(bad) = stocks.iter().find(|s| s.ticker.is_empty()) {
        return Err(AppError::InvalidInput(format!(
            "empty ticker in {} batch",
            bad.source
        )));
    }

    state.store.add_stocks(&stocks).await?;
    state.health.record_write(stocks.len());
    info!(event = "STOCKS_WRITE", count = stocks.len(), "Upserted {} stocks", stocks.len());
    Ok(Json(WriteResponse {
        written: stocks.len(),
    }))
}

async fn get_stock(
    State(state): State<ApiState>,
    Path((source, ticker)): Path<(String, String)>,
) -> Result<Json<Stock>> {
    let source: DataSource = source.parse()?;
    state
        .store
        .get_stock(source, &ticker)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("stock {source}/{}", normalize_ticker(&ticker))))
}

// ---------------------------------------------------------------------------
// Handlers: performance
// ---------------------------------------------------------------------------

async fn list_performance(
    State(state): State<ApiState>,
    Query(params): Query<PerformanceQuery>,
) -> Result<Json<Vec<Performance>>> {
    let perfs = match params.ticker_type.as_deref() {
        Some(t) => state.store.get_performances_by_type(t.parse()?).await?,
        None => state.store.get_all_performances().await?,
    };

    if params.fresh.unwrap_or(false) {
        let now = Utc::now();
        return Ok(Json(
            perfs
                .into_iter()
                .filter(|p| state.clock.is_up_to_date(p.last_updated, now))
                .collect(),
        ));
    }
    Ok(Json(perfs))
}

async fn put_performance(
    State(state): State<ApiState>,
    Json(perfs): Json<Vec<Performance>>,
) -> Result<Json<WriteResponse>> {
    check_batch(perfs.len())?;
    let perfs: Vec<Performance> = perfs.into_iter().map(normalize_performance).collect();
    for p in &perfs {
        let values = [p.perf_1m, p.perf_3m, p.perf_6m, p.perf_1y];
        if p.ticker.trim().is_empty() || values.iter().any(|v| !v.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "invalid performance record for {:?} [{}]",
                p.ticker, p.ticker_type
            )));
        }
    }

    state.store.save_performances(&perfs).await?;
    state.health.record_write(perfs.len());
    info!(event = "PERFORMANCE_WRITE", count = perfs.len(), "Upserted {} performances", perfs.len());
    Ok(Json(WriteResponse {
        written: perfs.len(),
    }))
}

async fn get_performance(
    State(state): State<ApiState>,
    Path((ticker_type, ticker)): Path<(String, String)>,
    Query(params): Query<FreshQuery>,
) -> Result<Json<Performance>> {
    let ticker_type: TickerType = ticker_type.parse()?;
    let ticker = perf_key(ticker_type, &ticker);
    let not_found = || AppError::NotFound(format!("performance {ticker_type}/{ticker}"));

    let perf = state
        .store
        .get_performance(&ticker, ticker_type)
        .await?
        .ok_or_else(not_found)?;
    if params.fresh.unwrap_or(false) && !state.clock.is_up_to_date(perf.last_updated, Utc::now()) {
        return Err(not_found());
    }
    Ok(Json(perf))
}

/// Recompute a ticker's performance from its stored daily candles and persist it.
async fn compute_performance(
    State(state): State<ApiState>,
    Path((ticker_type, ticker)): Path<(String, String)>,
) -> Result<Json<Performance>> {
    let ticker_type: TickerType = ticker_type.parse()?;
    let ticker = normalize_ticker(&ticker);
    let now = Utc::now();
    // a year of look-back plus slack for the closest-candle search
    let since = now
        .checked_sub_months(Months::new(13))
        .unwrap_or_else(|| state.default_candle_since(now));

    let candles = state.cache.load(&state.store, &ticker, since).await?;
    if candles.is_empty() {
        return Err(AppError::NotFound(format!("daily candles for {ticker}")));
    }

    let perf = Performance::from_perf_map(ticker.clone(), ticker_type, compute_perf(&candles), now);
    state.store.save_performances(std::slice::from_ref(&perf)).await?;
    info!(event = "PERFORMANCE_COMPUTED", %ticker, candles = candles.len(), "{perf}");
    Ok(Json(perf))
}

// ---------------------------------------------------------------------------
// Handlers: candles
// ---------------------------------------------------------------------------

async fn get_daily_candles(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Query(params): Query<DailyCandlesQuery>,
) -> Result<Json<Vec<Candle>>> {
    let since = params
        .since
        .unwrap_or_else(|| state.default_candle_since(Utc::now()));
    let candles = state.cache.load(&state.store, &ticker, since).await?;
    Ok(Json(candles.to_vec()))
}

async fn put_daily_candles(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Json(candles): Json<Vec<Candle>>,
) -> Result<Json<WriteResponse>> {
    check_batch(candles.len())?;
    for c in &candles {
        validate_ohlc(c.open, c.high, c.low, c.close)?;
    }

    state.store.save_daily_candles(&ticker, &candles).await?;
    state.cache.invalidate(&ticker);
    state.health.record_write(candles.len());
    info!(
        event = "DAILY_CANDLES_WRITE",
        ticker = %normalize_ticker(&ticker),
        count = candles.len(),
        "Upserted {} daily candles",
        candles.len(),
    );
    Ok(Json(WriteResponse {
        written: candles.len(),
    }))
}

async fn get_intraday_candles(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Query(params): Query<IntradayCandlesQuery>,
) -> Result<Json<Vec<IntradayCandle>>> {
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params.from.unwrap_or(to - TimeDelta::days(1));
    if from >= to {
        return Err(AppError::InvalidInput(format!(
            "empty range: from {from} is not before to {to}"
        )));
    }
    Ok(Json(state.store.get_intraday_candles(&ticker, from, to).await?))
}

async fn put_intraday_candles(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Json(candles): Json<Vec<IntradayCandle>>,
) -> Result<Json<WriteResponse>> {
    check_batch(candles.len())?;
    for c in &candles {
        validate_ohlc(c.open, c.high, c.low, c.close)?;
    }

    state.store.save_intraday_candles(&ticker, &candles).await?;
    state.health.record_write(candles.len());
    Ok(Json(WriteResponse {
        written: candles.len(),
    }))
}

// ---------------------------------------------------------------------------
// Handlers: analytics
// ---------------------------------------------------------------------------

async fn get_summary(
    State(state): State<ApiState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>> {
    let filter = StockFilter {
        source: params.source.as_deref().map(str::parse).transpose()?,
        ..StockFilter::default()
    };

    let base = state
        .store
        .get_performance(&state.base_ticker, TickerType::Stock)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("baseline performance for {}", state.base_ticker))
        })?;

    let stocks = state.store.list_stocks(&filter).await?;
    let listed: HashSet<&str> = stocks.iter().map(|s| s.ticker.as_str()).collect();
    let sectors = state.store.get_performances_by_type(TickerType::Sector).await?;
    let industries = state.store.get_performances_by_type(TickerType::Industry).await?;
    let stock_perfs: Vec<Performance> = state
        .store
        .get_performances_by_type(TickerType::Stock)
        .await?
        .into_iter()
        .filter(|p| listed.contains(p.ticker.as_str()))
        .collect();

    Ok(Json(SummaryResponse {
        benchmark: state.base_ticker.clone(),
        sector_rs: rs_map(&sectors, &base),
        industry_rs: rs_map(&industries, &base),
        stock_rs: rs_map(&stock_perfs, &base),
        summary: Summary::summarize(stocks),
    }))
}

async fn get_rrg(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Query(params): Query<RrgQuery>,
) -> Result<Json<Rrg>> {
    let timeframe: Timeframe = match params.timeframe.as_deref() {
        Some(t) => t.parse()?,
        None => Timeframe::default(),
    };
    let since = state.default_candle_since(Utc::now());

    let candles = state.cache.load(&state.store, &ticker, since).await?;
    let benchmark = state.cache.load(&state.store, &state.base_ticker, since).await?;
    for (t, series) in [(ticker.as_str(), &candles), (state.base_ticker.as_str(), &benchmark)] {
        if series.is_empty() {
            return Err(AppError::NotFound(format!("daily candles for {}", normalize_ticker(t))));
        }
    }

    compute_rrg(
        &ticker,
        &state.base_ticker,
        &candles,
        &benchmark,
        timeframe,
        params.tail.unwrap_or(rrg_defaults::TAIL),
        params.history.unwrap_or(rrg_defaults::HISTORY),
    )
    .map(Json)
    .ok_or_else(|| {
        AppError::InsufficientData(format!(
            "{}/{} candles for {}/{}",
            candles.len(),
            benchmark.len(),
            normalize_ticker(&ticker),
            state.base_ticker,
        ))
    })
}

/// Stock tickers are stored upper-case. Sector and industry names keep their case.
fn perf_key(ticker_type: TickerType, ticker: &str) -> String {
    match ticker_type {
        TickerType::Stock => normalize_ticker(ticker),
        _ => ticker.trim().to_string(),
    }
}

fn normalize_performance(mut perf: Performance) -> Performance {
    perf.ticker = perf_key(perf.ticker_type, &perf.ticker);
    perf
}

fn check_batch(len: usize) -> Result<()> {
    if len > MAX_BATCH_ROWS {
        return Err(AppError::InvalidInput(format!(
            "batch of {len} rows exceeds the {MAX_BATCH_ROWS} row limit"
        )));
    }
    Ok(())
}
