use chrono::{DateTime, NaiveDate, Utc};
use futures_util::TryStreamExt;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::{
    DailyCandleRow, IntradayCandleRow, PerformanceRow, StockRow, TableCounts,
};
use crate::error::{AppError, Result};
use crate::types::{normalize_ticker, Candle, DataSource, IntradayCandle, Performance, Stock, TickerType};

const PERFORMANCE_COLUMNS: &str = "id, ticker, ticker_type, perf_1m, perf_3m, perf_6m, perf_1y, extra_info, last_updated";

/// Optional filters for [`Store::list_stocks`]. Sector and industry match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub source: Option<DataSource>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

/// Typed access to the market-data schema. Every write is a batch upsert in one transaction.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // stocks
    // -----------------------------------------------------------------------

    pub async fn add_stocks(&self, stocks: &[Stock]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for stock in stocks {
            let stock = stock.clone().normalized();
            sqlx::query(
                r#"
                INSERT INTO stocks
                    (source, ticker, exchange, sector_name, sector_url,
                     industry_name, industry_url, last_update)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(source, ticker) DO UPDATE SET
                    exchange      = excluded.exchange,
                    sector_name   = excluded.sector_name,
                    sector_url    = excluded.sector_url,
                    industry_name = excluded.industry_name,
                    industry_url  = excluded.industry_url,
                    last_update   = excluded.last_update
                "#,
            )
            .bind(stock.source.as_str())
            .bind(&stock.ticker)
            .bind(&stock.exchange)
            .bind(&stock.sector.name)
            .bind(&stock.sector.url)
            .bind(&stock.industry.name)
            .bind(&stock.industry.url)
            .bind(stock.last_update)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = stocks.len(), "Upserted stocks");
        Ok(())
    }

    pub async fn get_stock(&self, source: DataSource, ticker: &str) -> Result<Option<Stock>> {
        let row = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT source, ticker, exchange, sector_name, sector_url,
                   industry_name, industry_url, last_update
            FROM stocks
            WHERE source = ? AND ticker = ?
            "#,
        )
        .bind(source.as_str())
        .bind(normalize_ticker(ticker))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Stock::try_from).transpose()
    }

    pub async fn list_stocks(&self, filter: &StockFilter) -> Result<Vec<Stock>> {
        let source = filter.source.map(|s| s.as_str());
        sqlx::query_as::<_, StockRow>(
            r#"
            SELECT source, ticker, exchange, sector_name, sector_url,
                   industry_name, industry_url, last_update
            FROM stocks
            WHERE (?1 IS NULL OR source = ?1)
              AND (?2 IS NULL OR sector_name = ?2 COLLATE NOCASE)
              AND (?3 IS NULL OR industry_name = ?3 COLLATE NOCASE)
            ORDER BY sector_name, industry_name, ticker, source
            "#,
        )
        .bind(source)
        .bind(filter.sector.as_deref())
        .bind(filter.industry.as_deref())
        .fetch(&self.pool)
        .map_err(AppError::from)
        .and_then(|row| futures_util::future::ready(Stock::try_from(row)))
        .try_collect()
        .await
    }

    /// Delete stock rows whose `last_update` is strictly before `cutoff`.
    pub async fn evict_stale_stocks(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM stocks WHERE last_update < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // performance
    // -----------------------------------------------------------------------

    pub async fn save_performances(&self, perfs: &[Performance]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for perf in perfs {
            let extra_info = serde_json::to_string(&perf.extra_info)?;
            sqlx::query(
                r#"
                INSERT INTO performance
                    (ticker, ticker_type, perf_1m, perf_3m, perf_6m, perf_1y, extra_info, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ticker, ticker_type) DO UPDATE SET
                    perf_1m      = excluded.perf_1m,
                    perf_3m      = excluded.perf_3m,
                    perf_6m      = excluded.perf_6m,
                    perf_1y      = excluded.perf_1y,
                    extra_info   = excluded.extra_info,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&perf.ticker)
            .bind(perf.ticker_type.as_str())
            .bind(perf.perf_1m)
            .bind(perf.perf_3m)
            .bind(perf.perf_6m)
            .bind(perf.perf_1y)
            .bind(extra_info)
            .bind(perf.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = perfs.len(), "Upserted performances");
        Ok(())
    }

    pub async fn get_performance(
        &self,
        ticker: &str,
        ticker_type: TickerType,
    ) -> Result<Option<Performance>> {
        let sql = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM performance WHERE ticker = ? AND ticker_type = ?"
        );
        let row = sqlx::query_as::<_, PerformanceRow>(&sql)
            .bind(ticker)
            .bind(ticker_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Performance::try_from).transpose()
    }

    pub async fn get_all_performances(&self) -> Result<Vec<Performance>> {
        let sql = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM performance ORDER BY ticker_type, ticker"
        );
        let rows = sqlx::query_as::<_, PerformanceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Performance::try_from).collect()
    }

    pub async fn get_performances_by_type(&self, ticker_type: TickerType) -> Result<Vec<Performance>> {
        let sql = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM performance WHERE ticker_type = ? ORDER BY ticker"
        );
        let rows = sqlx::query_as::<_, PerformanceRow>(&sql)
            .bind(ticker_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Performance::try_from).collect()
    }

    // -----------------------------------------------------------------------
    // daily_candles
    // -----------------------------------------------------------------------

    pub async fn save_daily_candles(&self, ticker: &str, candles: &[Candle]) -> Result<()> {
        let ticker = normalize_ticker(ticker);
        let mut tx = self.pool.begin().await?;

        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO daily_candles (ticker, ds, open, high, low, close, volume, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ticker, ds) DO UPDATE SET
                    open         = excluded.open,
                    high         = excluded.high,
                    low          = excluded.low,
                    close        = excluded.close,
                    volume       = excluded.volume,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&ticker)
            .bind(candle.timestamp)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(volume_to_db(candle.volume)?)
            .bind(candle.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(%ticker, count = candles.len(), "Upserted daily candles");
        Ok(())
    }

    /// Daily candles at or after `since`, oldest first.
    pub async fn get_daily_candles(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<Candle>> {
        let rows = sqlx::query_as::<_, DailyCandleRow>(
            r#"
            SELECT ds, open, high, low, close, volume, last_updated
            FROM daily_candles
            WHERE ticker = ? AND ds >= ?
            ORDER BY ds ASC
            "#,
        )
        .bind(normalize_ticker(ticker))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Candle::from).collect())
    }

    /// Delete daily candles strictly older than `before`.
    pub async fn prune_daily_candles(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM daily_candles WHERE ds < ?")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // candles (intraday)
    // -----------------------------------------------------------------------

    pub async fn save_intraday_candles(&self, ticker: &str, candles: &[IntradayCandle]) -> Result<()> {
        let ticker = normalize_ticker(ticker);
        let mut tx = self.pool.begin().await?;

        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (ticker, timestamp, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ticker, timestamp) DO UPDATE SET
                    open   = excluded.open,
                    high   = excluded.high,
                    low    = excluded.low,
                    close  = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(&ticker)
            .bind(candle.timestamp)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(volume_to_db(candle.volume)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(%ticker, count = candles.len(), "Upserted intraday candles");
        Ok(())
    }

    /// Intraday candles in `[from, to)`, oldest first.
    pub async fn get_intraday_candles(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IntradayCandle>> {
        let rows = sqlx::query_as::<_, IntradayCandleRow>(
            r#"
            SELECT timestamp, open, high, low, close, volume
            FROM candles
            WHERE ticker = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(normalize_ticker(ticker))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(IntradayCandle::from).collect())
    }

    // -----------------------------------------------------------------------
    // stats
    // -----------------------------------------------------------------------

    pub async fn counts(&self) -> Result<TableCounts> {
        let (stocks, performance, daily_candles, candles) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT (SELECT COUNT(*) FROM stocks),
                   (SELECT COUNT(*) FROM performance),
                   (SELECT COUNT(*) FROM daily_candles),
                   (SELECT COUNT(*) FROM candles)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TableCounts {
            stocks,
            performance,
            daily_candles,
            candles,
        })
    }
}

fn volume_to_db(volume: u64) -> Result<i64> {
    i64::try_from(volume)
        .map_err(|_| AppError::InvalidInput(format!("volume {volume} exceeds storage range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, run_migrations};
    use crate::types::{ExtraInfo, Group};
    use chrono::{Duration, TimeZone};

    async fn store() -> Store {
        let pool = open_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        Store::new(pool)
    }

    fn stock(source: DataSource, ticker: &str, sector: &str, industry: &str) -> Stock {
        Stock {
            source,
            ticker: ticker.to_string(),
            exchange: "NASDAQ".to_string(),
            sector: Group::new(sector, "#"),
            industry: Group::new(industry, "#"),
            last_update: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        }
    }

    fn perf(ticker: &str, ticker_type: TickerType, m1: f64) -> Performance {
        Performance {
            ticker: ticker.to_string(),
            ticker_type,
            perf_1m: m1,
            perf_3m: 2.0,
            perf_6m: 3.0,
            perf_1y: 4.0,
            extra_info: ExtraInfo::new(),
            last_updated: Utc.with_ymd_and_hms(2026, 10, 1, 21, 0, 0).unwrap(),
        }
    }

    fn candle(day: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2026, 9, day, 0, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
            last_updated: Utc.with_ymd_and_hms(2026, 9, 30, 22, 0, 0).unwrap(),
        }
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn stocks_upsert_on_source_and_ticker() {
        let store = store().await;
        store
            .add_stocks(&[
                stock(DataSource::Tv, "AAPL", "Electronic Technology", "Telecommunications Equipment"),
                stock(DataSource::Yf, "AAPL", "Technology", "Consumer Electronics"),
            ])
            .await
            .unwrap();

        let mut updated = stock(DataSource::Tv, "AAPL", "Electronic Technology", "Computer Processing Hardware");
        updated.last_update = NaiveDate::from_ymd_opt(2026, 10, 2).unwrap();
        store.add_stocks(&[updated.clone()]).await.unwrap();

        assert_eq!(store.get_stock(DataSource::Tv, "aapl").await.unwrap(), Some(updated));
        assert_eq!(
            store.get_stock(DataSource::Yf, "AAPL").await.unwrap().unwrap().industry.name,
            "Consumer Electronics"
        );
        assert_eq!(store.counts().await.unwrap().stocks, 2);
    }

    #[tokio::test]
    async fn stock_tickers_are_stored_upper_case() {
        let store = store().await;
        store
            .add_stocks(&[stock(DataSource::Tv, "msft", "Technology Services", "Packaged Software")])
            .await
            .unwrap();
        let read = store.get_stock(DataSource::Tv, "msft").await.unwrap().unwrap();
        assert_eq!(read.ticker, "MSFT");

        store
            .add_stocks(&[
                stock(DataSource::Tv, "aapl", "Electronic Technology", "Telecommunications Equipment"),
                stock(DataSource::Tv, " AAPL", "Electronic Technology", "Telecommunications Equipment"),
            ])
            .await
            .unwrap();
        assert_eq!(store.counts().await.unwrap().stocks, 2);
        assert!(store.get_stock(DataSource::Tv, "AAPL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_stock_key_is_a_unique_violation() {
        let store = store().await;
        let insert = "INSERT INTO stocks (source, ticker, exchange, sector_name, sector_url, industry_name, industry_url, last_update) VALUES ('tv', 'MSFT', 'NASDAQ', 'S', '#', 'I', '#', '2026-10-01')";
        sqlx::query(insert).execute(store.pool()).await.unwrap();
        let err = sqlx::query(insert).execute(store.pool()).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    /// A literal that satisfies the column's type and CHECK constraints.
    fn valid_literal(name: &str, decl_type: &str) -> &'static str {
        match (name, decl_type) {
            ("source", _) => "'tv'",
            ("ticker_type", _) => "'Stock'",
            ("extra_info", _) => "'{}'",
            (_, "REAL") => "1.0",
            (_, "INTEGER") => "1",
            (_, "DATE") => "'2026-10-01'",
            (_, "TIMESTAMP") => "'2026-10-01T00:00:00+00:00'",
            _ => "'X'",
        }
    }

    #[tokio::test]
    async fn every_not_null_column_rejects_null() {
        use sqlx::Row;

        let store = store().await;
        let mut checked = Vec::new();

        for table in ["stocks", "performance", "daily_candles", "candles"] {
            let columns: Vec<(String, String, bool)> =
                sqlx::query(r#"SELECT name, type, "notnull" FROM pragma_table_info(?) WHERE name != 'id'"#)
                    .bind(table)
                    .fetch_all(store.pool())
                    .await
                    .unwrap()
                    .iter()
                    .map(|r| {
                        (
                            r.get::<String, _>("name"),
                            r.get::<String, _>("type"),
                            r.get::<i64, _>("notnull") == 1,
                        )
                    })
                    .collect();
            assert!(!columns.is_empty(), "{table} has no columns");

            let names: Vec<&str> = columns.iter().map(|(n, _, _)| n.as_str()).collect();
            let insert = |null_column: Option<&str>| {
                let values: Vec<&str> = columns
                    .iter()
                    .map(|(n, t, _)| {
                        if Some(n.as_str()) == null_column {
                            "NULL"
                        } else {
                            valid_literal(n, t)
                        }
                    })
                    .collect();
                format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    names.join(", "),
                    values.join(", ")
                )
            };

            // the row is valid with every column filled in
            sqlx::query(&insert(None)).execute(store.pool()).await.unwrap();
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(store.pool())
                .await
                .unwrap();

            for (name, _, not_null) in columns.iter().filter(|c| c.2) {
                assert!(*not_null);
                let err = sqlx::query(&insert(Some(name.as_str())))
                    .execute(store.pool())
                    .await
                    .unwrap_err();
                let kind = err.as_database_error().map(|e| e.kind());
                assert!(
                    matches!(kind, Some(sqlx::error::ErrorKind::NotNullViolation)),
                    "{table}.{name}: {err}"
                );
                assert!(AppError::from(err).is_constraint_violation());
                checked.push(format!("{table}.{name}"));
            }
        }

        // 8 stocks, 8 performance, 8 daily_candles and 7 candles columns
        assert_eq!(checked.len(), 31, "{checked:?}");
    }

    #[tokio::test]
    async fn extra_info_defaults_to_empty_object() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO performance (ticker, ticker_type, perf_1m, perf_3m, perf_6m, perf_1y, last_updated) VALUES ('XLK', 'Sector', 1, 2, 3, 4, '2026-10-01T21:00:00+00:00')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let perf = store
            .get_performance("XLK", TickerType::Sector)
            .await
            .unwrap()
            .unwrap();
        assert!(perf.extra_info.is_empty());
    }

    #[tokio::test]
    async fn performance_is_unique_per_ticker_and_type() {
        let store = store().await;
        store
            .save_performances(&[
                perf("ENERGY MINERALS", TickerType::Sector, 1.0),
                perf("ENERGY MINERALS", TickerType::Industry, 5.0),
            ])
            .await
            .unwrap();

        let mut replaced = perf("ENERGY MINERALS", TickerType::Sector, 9.5);
        replaced
            .extra_info
            .insert("YTD".to_string(), serde_json::json!(12.5));
        store.save_performances(&[replaced.clone()]).await.unwrap();

        let all = store.get_all_performances().await.unwrap();
        assert_eq!(all.len(), 2);
        // ordered by ticker_type text: Industry < Sector
        assert_eq!(all[0].ticker_type, TickerType::Industry);
        assert_eq!(all[1], replaced);

        let err = sqlx::query(
            "INSERT INTO performance (ticker, ticker_type, perf_1m, perf_3m, perf_6m, perf_1y, last_updated) VALUES ('ENERGY MINERALS', 'Sector', 1, 1, 1, 1, '2026-10-01T00:00:00+00:00')",
        )
        .execute(store.pool())
        .await
        .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn performances_by_type_are_sorted_by_ticker() {
        let store = store().await;
        store
            .save_performances(&[
                perf("XLV", TickerType::Sector, 1.0),
                perf("XLE", TickerType::Sector, 2.0),
                perf("NVDA", TickerType::Stock, 3.0),
            ])
            .await
            .unwrap();

        let sectors = store.get_performances_by_type(TickerType::Sector).await.unwrap();
        let tickers: Vec<_> = sectors.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["XLE", "XLV"]);
    }

    #[tokio::test]
    async fn unknown_ticker_type_text_is_invalid_data() {
        let store = store().await;
        // bypass the CHECK constraint to simulate a row written by another tool
        sqlx::raw_sql("PRAGMA ignore_check_constraints = ON")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO performance (ticker, ticker_type, perf_1m, perf_3m, perf_6m, perf_1y, last_updated) VALUES ('XLK', 'Etf', 1, 2, 3, 4, '2026-10-01T21:00:00+00:00')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.get_all_performances().await.unwrap_err();
        assert!(matches!(err, AppError::InvalidData(_)));
    }

    #[tokio::test]
    async fn daily_candles_upsert_and_filter_by_since() {
        let store = store().await;
        store
            .save_daily_candles("spy", &[candle(3, 101.0), candle(1, 100.0), candle(2, 99.0)])
            .await
            .unwrap();
        store.save_daily_candles("SPY", &[candle(2, 105.0)]).await.unwrap();

        let since = Utc.with_ymd_and_hms(2026, 9, 2, 0, 0, 0).unwrap();
        let candles = store.get_daily_candles("SPY", since).await.unwrap();
        let closes: Vec<_> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![105.0, 101.0]);
        assert_eq!(store.counts().await.unwrap().daily_candles, 3);
    }

    #[tokio::test]
    async fn duplicate_daily_candle_is_a_unique_violation() {
        let store = store().await;
        let insert = "INSERT INTO daily_candles (ticker, ds, open, high, low, close, volume, last_updated) VALUES ('SPY', '2026-10-01T00:00:00+00:00', 1, 1, 1, 1, 10, '2026-10-01T00:00:00+00:00')";
        sqlx::query(insert).execute(store.pool()).await.unwrap();
        let err = sqlx::query(insert).execute(store.pool()).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn prune_removes_only_older_candles() {
        let store = store().await;
        store
            .save_daily_candles("QQQ", &[candle(1, 1.0), candle(2, 2.0), candle(3, 3.0)])
            .await
            .unwrap();

        let removed = store
            .prune_daily_candles(Utc.with_ymd_and_hms(2026, 9, 2, 0, 0, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let left = store
            .get_daily_candles("QQQ", Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(left.len(), 2);
    }

    #[tokio::test]
    async fn intraday_candles_are_range_filtered() {
        let store = store().await;
        let start = Utc.with_ymd_and_hms(2026, 10, 1, 13, 30, 0).unwrap();
        let bars: Vec<_> = (0..6)
            .map(|i| IntradayCandle {
                timestamp: start + Duration::minutes(5 * i),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0 + i as f64,
                volume: 50,
            })
            .collect();
        store.save_intraday_candles("AAPL", &bars).await.unwrap();
        store.save_intraday_candles("AAPL", &bars[..2]).await.unwrap();

        let got = store
            .get_intraday_candles("AAPL", start + Duration::minutes(5), start + Duration::minutes(20))
            .await
            .unwrap();
        let closes: Vec<_> = got.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![11.0, 12.0, 13.0]);
        assert_eq!(store.counts().await.unwrap().candles, 6);

        let insert = "INSERT INTO candles (ticker, timestamp, open, high, low, close, volume) VALUES ('AAPL', '2026-10-02T13:30:00+00:00', 1, 1, 1, 1, 1)";
        sqlx::query(insert).execute(store.pool()).await.unwrap();
        let err = sqlx::query(insert).execute(store.pool()).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn list_stocks_filters_and_orders() {
        let store = store().await;
        store
            .add_stocks(&[
                stock(DataSource::Tv, "XOM", "Energy Minerals", "Integrated Oil"),
                stock(DataSource::Tv, "NVDA", "Electronic Technology", "Semiconductors"),
                stock(DataSource::Tv, "AMD", "Electronic Technology", "Semiconductors"),
                stock(DataSource::Yf, "AMD", "Technology", "Semiconductors"),
            ])
            .await
            .unwrap();

        let all = store.list_stocks(&StockFilter::default()).await.unwrap();
        let tickers: Vec<_> = all.iter().map(|s| (s.source, s.ticker.as_str())).collect();
        assert_eq!(
            tickers,
            vec![
                (DataSource::Tv, "AMD"),
                (DataSource::Tv, "NVDA"),
                (DataSource::Tv, "XOM"),
                (DataSource::Yf, "AMD"),
            ]
        );

        let filtered = store
            .list_stocks(&StockFilter {
                source: Some(DataSource::Tv),
                sector: Some("electronic technology".to_string()),
                industry: None,
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn evict_stale_stocks_uses_strict_cutoff() {
        let store = store().await;
        let mut old = stock(DataSource::Tv, "GE", "Producer Manufacturing", "Industrial Conglomerates");
        old.last_update = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let fresh = stock(DataSource::Tv, "CAT", "Producer Manufacturing", "Trucks/Construction/Farm Machinery");
        store.add_stocks(&[old, fresh]).await.unwrap();

        let evicted = store
            .evict_stale_stocks(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(store.get_stock(DataSource::Tv, "GE").await.unwrap().is_none());
        assert!(store.get_stock(DataSource::Tv, "CAT").await.unwrap().is_some());
    }
}
