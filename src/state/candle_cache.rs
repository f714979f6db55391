use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::MAX_CACHED_SERIES;
use crate::db::Store;
use crate::error::Result;
use crate::types::{normalize_ticker, Candle};

/// A cached daily series and the lower bound it was loaded with.
#[derive(Debug, Clone)]
struct CachedSeries {
    since: DateTime<Utc>,
    candles: Arc<Vec<Candle>>,
}

/// Per-ticker slot. `generation` is bumped by every invalidation, so a load that
/// raced with a write can tell its read is stale.
#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    series: Option<CachedSeries>,
}

/// Cache state observed before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    epoch: u64,
    ticker: u64,
}

/// Read-through cache of daily candle series keyed by upper-case ticker.
/// Any write of a ticker's daily candles must call [`CandleCache::invalidate`].
/// Empty series are never cached and at most [`MAX_CACHED_SERIES`] tickers are held.
#[derive(Default)]
pub struct CandleCache {
    slots: DashMap<String, Slot>,
    /// Bumped by [`CandleCache::clear`].
    epoch: AtomicU64,
}

impl CandleCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cached candles at or after `since`. A miss happens when nothing is cached for the
    /// ticker or the cached series was loaded with a later lower bound.
    pub fn get(&self, ticker: &str, since: DateTime<Utc>) -> Option<Arc<Vec<Candle>>> {
        let slot = self.slots.get(&normalize_ticker(ticker))?;
        let entry = slot.series.as_ref()?;
        if entry.since > since {
            return None;
        }
        if entry.since == since {
            return Some(Arc::clone(&entry.candles));
        }
        let start = entry.candles.partition_point(|c| c.timestamp < since);
        Some(Arc::new(entry.candles[start..].to_vec()))
    }

    pub fn generation(&self, ticker: &str) -> Generation {
        let ticker = self
            .slots
            .get(&normalize_ticker(ticker))
            .map_or(0, |slot| slot.generation);
        Generation {
            epoch: self.epoch.load(Ordering::Acquire),
            ticker,
        }
    }

    /// Cache `candles` unless the ticker was invalidated (or the cache cleared) after
    /// `seen` was taken. The candles are returned either way.
    pub fn insert_if_current(
        &self,
        ticker: &str,
        since: DateTime<Utc>,
        candles: Vec<Candle>,
        seen: Generation,
    ) -> Arc<Vec<Candle>> {
        let candles = Arc::new(candles);
        if candles.is_empty() {
            return candles;
        }

        let key = normalize_ticker(ticker);
        if !self.slots.contains_key(&key) && self.len() >= MAX_CACHED_SERIES {
            return candles;
        }

        // the shard lock held by `entry` orders this check against `invalidate`
        let mut slot = self.slots.entry(key).or_default();
        if slot.generation == seen.ticker && self.epoch.load(Ordering::Acquire) == seen.epoch {
            slot.series = Some(CachedSeries {
                since,
                candles: Arc::clone(&candles),
            });
        }
        candles
    }

    pub fn invalidate(&self, ticker: &str) {
        let mut slot = self.slots.entry(normalize_ticker(ticker)).or_default();
        slot.generation += 1;
        slot.series = None;
    }

    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.slots.clear();
    }

    /// Number of tickers with a cached series.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.series.is_some()).count()
    }

    /// Serve from cache, loading from the store on a miss.
    pub async fn load(&self, store: &Store, ticker: &str, since: DateTime<Utc>) -> Result<Arc<Vec<Candle>>> {
        if let Some(hit) = self.get(ticker, since) {
            return Ok(hit);
        }
        let seen = self.generation(ticker);
        let candles = store.get_daily_candles(ticker, since).await?;
        Ok(self.insert_if_current(ticker, since, candles, seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, run_migrations};
    use chrono::{Duration, TimeZone};

    fn candles(start: DateTime<Utc>, n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: start + Duration::days(i),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0 + i as f64,
                volume: 100,
                last_updated: start,
            })
            .collect()
    }

    #[test]
    fn narrower_request_is_served_from_wider_series() {
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let seen = cache.generation("spy");
        cache.insert_if_current("spy", start, candles(start, 10), seen);

        let hit = cache.get("SPY", start + Duration::days(7)).unwrap();
        assert_eq!(hit.len(), 3);
        assert_eq!(hit[0].close, 17.0);

        // wider than what was loaded
        assert!(cache.get("SPY", start - Duration::days(1)).is_none());
    }

    #[test]
    fn invalidate_drops_the_ticker() {
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        cache.insert_if_current("QQQ", start, candles(start, 2), cache.generation("QQQ"));
        cache.insert_if_current("SPY", start, candles(start, 2), cache.generation("SPY"));
        cache.invalidate("qqq");
        assert!(cache.get("QQQ", start).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn load_reads_through_once() {
        let pool = open_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = Store::new(pool);
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        store.save_daily_candles("SPY", &candles(start, 5)).await.unwrap();

        let first = cache.load(&store, "SPY", start).await.unwrap();
        assert_eq!(first.len(), 5);

        // a write the cache was not told about stays invisible until invalidation
        store.save_daily_candles("SPY", &candles(start + Duration::days(5), 1)).await.unwrap();
        assert_eq!(cache.load(&store, "SPY", start).await.unwrap().len(), 5);

        cache.invalidate("SPY");
        assert_eq!(cache.load(&store, "SPY", start).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn write_during_load_is_not_overwritten_by_stale_read() {
        let pool = open_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = Store::new(pool);
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        store.save_daily_candles("SPY", &candles(start, 1)).await.unwrap();

        // load's miss path, split at the await where a writer can slip in
        let seen = cache.generation("SPY");
        let stale = store.get_daily_candles("SPY", start).await.unwrap();
        store.save_daily_candles("SPY", &candles(start, 2)).await.unwrap();
        cache.invalidate("SPY");

        let served = cache.insert_if_current("SPY", start, stale, seen);
        assert_eq!(served.len(), 1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.load(&store, "SPY", start).await.unwrap().len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_after_clear_is_dropped() {
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let seen = cache.generation("SPY");
        cache.clear();
        cache.insert_if_current("SPY", start, candles(start, 3), seen);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn unknown_tickers_are_not_cached() {
        let pool = open_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = Store::new(pool);
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();

        for i in 0..500 {
            let loaded = cache.load(&store, &format!("NOPE{i}"), start).await.unwrap();
            assert!(loaded.is_empty());
        }
        assert_eq!(cache.len(), 0);
        assert!(cache.slots.is_empty());
    }

    #[test]
    fn cache_stops_growing_at_capacity() {
        let cache = CandleCache::new();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        for i in 0..MAX_CACHED_SERIES + 10 {
            let ticker = format!("T{i}");
            cache.insert_if_current(&ticker, start, candles(start, 1), cache.generation(&ticker));
        }
        assert_eq!(cache.len(), MAX_CACHED_SERIES);

        // already-cached tickers can still be refreshed
        cache.invalidate("T0");
        cache.insert_if_current("T0", start, candles(start, 2), cache.generation("T0"));
        assert_eq!(cache.get("T0", start).unwrap().len(), 2);
    }
}
