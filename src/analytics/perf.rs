use std::collections::BTreeMap;

use chrono::{DateTime, Months, Utc};

use crate::types::{Candle, ExtraInfo, Performance, TickerType};

/// Look-back windows and their keys, in months.
pub const TIME_FRAMES: [(&str, u32); 4] = [("1M", 1), ("3M", 3), ("6M", 6), ("1Y", 12)];

/// Percentage return per time-frame key ("1M", "3M", "6M", "1Y", ...).
pub type PerfMap = BTreeMap<String, f64>;

/// Returns over each of [`TIME_FRAMES`], measured from the candle closest to the
/// look-back target to the latest candle. `candles` must be sorted oldest first.
pub fn compute_perf(candles: &[Candle]) -> PerfMap {
    let Some(latest) = candles.last() else {
        return PerfMap::new();
    };

    let closest_return = |months_ago: u32| -> Option<f64> {
        let target = latest.timestamp.checked_sub_months(Months::new(months_ago))?;
        candles
            .iter()
            .min_by_key(|c| (c.timestamp - target).num_seconds().abs())
            .filter(|c| c.close > 0.0)
            .map(|c| (latest.close - c.close) / c.close * 100.0)
    };

    TIME_FRAMES
        .iter()
        .map(|&(key, months)| (key.to_string(), closest_return(months).unwrap_or(0.0)))
        .collect()
}

impl Performance {
    /// Build a record from a time-frame map. Keys outside [`TIME_FRAMES`] land in `extra_info`.
    pub fn from_perf_map(
        ticker: impl Into<String>,
        ticker_type: TickerType,
        mut map: PerfMap,
        now: DateTime<Utc>,
    ) -> Self {
        let mut take = |key: &str| map.remove(key).unwrap_or(0.0);
        let perf_1m = take("1M");
        let perf_3m = take("3M");
        let perf_6m = take("6M");
        let perf_1y = take("1Y");

        let extra_info: ExtraInfo = map
            .into_iter()
            .filter_map(|(k, v)| serde_json::Number::from_f64(v).map(|n| (k, n.into())))
            .collect();

        Self {
            ticker: ticker.into(),
            ticker_type,
            perf_1m,
            perf_3m,
            perf_6m,
            perf_1y,
            extra_info,
            last_updated: now,
        }
    }
}

/// Relative strength of `perf` against `base`. 1.0 means in line with the benchmark.
/// Recent windows weigh more: 30% 1M, 40% 3M, 20% 6M, 10% 1Y.
pub fn compute_rs(perf: &Performance, base: &Performance) -> f64 {
    fn multiplier(p: &Performance) -> f64 {
        1.0 + (p.perf_1m * 0.3 + p.perf_3m * 0.4 + p.perf_6m * 0.2 + p.perf_1y * 0.1) / 100.0
    }

    multiplier(perf) / multiplier(base)
}

/// RS of every record against `base`, rounded to two decimals and keyed by ticker.
pub fn rs_map(perfs: &[Performance], base: &Performance) -> BTreeMap<String, f64> {
    perfs
        .iter()
        .map(|p| (p.ticker.clone(), (compute_rs(p, base) * 100.0).round() / 100.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn daily(start: DateTime<Utc>, closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1,
                last_updated: start,
            })
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_series_has_no_perf() {
        assert!(compute_perf(&[]).is_empty());
    }

    #[test]
    fn perf_uses_closest_candle_to_each_lookback() {
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
        // 367 daily closes rising by 1 from 100; the latest lands on 2026-10-02.
        let closes: Vec<f64> = (0..367).map(|i| 100.0 + i as f64).collect();
        let candles = daily(start, &closes);
        let latest = candles.last().unwrap().clone();

        let perf = compute_perf(&candles);
        assert_eq!(perf.len(), 4);

        let one_month_ago = latest.timestamp.checked_sub_months(Months::new(1)).unwrap();
        let base_close = candles
            .iter()
            .find(|c| c.timestamp == one_month_ago)
            .unwrap()
            .close;
        assert!(approx(perf["1M"], (latest.close - base_close) / base_close * 100.0));

        // A year back is 2025-10-02, the second candle.
        assert!(approx(perf["1Y"], (latest.close - 101.0) / 101.0 * 100.0));
    }

    #[test]
    fn short_series_falls_back_to_first_candle() {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let candles = daily(start, &[50.0, 55.0, 60.0]);
        let perf = compute_perf(&candles);
        assert!(approx(perf["6M"], 20.0));
        assert!(approx(perf["1Y"], 20.0));
    }

    #[test]
    fn perf_map_splits_typed_and_extra_keys() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 21, 0, 0).unwrap();
        let map = PerfMap::from([
            ("1M".to_string(), 1.5),
            ("3M".to_string(), -2.0),
            ("YTD".to_string(), 7.25),
        ]);
        let perf = Performance::from_perf_map("NVDA", TickerType::Stock, map, now);
        assert_eq!(perf.perf_1m, 1.5);
        assert_eq!(perf.perf_3m, -2.0);
        assert_eq!(perf.perf_6m, 0.0);
        assert_eq!(perf.perf_1y, 0.0);
        assert_eq!(perf.extra_info.get("YTD"), Some(&serde_json::json!(7.25)));
        assert_eq!(perf.last_updated, now);
    }

    #[test]
    fn rs_is_weighted_ratio_to_base() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 21, 0, 0).unwrap();
        let base = Performance::from_perf_map("SPY", TickerType::Stock, PerfMap::new(), now);
        let strong = Performance::from_perf_map(
            "NVDA",
            TickerType::Stock,
            PerfMap::from([("3M".to_string(), 25.0)]),
            now,
        );
        assert!(approx(compute_rs(&base, &base), 1.0));
        assert!(approx(compute_rs(&strong, &base), 1.1));

        let map = rs_map(&[strong], &base);
        assert_eq!(map.get("NVDA"), Some(&1.1));
    }
}
