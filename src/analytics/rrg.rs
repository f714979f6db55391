//! Relative Rotation Graph series (JdK RS-Ratio / RS-Momentum).
//!
//! 1. `rs[i]       = close[i] / benchmark_close[i]`
//! 2. `ratio[i]    = SMA(rs)[i] / SMA(SMA(rs))[i] * 100`, centred on 100 (parity)
//! 3. `momentum[i] = ratio[i] / SMA(ratio)[i] * 100`, rate of change of the ratio
//!
//! Both series sit around 100; a point's quadrant (leading, weakening, lagging,
//! improving) follows from which side of 100 each coordinate falls.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::Candle;

/// Below this many aligned periods the SMAs carry no signal.
pub const MIN_ALIGNED_PERIODS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    #[default]
    Weekly,
}

impl Timeframe {
    fn sma_period(&self) -> usize {
        match self {
            // 10 weeks of trading days
            Timeframe::Daily => 50,
            Timeframe::Weekly => 10,
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Timeframe::Daily),
            "weekly" => Ok(Timeframe::Weekly),
            other => Err(AppError::InvalidInput(format!("unknown timeframe: {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailPoint {
    pub rs_ratio: f64,
    pub rs_momentum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rrg {
    pub ticker: String,
    pub benchmark: String,
    pub rs_ratio: f64,
    pub rs_momentum: f64,
    /// Points immediately before the current one, oldest first.
    pub tail: Vec<TailPoint>,
    /// Last `history` RS-Ratio values with their dates, oldest first.
    pub rs_history: Vec<HistoryPoint>,
}

/// One close per period after resampling.
#[derive(Debug, Clone, Copy)]
struct PeriodClose {
    date: NaiveDate,
    close: f64,
}

fn resample(candles: &[Candle], timeframe: Timeframe) -> Vec<PeriodClose> {
    let daily = candles.iter().map(|c| PeriodClose {
        date: c.timestamp.date_naive(),
        close: c.close,
    });
    match timeframe {
        Timeframe::Daily => daily.collect(),
        Timeframe::Weekly => {
            // last candle of each ISO week wins
            let mut weeks: BTreeMap<(i32, u32), PeriodClose> = BTreeMap::new();
            for p in daily {
                let week = p.date.iso_week();
                weeks.insert((week.year(), week.week()), p);
            }
            weeks.into_values().collect()
        }
    }
}

/// Inner join on date, dropping periods where either close is non-positive.
fn align(etf: &[PeriodClose], bmk: &[PeriodClose]) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
    let bmk_by_date: HashMap<NaiveDate, f64> = bmk.iter().map(|p| (p.date, p.close)).collect();

    let mut dates = Vec::new();
    let mut etf_closes = Vec::new();
    let mut bmk_closes = Vec::new();
    for p in etf {
        if let Some(&b) = bmk_by_date.get(&p.date) {
            if p.close > 0.0 && b > 0.0 {
                dates.push(p.date);
                etf_closes.push(p.close);
                bmk_closes.push(b);
            }
        }
    }
    (dates, etf_closes, bmk_closes)
}

/// Simple moving average, same length as `src`. Early values use the shorter window available.
fn sma(src: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    (0..src.len())
        .map(|i| {
            let window = &src[i.saturating_sub(period - 1)..=i];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

fn normalized(values: &[f64], against: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(against)
        .map(|(v, m)| if *m != 0.0 { v / m * 100.0 } else { 100.0 })
        .collect()
}

#[inline]
fn r3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// `None` when fewer than [`MIN_ALIGNED_PERIODS`] periods line up between the two series.
pub fn compute_rrg(
    ticker: &str,
    benchmark: &str,
    candles: &[Candle],
    benchmark_candles: &[Candle],
    timeframe: Timeframe,
    tail_len: usize,
    history_len: usize,
) -> Option<Rrg> {
    let etf = resample(candles, timeframe);
    let bmk = resample(benchmark_candles, timeframe);
    let (dates, etf_close, bmk_close) = align(&etf, &bmk);
    let n = dates.len();
    if n < MIN_ALIGNED_PERIODS {
        return None;
    }

    let period = timeframe.sma_period();
    let rs: Vec<f64> = etf_close.iter().zip(&bmk_close).map(|(e, b)| e / b).collect();
    let rs_smooth = sma(&rs, period);
    let rs_ratio = normalized(&rs_smooth, &sma(&rs_smooth, period));
    let rs_momentum = normalized(&rs_ratio, &sma(&rs_ratio, period));

    let tail_start = n.saturating_sub(tail_len + 1);
    let tail = (tail_start..n - 1)
        .map(|i| TailPoint {
            rs_ratio: r3(rs_ratio[i]),
            rs_momentum: r3(rs_momentum[i]),
        })
        .collect();

    let rs_history = (n.saturating_sub(history_len)..n)
        .map(|i| HistoryPoint {
            date: dates[i],
            value: r3(rs_ratio[i]),
        })
        .collect();

    Some(Rrg {
        ticker: ticker.to_uppercase(),
        benchmark: benchmark.to_uppercase(),
        rs_ratio: r3(rs_ratio[n - 1]),
        rs_momentum: r3(rs_momentum[n - 1]),
        tail,
        rs_history,
    })
}
