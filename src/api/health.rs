//! Shared health state for the /health endpoint.
//! Updated by the write routes and the maintenance task.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;

/// Shared health metrics. Updated by writers, read by API.
pub struct HealthState {
    started_at: Instant,
    /// Rows accepted by batch writes since startup.
    rows_written: AtomicU64,
    /// Millisecond timestamp of the last batch write (0 = none).
    last_write_at_ms: AtomicI64,
    /// Millisecond timestamp of the last maintenance pass (0 = none).
    last_maintenance_at_ms: AtomicI64,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            rows_written: AtomicU64::new(0),
            last_write_at_ms: AtomicI64::new(0),
            last_maintenance_at_ms: AtomicI64::new(0),
        }
    }

    pub fn record_write(&self, rows: usize) {
        self.rows_written.fetch_add(rows as u64, Ordering::Relaxed);
        self.last_write_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_maintenance(&self) {
        self.last_maintenance_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn last_write_at_ms(&self) -> Option<i64> {
        Some(self.last_write_at_ms.load(Ordering::Relaxed)).filter(|&ms| ms > 0)
    }

    pub fn last_maintenance_at_ms(&self) -> Option<i64> {
        Some(self.last_maintenance_at_ms.load(Ordering::Relaxed)).filter(|&ms| ms > 0)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
