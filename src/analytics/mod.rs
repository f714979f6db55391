//! Derived figures computed from stored candles and performance rows.

pub mod perf;
pub mod rrg;
pub mod summary;
