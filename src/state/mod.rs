pub mod candle_cache;

pub use candle_cache::CandleCache;
