pub mod models;
pub mod pool;
pub mod store;

pub use pool::{open_in_memory, open_pool, run_migrations};
pub use store::Store;
