//! Database access layer.
//!
//! - Per-database connection pools
//! - Sessions that run statements on a checked-out connection
//! - Query and upsert-plan execution
//! - MySQL row decoding

pub mod executor;
pub mod params;
pub mod pool;
pub mod session;
pub mod types;

pub use executor::{QueryExecutor, StatementMode};
pub use pool::{ConnectionSource, DatabasePool, PoolManager, PoolStats, PooledConnection};
pub use session::SqlSession;
