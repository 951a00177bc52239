//! Connection pooling for database connections
//!
//! This module provides a pool with a fixed idle capacity, a bounded
//! overflow allowance, and an optional acquisition timeout.
//!
//! # Example
//!
//! ```ignore
//! use cuttle_pool::pool::{ConnectionPool, PoolOptions};
//!
//! let pool = PoolOptions::new()
//!     .with_capacity(5)
//!     .with_overflow(1)
//!     .with_timeout(Duration::from_secs(2))
//!     .with_argument("path", "/var/lib/app.db")
//!     .build(SqliteConnector::new())?;
//!
//! let mut conn = pool.acquire().await?;
//! conn.query("SELECT 1", &[]).await?;
//! conn.release().await;
//! ```

mod config;
mod connection;
mod hooks;
#[allow(clippy::module_inception)]
mod pool;
mod stats;


pub use config::{PoolConfig, PoolOptions};
pub use connection::PoolConnection;
pub use hooks::{ConnectionHooks, NormalizeFn, PingFn, rollback_open_transaction};
pub use pool::ConnectionPool;
pub use stats::PoolStats;
