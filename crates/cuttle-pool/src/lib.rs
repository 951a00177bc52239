//! Cuttle Pool - Capacity-bounded connection pooling
//!
//! This crate owns the pool core: idle-store bookkeeping, overflow
//! accounting, FIFO waiting with timeouts, health checks on checkout and
//! release, and per-checkout connection normalization.

pub mod health;
pub mod pool;

pub use health::{PingError, PingResult, is_alive, ping_connection};
pub use pool::{
    ConnectionHooks, ConnectionPool, NormalizeFn, PingFn, PoolConfig, PoolConnection,
    PoolOptions, PoolStats, rollback_open_transaction,
};
