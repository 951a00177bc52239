//! Checked-out connection proxy

use std::fmt;
use std::sync::Arc;

use cuttle_core::{Connection, CuttleError, QueryResult, Result, StatementResult, Value};

use super::pool::{ConnectionPool, SharedPool};

/// A connection checked out of a [`ConnectionPool`]
///
/// Owns the raw connection exclusively until [`release`](Self::release)
/// hands it back. After that every delegated operation fails with
/// `ClosedConnection` and further releases do nothing.
///
/// A `PoolConnection` dropped without being released is still returned to
/// its pool, but callers should release explicitly so the health check
/// runs before the next checkout.
pub struct PoolConnection {
    connection: Option<Box<dyn Connection>>,
    pool: Arc<SharedPool>,
}

impl PoolConnection {
    pub(super) fn new(connection: Box<dyn Connection>, pool: Arc<SharedPool>) -> Self {
        Self {
            connection: Some(connection),
            pool,
        }
    }

    /// Get the raw connection, failing once it has been released
    pub fn connection(&self) -> Result<&dyn Connection> {
        match &self.connection {
            Some(conn) => Ok(&**conn),
            None => Err(CuttleError::ClosedConnection),
        }
    }

    /// Get the driver name of the raw connection
    pub fn driver_name(&self) -> Result<&str> {
        Ok(self.connection()?.driver_name())
    }

    /// Execute a statement on the raw connection
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.connection()?.execute(sql, params).await
    }

    /// Run a query on the raw connection
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.connection()?.query(sql, params).await
    }

    /// Whether the raw connection has been handed back to the pool
    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Hand the raw connection back to the pool
    ///
    /// Idempotent: only the first call returns anything to the pool.
    pub async fn release(&mut self) {
        match self.connection.take() {
            Some(conn) => self.pool.release(conn).await,
            None => tracing::trace!("connection already released"),
        }
    }

    /// Alias for [`release`](Self::release)
    pub async fn close(&mut self) {
        self.release().await;
    }

    /// Whether this connection was checked out of `pool`
    pub fn belongs_to(&self, pool: &ConnectionPool) -> bool {
        pool.same_pool(&self.pool)
    }
}

impl fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConnection")
            .field("driver", &self.connection.as_ref().map(|c| c.driver_name()))
            .field("released", &self.connection.is_none())
            .finish()
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            tracing::debug!(
                driver = conn.driver_name(),
                "pool connection dropped without release, reclaiming"
            );
            self.pool.reclaim(conn);
        }
    }
}
