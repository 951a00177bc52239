//! Per-unit-of-work connection cache

use std::sync::Arc;

use cuttle_core::{CuttleError, QueryResult, Result, StatementResult, Value};
use cuttle_pool::{ConnectionPool, PoolConnection};

use crate::app::App;

/// Caches at most one pooled connection for one unit of work
///
/// The first call to [`connection`](Self::connection) acquires from the
/// app's pool; later calls reuse that connection as long as it is open and
/// passes the pool's ping. [`teardown`](Self::teardown) releases it.
///
/// Scopes are independent: two scopes on the same app never share a
/// connection. A scope dropped without teardown still returns its
/// connection to the pool.
pub struct AppScope {
    app: Arc<App>,
    pool: ConnectionPool,
    connection: Option<PoolConnection>,
}

impl AppScope {
    pub(crate) fn new(app: Arc<App>, pool: ConnectionPool) -> Self {
        tracing::trace!(app = %app.name(), "opening scope");
        Self {
            app,
            pool,
            connection: None,
        }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Whether a connection is currently cached
    pub fn has_connection(&self) -> bool {
        self.connection.as_ref().is_some_and(|conn| !conn.is_closed())
    }

    /// Get the scope's connection, acquiring one if needed
    ///
    /// A cached connection that was released elsewhere is replaced, and one
    /// that fails the pool's ping is released and replaced.
    pub async fn connection(&mut self) -> Result<&PoolConnection> {
        let reusable = match self.connection.as_ref().map(|conn| conn.connection()) {
            Some(Ok(raw)) => {
                let alive = self.pool.ping(raw).await;
                if !alive {
                    tracing::warn!(app = %self.app.name(), "cached connection failed ping, replacing it");
                }
                alive
            }
            Some(Err(_)) => {
                tracing::debug!(app = %self.app.name(), "cached connection was released, acquiring a new one");
                false
            }
            None => false,
        };

        if !reusable {
            if let Some(mut stale) = self.connection.take() {
                stale.release().await;
            }
            let conn = self.pool.acquire().await?;
            return Ok(self.connection.insert(conn));
        }

        self.connection.as_ref().ok_or(CuttleError::ClosedConnection)
    }

    /// Execute a statement on the scope's connection
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.connection().await?.execute(sql, params).await
    }

    /// Run a query on the scope's connection
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.connection().await?.query(sql, params).await
    }

    /// Release the cached connection, if any
    ///
    /// Safe to call more than once.
    pub async fn teardown(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            tracing::trace!(app = %self.app.name(), "releasing scope connection");
            conn.release().await;
        }
    }
}

impl std::fmt::Debug for AppScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppScope")
            .field("app", &self.app.name())
            .field("connection", &self.connection)
            .finish()
    }
}
