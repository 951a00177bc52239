//! Ping and normalize functions supplied at pool construction

use std::fmt;
use std::sync::Arc;

use cuttle_core::{Connection, Result};
use futures::future::BoxFuture;

use crate::health;

/// Liveness check on a raw connection; dead connections report `false`
pub type PingFn = Arc<dyn for<'c> Fn(&'c dyn Connection) -> BoxFuture<'c, bool> + Send + Sync>;

/// Session reset run on a connection before it is handed to a caller
pub type NormalizeFn =
    Arc<dyn for<'c> Fn(&'c dyn Connection) -> BoxFuture<'c, Result<()>> + Send + Sync>;

/// Optional driver-specific ping and normalize functions
///
/// Whichever function is not supplied falls back to the pool default:
/// [`health::is_alive`] for ping and a no-op for normalize.
#[derive(Clone, Default)]
pub struct ConnectionHooks {
    ping: Option<PingFn>,
    normalize: Option<NormalizeFn>,
}

impl ConnectionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the liveness check
    ///
    /// ```ignore
    /// let hooks = ConnectionHooks::new().with_ping(|conn| {
    ///     Box::pin(async move { conn.query("SELECT 1 FROM DUAL", &[]).await.is_ok() })
    /// });
    /// ```
    pub fn with_ping<F>(mut self, ping: F) -> Self
    where
        F: for<'c> Fn(&'c dyn Connection) -> BoxFuture<'c, bool> + Send + Sync + 'static,
    {
        self.ping = Some(Arc::new(ping));
        self
    }

    /// Set the session reset
    pub fn with_normalize<F>(mut self, normalize: F) -> Self
    where
        F: for<'c> Fn(&'c dyn Connection) -> BoxFuture<'c, Result<()>> + Send + Sync + 'static,
    {
        self.normalize = Some(Arc::new(normalize));
        self
    }

    pub fn has_custom_ping(&self) -> bool {
        self.ping.is_some()
    }

    pub fn has_custom_normalize(&self) -> bool {
        self.normalize.is_some()
    }

    /// Run the liveness check
    pub async fn ping(&self, conn: &dyn Connection) -> bool {
        match &self.ping {
            Some(ping) => ping(conn).await,
            None => health::is_alive(conn).await,
        }
    }

    /// Run the session reset
    pub async fn normalize(&self, conn: &dyn Connection) -> Result<()> {
        match &self.normalize {
            Some(normalize) => normalize(conn).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConnectionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHooks")
            .field("custom_ping", &self.ping.is_some())
            .field("custom_normalize", &self.normalize.is_some())
            .finish()
    }
}

/// Normalize function that rolls back an uncommitted transaction
///
/// Relies on [`Connection::in_transaction`]; drivers that cannot report
/// transaction state are left untouched.
pub fn rollback_open_transaction(conn: &dyn Connection) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        if conn.in_transaction() {
            tracing::debug!(
                driver = conn.driver_name(),
                "rolling back open transaction before checkout"
            );
            conn.execute("ROLLBACK", &[]).await?;
        }
        Ok(())
    })
}
