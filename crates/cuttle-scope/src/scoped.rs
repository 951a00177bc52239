//! Application-scoped pool registry

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cuttle_core::{Connector, CuttleError, Result};
use cuttle_pool::{ConnectionPool, PoolConnection, PoolOptions};
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};

use crate::app::{App, AppId};
use crate::scope::AppScope;


/// Pool keys that size the pool instead of being passed to the driver
const CAPACITY_KEY: &str = "capacity";
const OVERFLOW_KEY: &str = "overflow";
const TIMEOUT_KEY: &str = "timeout";

/// One connection pool per registered application
///
/// Pools are built lazily on first use from the shared [`PoolOptions`]
/// overlaid with the app's `CUTTLEPOOL_*` configuration, and cached for
/// the lifetime of the `ScopedPool`. After [`shutdown`](Self::shutdown)
/// no pool is handed out again.
pub struct ScopedPool {
    connector: Arc<dyn Connector>,
    options: PoolOptions,
    default_app: Option<Arc<App>>,
    /// Apps registered through `init_app` or `with_app`
    apps: RwLock<HashMap<AppId, Arc<App>>>,
    pools: Mutex<AppPools>,
}

#[derive(Default)]
struct AppPools {
    by_app: HashMap<AppId, ConnectionPool>,
    closed: bool,
}

impl ScopedPool {
    /// Create a scoped pool with no default application
    ///
    /// `options` carries the pool sizing, hooks and connection arguments
    /// shared by every app.
    pub fn new<C: Connector>(connector: C, options: PoolOptions) -> Self {
        Self::with_connector(Arc::new(connector), options)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, options: PoolOptions) -> Self {
        Self {
            connector,
            options,
            default_app: None,
            apps: RwLock::new(HashMap::new()),
            pools: Mutex::new(AppPools::default()),
        }
    }

    /// Register `app` and use it whenever no app is given explicitly
    pub fn with_app(mut self, app: Arc<App>) -> Self {
        self.init_app(&app);
        self.default_app = Some(app);
        self
    }

    /// Register an application
    ///
    /// Its pool is not built until the first acquisition.
    pub fn init_app(&self, app: &Arc<App>) {
        tracing::info!(app = %app.name(), app_id = %app.id(), "registering application");
        self.apps.write().insert(app.id(), Arc::clone(app));
    }

    /// Whether `app` was registered on this scoped pool
    pub fn is_initialized(&self, app: &App) -> bool {
        self.apps.read().contains_key(&app.id())
    }

    /// Registered applications
    pub fn apps(&self) -> Vec<Arc<App>> {
        self.apps.read().values().cloned().collect()
    }

    pub fn default_app(&self) -> Option<&Arc<App>> {
        self.default_app.as_ref()
    }

    /// Shared options every app's pool starts from
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Pick `app` if given, otherwise the default application
    pub fn resolve_app(&self, app: Option<&Arc<App>>) -> Result<Arc<App>> {
        app.or(self.default_app.as_ref())
            .cloned()
            .ok_or_else(|| CuttleError::AppUninitialized("No application found".into()))
    }

    /// Get the pool of an application, building it on first use
    ///
    /// The same app always yields the same pool. Fails with
    /// `AppUninitialized` if the app was never registered here, and with
    /// `PoolClosed` once the scoped pool has been shut down.
    pub fn pool(&self, app: &App) -> Result<ConnectionPool> {
        if !self.is_initialized(app) {
            return Err(CuttleError::AppUninitialized(format!(
                "application '{}' ({}) is not initialized on this pool",
                app.name(),
                app.id()
            )));
        }

        let mut pools = self.pools.lock();
        if pools.closed {
            return Err(CuttleError::PoolClosed);
        }
        if let Some(pool) = pools.by_app.get(&app.id()) {
            return Ok(pool.clone());
        }

        let pool = ConnectionPool::with_connector(
            Arc::clone(&self.connector),
            self.make_options(app)?,
        )?;
        tracing::info!(app = %app.name(), app_id = %app.id(), "built application pool");
        pools.by_app.insert(app.id(), pool.clone());
        Ok(pool)
    }

    /// Acquire an uncached connection; the caller must release it
    pub async fn get_connection(&self, app: Option<&Arc<App>>) -> Result<PoolConnection> {
        let app = self.resolve_app(app)?;
        self.pool(&app)?.acquire().await
    }

    /// Open a scope that caches one connection until torn down
    pub fn scope(&self, app: Option<&Arc<App>>) -> Result<AppScope> {
        let app = self.resolve_app(app)?;
        let pool = self.pool(&app)?;
        Ok(AppScope::new(app, pool))
    }

    /// Run `f` inside a fresh scope
    ///
    /// The scope is torn down whether `f` succeeds or fails.
    ///
    /// ```ignore
    /// let rows = scoped
    ///     .with_scope(None, |scope| {
    ///         Box::pin(async move { scope.query("SELECT name FROM bakers", &[]).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_scope<T, F>(&self, app: Option<&Arc<App>>, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut AppScope) -> BoxFuture<'s, Result<T>>,
    {
        let mut scope = self.scope(app)?;
        let result = f(&mut scope).await;
        if let Err(e) = &result {
            tracing::debug!(app = %scope.app().name(), error = %e, "scope ended with error");
        }
        scope.teardown().await;
        result
    }

    /// Close every pool built so far
    ///
    /// Later calls to [`pool`](Self::pool) and the acquisitions built on it
    /// fail with `PoolClosed`.
    pub async fn shutdown(&self) {
        let pools: Vec<_> = {
            let mut pools = self.pools.lock();
            pools.closed = true;
            pools.by_app.values().cloned().collect()
        };
        tracing::info!(pools = pools.len(), "shutting down application pools");
        for pool in pools {
            pool.close().await;
        }
    }

    /// Overlay the app's configuration on the shared options
    fn make_options(&self, app: &App) -> Result<PoolOptions> {
        let mut arguments = app.config().connection_arguments();
        let mut options = self.options.clone();

        if let Some(value) = arguments.remove(CAPACITY_KEY) {
            options = options.with_capacity(count(CAPACITY_KEY, &value)?);
        }
        if let Some(value) = arguments.remove(OVERFLOW_KEY) {
            options = options.with_overflow(count(OVERFLOW_KEY, &value)?);
        }
        if let Some(value) = arguments.remove(TIMEOUT_KEY) {
            options = match timeout(&value)? {
                Some(limit) => options.with_timeout(limit),
                None => options.without_timeout(),
            };
        }

        Ok(options.with_arguments(&arguments))
    }
}

impl fmt::Debug for ScopedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedPool")
            .field("options", &self.options)
            .field("default_app", &self.default_app.as_ref().map(|app| app.name()))
            .field("apps", &self.apps.read().len())
            .field("pools", &self.pools.lock().by_app.len())
            .finish()
    }
}

fn count(key: &str, value: &serde_json::Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            CuttleError::Configuration(format!(
                "{} must be a non-negative integer, got {}",
                key, value
            ))
        })
}

/// Timeout in seconds; `null` waits forever
fn timeout(value: &serde_json::Value) -> Result<Option<Duration>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_f64()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(Some)
        .ok_or_else(|| {
            CuttleError::Configuration(format!(
                "timeout must be a non-negative number of seconds, got {}",
                value
            ))
        })
}
