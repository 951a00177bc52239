//! Pool configuration types

use std::fmt;
use std::time::Duration;

use cuttle_core::{Connection, ConnectionArguments, Connector, CuttleError, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::hooks::ConnectionHooks;
use super::pool::ConnectionPool;

/// Sizing and timeout configuration for a connection pool
///
/// `capacity` bounds the idle store, `capacity + overflow` bounds the
/// number of connections checked out at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections kept in the idle store
    capacity: usize,
    /// Additional connections allowed beyond capacity under load
    overflow: usize,
    /// Acquisition wait limit in milliseconds (`None` waits forever)
    timeout_ms: Option<u64>,
}

impl PoolConfig {
    pub const DEFAULT_CAPACITY: usize = 5;
    pub const DEFAULT_OVERFLOW: usize = 1;

    /// Create a new configuration with an unbounded acquisition timeout
    ///
    /// Bounds are checked by [`PoolConfig::validate`], which runs when the
    /// pool is constructed.
    pub fn new(capacity: usize, overflow: usize) -> Self {
        Self {
            capacity,
            overflow,
            timeout_ms: None,
        }
    }

    /// Bound how long an acquisition may wait for a connection
    ///
    /// A zero timeout makes an exhausted pool fail immediately. Timeouts
    /// are kept in whole milliseconds, rounded up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    /// Set the acquisition timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Wait for a connection for as long as it takes
    pub fn without_timeout(mut self) -> Self {
        self.timeout_ms = None;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: usize) -> Self {
        self.overflow = overflow;
        self
    }

    /// Get the idle store capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the overflow allowance
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Get the acquisition timeout, `None` when unbounded
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Maximum number of connections checked out at once
    pub fn max_connections(&self) -> usize {
        self.capacity.saturating_add(self.overflow)
    }

    /// Check the bounds, failing with a configuration error
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CuttleError::Configuration(format!(
                "capacity must be at least 1, got {}",
                self.capacity
            )));
        }
        if self.capacity.checked_add(self.overflow).is_none() {
            return Err(CuttleError::Configuration(format!(
                "capacity ({}) plus overflow ({}) is too large",
                self.capacity, self.overflow
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - capacity: 5
    /// - overflow: 1
    /// - timeout: unbounded
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_OVERFLOW)
    }
}

/// Everything a pool is constructed from, apart from the connector
///
/// Holds the sizing configuration, the connection arguments forwarded to
/// the connector, and the optional ping/normalize functions.
#[derive(Clone, Default)]
pub struct PoolOptions {
    config: PoolConfig,
    arguments: ConnectionArguments,
    hooks: ConnectionHooks,
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sizing configuration
    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_capacity(capacity);
        self
    }

    pub fn with_overflow(mut self, overflow: usize) -> Self {
        self.config = self.config.with_overflow(overflow);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.config = self.config.without_timeout();
        self
    }

    /// Add one connection argument
    pub fn with_argument(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key, value);
        self
    }

    /// Overlay a set of connection arguments; keys in `arguments` win
    pub fn with_arguments(mut self, arguments: &ConnectionArguments) -> Self {
        self.arguments.merge(arguments);
        self
    }

    /// Replace both hook functions at once
    pub fn with_hooks(mut self, hooks: ConnectionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Use a driver-specific liveness check instead of the default ping
    pub fn with_ping<F>(mut self, ping: F) -> Self
    where
        F: for<'c> Fn(&'c dyn Connection) -> BoxFuture<'c, bool> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.with_ping(ping);
        self
    }

    /// Reset session state on every connection before it is handed out
    pub fn with_normalize<F>(mut self, normalize: F) -> Self
    where
        F: for<'c> Fn(&'c dyn Connection) -> BoxFuture<'c, Result<()>> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.with_normalize(normalize);
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn arguments(&self) -> &ConnectionArguments {
        &self.arguments
    }

    pub fn hooks(&self) -> &ConnectionHooks {
        &self.hooks
    }

    /// Mutable access to the sizing configuration
    pub fn config_mut(&mut self) -> &mut PoolConfig {
        &mut self.config
    }

    /// Mutable access to the connection arguments
    pub fn arguments_mut(&mut self) -> &mut ConnectionArguments {
        &mut self.arguments
    }

    /// Construct a pool that opens connections through `connector`
    pub fn build<C: Connector>(self, connector: C) -> Result<ConnectionPool> {
        ConnectionPool::new(connector, self)
    }

    pub(super) fn into_parts(self) -> (PoolConfig, ConnectionArguments, ConnectionHooks) {
        (self.config, self.arguments, self.hooks)
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("config", &self.config)
            .field("arguments", &self.arguments.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .finish()
    }
}
