//! Connection pool implementation

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cuttle_core::{Connection, ConnectionArguments, Connector, CuttleError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::config::{PoolConfig, PoolOptions};
use super::connection::PoolConnection;
use super::hooks::ConnectionHooks;
use super::stats::PoolStats;

/// What a release passes directly to the longest-waiting acquirer
enum Handoff {
    /// A connection that passed its release ping; ownership moves over
    Connection(Box<dyn Connection>),
    /// A free checkout slot; the acquirer opens its own connection
    Slot,
}

/// Outcome of claiming a checkout slot
enum Reservation {
    /// Popped from the idle store, still needs a ping
    Idle(Box<dyn Connection>),
    /// Handed over by a release, already pinged
    HandedOff(Box<dyn Connection>),
    /// Slot only, a new connection has to be opened
    Open,
}

/// A parked acquisition
struct Waiter {
    id: u64,
    sender: oneshot::Sender<Handoff>,
}

/// Bookkeeping guarded by the pool lock
struct PoolState {
    /// Idle connections, most recently released at the back
    idle: VecDeque<Box<dyn Connection>>,
    /// Connections held by callers or being prepared for them
    checked_out: usize,
    /// Parked acquisitions in arrival order
    waiters: VecDeque<Waiter>,
    closed: bool,
}

/// State shared between a pool handle and the connections it hands out
pub(crate) struct SharedPool {
    config: PoolConfig,
    arguments: ConnectionArguments,
    hooks: ConnectionHooks,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    next_waiter_id: AtomicU64,
}

/// A capacity-bounded, overflow-aware connection pool
///
/// At most `capacity` connections are kept idle, and at most
/// `capacity + overflow` are checked out at once. When the ceiling is
/// reached, acquisitions wait in arrival order until a connection is
/// released or the configured timeout elapses.
///
/// Cloning the pool yields another handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<SharedPool>,
}

impl ConnectionPool {
    /// Create a new connection pool
    ///
    /// Fails with a configuration error when the sizing is invalid or the
    /// connector rejects the connection arguments.
    pub fn new<C: Connector>(connector: C, options: PoolOptions) -> Result<Self> {
        Self::with_connector(Arc::new(connector), options)
    }

    /// Create a new connection pool from a shared connector
    pub fn with_connector(connector: Arc<dyn Connector>, options: PoolOptions) -> Result<Self> {
        let (config, arguments, hooks) = options.into_parts();
        config.validate()?;
        connector.check_arguments(&arguments)?;

        tracing::info!(
            capacity = config.capacity(),
            overflow = config.overflow(),
            timeout_ms = config.timeout().map(|t| t.as_millis() as u64),
            custom_ping = hooks.has_custom_ping(),
            custom_normalize = hooks.has_custom_normalize(),
            "connection pool created"
        );

        Ok(Self {
            shared: Arc::new(SharedPool {
                config,
                arguments,
                hooks,
                connector,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    checked_out: 0,
                    waiters: VecDeque::new(),
                    closed: false,
                }),
                next_waiter_id: AtomicU64::new(0),
            }),
        })
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Take the most recently released idle connection, replacing it if
    ///    it fails its ping
    /// 2. If none is idle and the checkout ceiling is not reached, open a
    ///    new connection
    /// 3. Otherwise wait, in arrival order, for a release (with timeout)
    ///
    /// The connection is normalized before it is returned. Fails with
    /// `PoolExhausted` when the timeout elapses, and with whatever error
    /// the connector returns when opening a connection fails.
    pub async fn acquire(&self) -> Result<PoolConnection> {
        let reservation = self.shared.reserve().await?;
        let slot = SlotGuard::new(&self.shared);

        let conn = match reservation {
            Reservation::Idle(conn) => self.shared.revive(conn).await?,
            Reservation::HandedOff(conn) => conn,
            Reservation::Open => self.shared.open().await?,
        };

        if let Err(e) = self.shared.hooks.normalize(&*conn).await {
            tracing::warn!(error = %e, "normalizing connection failed, discarding it");
            close_quietly(conn).await;
            return Err(e);
        }

        slot.disarm();
        Ok(PoolConnection::new(conn, Arc::clone(&self.shared)))
    }

    /// Return a connection to the pool
    ///
    /// Equivalent to [`PoolConnection::release`]; a connection that was
    /// already released is left alone.
    pub async fn release(&self, conn: &mut PoolConnection) {
        if !conn.belongs_to(self) {
            tracing::warn!("releasing a connection that belongs to a different pool");
        }
        conn.release().await;
    }

    /// Run the pool's liveness check on a connection
    pub async fn ping(&self, conn: &dyn Connection) -> bool {
        self.shared.hooks.ping(conn).await
    }

    /// Run the pool's session reset on a connection
    pub async fn normalize_connection(&self, conn: &dyn Connection) -> Result<()> {
        self.shared.hooks.normalize(conn).await
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats::new(
            state.idle.len(),
            state.checked_out,
            state.waiters.len(),
            self.shared.config.capacity(),
            self.shared.config.overflow(),
        )
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get the arguments every new connection is opened with
    pub fn connection_arguments(&self) -> &ConnectionArguments {
        &self.shared.arguments
    }

    /// Whether the pool has been shut down
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Shut the pool down
    ///
    /// Further acquisitions and all parked ones fail with `PoolClosed`.
    /// Idle connections are closed now; checked-out connections are closed
    /// when they are released.
    pub async fn close(&self) {
        let idle: Vec<_> = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            // Dropping the senders wakes every waiter with PoolClosed.
            state.waiters.clear();
            state.idle.drain(..).collect()
        };

        tracing::info!(idle = idle.len(), "closing connection pool");
        for conn in idle {
            close_quietly(conn).await;
        }
    }

    /// Whether two handles refer to the same pool
    pub fn ptr_eq(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(super) fn same_pool(&self, shared: &Arc<SharedPool>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SharedPool {
    /// Claim a checkout slot, waiting in line when the pool is exhausted
    async fn reserve(&self) -> Result<Reservation> {
        let (id, receiver) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(CuttleError::PoolClosed);
            }

            if let Some(conn) = state.idle.pop_back() {
                state.checked_out += 1;
                tracing::debug!(
                    idle = state.idle.len(),
                    checked_out = state.checked_out,
                    "checking out idle connection"
                );
                return Ok(Reservation::Idle(conn));
            }

            if state.checked_out < self.config.max_connections() {
                state.checked_out += 1;
                tracing::debug!(
                    checked_out = state.checked_out,
                    overflow = state.checked_out > self.config.capacity(),
                    "reserving slot for a new connection"
                );
                return Ok(Reservation::Open);
            }

            if self.config.timeout() == Some(Duration::ZERO) {
                return Err(self.exhausted());
            }

            let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(Waiter { id, sender });
            tracing::debug!(waiter = id, waiting = state.waiters.len(), "pool exhausted, waiting");
            (id, receiver)
        };

        let mut wait = WaitGuard {
            shared: self,
            id,
            receiver,
            finished: false,
        };

        let received = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, &mut wait.receiver).await.ok(),
            None => Some((&mut wait.receiver).await),
        };

        let handoff = match received {
            Some(Ok(handoff)) => handoff,
            // The sender is only dropped unsent when the pool shuts down.
            Some(Err(_)) => {
                wait.finished = true;
                return Err(CuttleError::PoolClosed);
            }
            None => {
                // Leaving the queue and checking for a late hand-off happen
                // under the same lock a release sends under.
                let still_queued = {
                    let mut state = self.state.lock();
                    match state.waiters.iter().position(|w| w.id == id) {
                        Some(pos) => {
                            state.waiters.remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                wait.finished = true;
                if still_queued {
                    return Err(self.exhausted());
                }
                match wait.receiver.try_recv() {
                    Ok(handoff) => handoff,
                    Err(_) => return Err(CuttleError::PoolClosed),
                }
            }
        };

        wait.finished = true;
        Ok(match handoff {
            Handoff::Connection(conn) => Reservation::HandedOff(conn),
            Handoff::Slot => Reservation::Open,
        })
    }

    /// Ping an idle connection, replacing it when it is dead
    async fn revive(&self, conn: Box<dyn Connection>) -> Result<Box<dyn Connection>> {
        if !conn.is_closed() && self.hooks.ping(&*conn).await {
            return Ok(conn);
        }

        tracing::warn!(
            driver = conn.driver_name(),
            "idle connection failed health check, opening a replacement"
        );
        close_quietly(conn).await;
        self.open().await
    }

    /// Open a new connection with the pool's arguments
    async fn open(&self) -> Result<Box<dyn Connection>> {
        let conn = self
            .connector
            .connect(&self.arguments)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "opening connection failed"))?;
        tracing::debug!(driver = conn.driver_name(), "opened new connection");
        Ok(conn)
    }

    /// Take a connection back from a caller
    ///
    /// Healthy connections go to the longest waiter or the idle store;
    /// unhealthy ones, or ones the idle store has no room for, are closed.
    pub(super) async fn release(&self, conn: Box<dyn Connection>) {
        let slot = SlotGuard::new(self);
        let healthy = !conn.is_closed() && self.hooks.ping(&*conn).await;

        slot.disarm();
        let to_close = {
            let mut state = self.state.lock();
            if healthy {
                self.hand_back(&mut state, Handoff::Connection(conn))
            } else {
                self.hand_back(&mut state, Handoff::Slot);
                Some(conn)
            }
        };

        if let Some(conn) = to_close {
            if !healthy {
                tracing::warn!(
                    driver = conn.driver_name(),
                    "released connection failed health check, closing it"
                );
            }
            close_quietly(conn).await;
        }
    }

    /// Take back a connection whose holder went away without releasing it
    pub(super) fn reclaim(self: &Arc<Self>, conn: Box<dyn Connection>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move { shared.release(conn).await });
            }
            Err(_) => {
                // No runtime to ping or close on; the next checkout pings it.
                let handoff = if conn.is_closed() {
                    Handoff::Slot
                } else {
                    Handoff::Connection(conn)
                };
                let to_close = {
                    let mut state = self.state.lock();
                    self.hand_back(&mut state, handoff)
                };
                if let Some(conn) = to_close {
                    close_detached(conn);
                }
            }
        }
    }

    /// Give up one checkout, passing it to the longest waiter if any
    ///
    /// Returns the connection when it has to be closed instead of kept.
    fn hand_back(&self, state: &mut PoolState, handoff: Handoff) -> Option<Box<dyn Connection>> {
        let mut handoff = handoff;
        if !state.closed {
            while let Some(waiter) = state.waiters.pop_front() {
                match waiter.sender.send(handoff) {
                    Ok(()) => {
                        tracing::debug!(waiter = waiter.id, "handed checkout to waiter");
                        return None;
                    }
                    Err(returned) => handoff = returned,
                }
            }
        }

        debug_assert!(state.checked_out > 0, "checkout count underflow");
        state.checked_out = state.checked_out.saturating_sub(1);

        match handoff {
            Handoff::Connection(conn)
                if !state.closed && state.idle.len() < self.config.capacity() =>
            {
                state.idle.push_back(conn);
                tracing::debug!(
                    idle = state.idle.len(),
                    checked_out = state.checked_out,
                    "connection returned to idle store"
                );
                None
            }
            Handoff::Connection(conn) => Some(conn),
            Handoff::Slot => None,
        }
    }

    fn exhausted(&self) -> CuttleError {
        let waited = match self.config.timeout() {
            Some(limit) => format!("{:?}", limit),
            None => "unbounded".to_string(),
        };
        CuttleError::PoolExhausted(format!(
            "no connection available after waiting {} ({} checked out, capacity {} + overflow {})",
            waited,
            self.config.max_connections(),
            self.config.capacity(),
            self.config.overflow()
        ))
    }
}

/// Gives a checkout slot back if dropped before being disarmed
///
/// Covers error returns and cancelled futures between claiming a slot and
/// handing a connection to the caller.
struct SlotGuard<'a> {
    shared: &'a SharedPool,
    armed: bool,
}

impl<'a> SlotGuard<'a> {
    fn new(shared: &'a SharedPool) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.state.lock();
            let _ = self.shared.hand_back(&mut state, Handoff::Slot);
        }
    }
}

/// Removes a parked acquisition from the queue if its future is dropped
struct WaitGuard<'a> {
    shared: &'a SharedPool,
    id: u64,
    receiver: oneshot::Receiver<Handoff>,
    finished: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let to_close = {
            let mut state = self.shared.state.lock();
            state.waiters.retain(|w| w.id != self.id);
            match self.receiver.try_recv() {
                // Already picked by a release; pass the checkout on.
                Ok(handoff) => self.shared.hand_back(&mut state, handoff),
                Err(_) => None,
            }
        };
        if let Some(conn) = to_close {
            close_detached(conn);
        }
    }
}

async fn close_quietly(conn: Box<dyn Connection>) {
    if let Err(e) = conn.close().await {
        tracing::warn!(driver = conn.driver_name(), error = %e, "closing connection failed");
    }
}

/// Close a connection from a synchronous context
///
/// The close runs on the current runtime; without one the connection is
/// dropped unclosed.
fn close_detached(conn: Box<dyn Connection>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(close_quietly(conn));
        }
        Err(_) => {
            tracing::warn!(
                driver = conn.driver_name(),
                "no runtime to close connection on, dropping it"
            );
        }
    }
}
