//! Connection ping implementation
//!
//! Provides lightweight health checking by executing a minimal query
//! and measuring response time.

use std::time::{Duration, Instant};

use cuttle_core::Connection;
use thiserror::Error;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone, Error)]
pub enum PingError {
    /// The connection is closed
    #[error("Connection is closed")]
    ConnectionClosed,
    /// Query execution failed
    #[error("Ping query failed: {0}")]
    QueryFailed(String),
}

/// Ping a connection to check if it's alive.
///
/// Executes a minimal query and returns the round-trip time.
///
/// # Returns
///
/// * `Ok(Duration)` - The round-trip time if the ping succeeded
/// * `Err(PingError)` - If the connection is closed or the query failed
pub async fn ping_connection(conn: &dyn Connection) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    let ping_query = ping_query(conn.driver_name());

    match conn.query(ping_query, &[]).await {
        Ok(_) => Ok(start.elapsed()),
        Err(e) => Err(PingError::QueryFailed(e.to_string())),
    }
}

/// Default pool liveness check
///
/// Never fails: a closed connection or a failed ping query reports
/// `false`.
pub async fn is_alive(conn: &dyn Connection) -> bool {
    match ping_connection(conn).await {
        Ok(latency) => {
            tracing::trace!(
                driver = conn.driver_name(),
                latency_us = latency.as_micros() as u64,
                "ping succeeded"
            );
            true
        }
        Err(e) => {
            tracing::debug!(driver = conn.driver_name(), error = %e, "ping failed");
            false
        }
    }
}

/// Get the cheapest round-trip query for a given driver.
pub(super) fn ping_query(driver_name: &str) -> &'static str {
    match driver_name {
        "oracle" => "SELECT 1 FROM DUAL",
        "firebird" => "SELECT 1 FROM RDB$DATABASE",
        _ => "SELECT 1",
    }
}
