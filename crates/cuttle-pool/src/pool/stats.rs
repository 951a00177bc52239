//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's bookkeeping
///
/// Taken under the pool lock, so the numbers are consistent with each
/// other at the moment of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of idle connections in the idle store
    idle: usize,
    /// Number of connections held by callers, overflow included
    checked_out: usize,
    /// Number of acquisitions waiting for a connection
    waiting: usize,
    /// Configured idle capacity
    capacity: usize,
    /// Configured overflow allowance
    overflow: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(
        idle: usize,
        checked_out: usize,
        waiting: usize,
        capacity: usize,
        overflow: usize,
    ) -> Self {
        Self {
            idle,
            checked_out,
            waiting,
            capacity,
            overflow,
        }
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of checked-out connections
    pub fn checked_out(&self) -> usize {
        self.checked_out
    }

    /// Get the number of waiting acquisitions
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Get the number of live connections (idle + checked out)
    pub fn total(&self) -> usize {
        self.idle + self.checked_out
    }

    /// Ceiling on checked-out connections
    pub fn max_connections(&self) -> usize {
        self.capacity.saturating_add(self.overflow)
    }

    /// Number of checked-out connections beyond capacity
    pub fn overflow_in_use(&self) -> usize {
        self.checked_out.saturating_sub(self.capacity)
    }

    /// Fraction of the checkout ceiling in use (0.0 to 1.0)
    ///
    /// Returns 0.0 if the ceiling is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        let max = self.max_connections();
        if max == 0 {
            0.0
        } else {
            self.checked_out as f64 / max as f64
        }
    }

    /// Check if the next acquisition would have to wait
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.checked_out >= self.max_connections()
    }
}
