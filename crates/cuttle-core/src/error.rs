//! Error types for cuttle

use thiserror::Error;

/// Core error type for cuttle operations
///
/// Pool and scope failures each have their own variant so callers can
/// branch on "pool exhausted" vs. "misconfigured" vs. "used before
/// initialized" without inspecting messages.
#[derive(Error, Debug)]
pub enum CuttleError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Connection has already been released to the pool")]
    ClosedConnection,

    #[error("Application not initialized: {0}")]
    AppUninitialized(String),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl CuttleError {
    /// Whether the error is an acquisition that waited out the pool timeout
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, CuttleError::PoolExhausted(_))
    }

    /// Whether the error came from invalid pool or driver configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, CuttleError::Configuration(_))
    }

    /// Whether the error came from using a connection after its release
    pub fn is_closed_connection(&self) -> bool {
        matches!(self, CuttleError::ClosedConnection)
    }

    /// Whether the error came from a scope used before its app was set up
    pub fn is_app_uninitialized(&self) -> bool {
        matches!(self, CuttleError::AppUninitialized(_))
    }
}

/// Result type alias for cuttle operations
pub type Result<T> = std::result::Result<T, CuttleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert!(CuttleError::PoolExhausted("waited 1s".into()).is_pool_exhausted());
        assert!(CuttleError::Configuration("capacity".into()).is_configuration());
        assert!(CuttleError::ClosedConnection.is_closed_connection());
        assert!(CuttleError::AppUninitialized("no app".into()).is_app_uninitialized());
        assert!(!CuttleError::PoolClosed.is_pool_exhausted());
    }

    #[test]
    fn test_error_messages() {
        let err = CuttleError::PoolExhausted("timed out after 50ms".into());
        assert_eq!(err.to_string(), "Pool exhausted: timed out after 50ms");

        let err = CuttleError::ClosedConnection;
        assert!(err.to_string().contains("released"));
    }
}
