//! SQLite connector

use std::time::Duration;

use async_trait::async_trait;
use cuttle_core::{Connection, ConnectionArguments, Connector, CuttleError, Result};

use crate::SqliteConnection;

/// Opens [`SqliteConnection`]s from connection arguments
///
/// Recognized arguments:
/// - `path` (or `database`): database file, `:memory:` or a `file:` URI
/// - `busy_timeout_ms`: how long to wait on a locked database
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        Self
    }

    fn path(arguments: &ConnectionArguments) -> Option<String> {
        arguments
            .get_string("path")
            .or_else(|| arguments.get_string("database"))
    }

    fn busy_timeout(arguments: &ConnectionArguments) -> Result<Option<Duration>> {
        match arguments.get("busy_timeout_ms") {
            None => Ok(None),
            Some(value) => value.as_u64().map(Duration::from_millis).map(Some).ok_or_else(|| {
                CuttleError::Configuration(format!(
                    "busy_timeout_ms must be a non-negative integer, got {}",
                    value
                ))
            }),
        }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    #[tracing::instrument(skip(self, arguments), fields(path = Self::path(arguments).as_deref()))]
    async fn connect(&self, arguments: &ConnectionArguments) -> Result<Box<dyn Connection>> {
        let path = Self::path(arguments).ok_or_else(|| {
            CuttleError::Configuration(
                "SQLite requires 'path' or 'database' argument. Example: { \"path\": \"/path/to/database.db\" }".into(),
            )
        })?;
        let busy_timeout = Self::busy_timeout(arguments)?;

        let conn = SqliteConnection::open_with_busy_timeout(&path, busy_timeout)
            .inspect_err(|e| tracing::error!(error = %e, "failed to connect to SQLite database"))?;

        Ok(Box::new(conn))
    }

    fn check_arguments(&self, arguments: &ConnectionArguments) -> Result<()> {
        if Self::path(arguments).is_none() {
            return Err(CuttleError::Configuration(
                "SQLite requires 'path' or 'database' argument".into(),
            ));
        }
        Self::busy_timeout(arguments)?;
        Ok(())
    }
}
