//! Tests for the health module

use super::*;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cuttle_core::{Connection, CuttleError, QueryResult, Result, StatementResult, Value};
use parking_lot::Mutex;

/// Connection that records the last query and fails on demand
struct ScriptedConnection {
    driver: &'static str,
    fail_queries: bool,
    closed: AtomicBool,
    last_query: Mutex<Option<String>>,
}

impl ScriptedConnection {
    fn new(driver: &'static str) -> Self {
        Self {
            driver,
            fail_queries: false,
            closed: AtomicBool::new(false),
            last_query: Mutex::new(None),
        }
    }

    fn failing(driver: &'static str) -> Self {
        Self {
            fail_queries: true,
            ..Self::new(driver)
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn driver_name(&self) -> &str {
        self.driver
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        *self.last_query.lock() = Some(sql.to_string());
        if self.fail_queries {
            return Err(CuttleError::Connection("broken pipe".into()));
        }
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

mod ping_tests {
    use super::*;

    #[test]
    fn test_ping_error_display() {
        let err = PingError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection is closed");

        let err = PingError::QueryFailed("test error".to_string());
        assert_eq!(err.to_string(), "Ping query failed: test error");
    }

    #[test]
    fn test_ping_query() {
        use super::ping::ping_query;

        assert_eq!(ping_query("sqlite"), "SELECT 1");
        assert_eq!(ping_query("postgres"), "SELECT 1");
        assert_eq!(ping_query("mysql"), "SELECT 1");
        assert_eq!(ping_query("oracle"), "SELECT 1 FROM DUAL");
        assert_eq!(ping_query("firebird"), "SELECT 1 FROM RDB$DATABASE");
        assert_eq!(ping_query("unknown"), "SELECT 1");
    }

    #[tokio::test]
    async fn test_ping_connection_success() {
        let conn = ScriptedConnection::new("oracle");
        let latency = ping_connection(&conn).await;
        assert!(latency.is_ok());
        assert_eq!(conn.last_query.lock().as_deref(), Some("SELECT 1 FROM DUAL"));
    }

    #[tokio::test]
    async fn test_ping_connection_query_failure() {
        let conn = ScriptedConnection::failing("sqlite");
        match ping_connection(&conn).await {
            Err(PingError::QueryFailed(msg)) => assert!(msg.contains("broken pipe")),
            other => panic!("expected QueryFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_closed_connection_skips_query() {
        let conn = ScriptedConnection::new("sqlite");
        conn.close().await.unwrap();

        assert!(matches!(
            ping_connection(&conn).await,
            Err(PingError::ConnectionClosed)
        ));
        assert!(conn.last_query.lock().is_none());
    }

    #[tokio::test]
    async fn test_is_alive() {
        assert!(is_alive(&ScriptedConnection::new("sqlite")).await);
        assert!(!is_alive(&ScriptedConnection::failing("sqlite")).await);

        let closed = ScriptedConnection::new("sqlite");
        closed.close().await.unwrap();
        assert!(!is_alive(&closed).await);
    }
}
