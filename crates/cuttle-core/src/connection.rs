//! Connection and connector traits

use crate::{ConnectionArguments, QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A raw, driver-specific database connection
///
/// The pool treats connections as opaque apart from the operations
/// declared here: it pings them with a cheap query, asks whether a
/// transaction is open when normalizing, and closes them when they are
/// discarded.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Whether the session currently has an uncommitted transaction
    ///
    /// Drivers that cannot tell report `false`.
    fn in_transaction(&self) -> bool {
        false
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Opens new raw connections from a set of arguments
///
/// This is the driver's `connect` function as seen by the pool. The
/// arguments are forwarded verbatim; errors are returned to the caller of
/// the acquisition unchanged.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection
    async fn connect(&self, arguments: &ConnectionArguments) -> Result<Box<dyn Connection>>;

    /// Reject arguments the driver can never connect with
    ///
    /// Called once when a pool is constructed. Default implementation
    /// accepts everything.
    fn check_arguments(&self, _arguments: &ConnectionArguments) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    async fn connect(&self, arguments: &ConnectionArguments) -> Result<Box<dyn Connection>> {
        (**self).connect(arguments).await
    }

    fn check_arguments(&self, arguments: &ConnectionArguments) -> Result<()> {
        (**self).check_arguments(arguments)
    }
}

/// A [`Connector`] backed by a plain async function
///
/// Created with [`connector_fn`].
pub struct ConnectorFn<F> {
    f: F,
}

/// Wrap an async function taking the connection arguments as a connector
///
/// ```ignore
/// let connector = connector_fn(|args: ConnectionArguments| async move {
///     let conn = MyConnection::open(&args).await?;
///     Ok(Box::new(conn) as Box<dyn Connection>)
/// });
/// ```
pub fn connector_fn<F, Fut>(f: F) -> ConnectorFn<F>
where
    F: Fn(ConnectionArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn Connection>>> + Send + 'static,
{
    ConnectorFn { f }
}

#[async_trait]
impl<F, Fut> Connector for ConnectorFn<F>
where
    F: Fn(ConnectionArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn Connection>>> + Send + 'static,
{
    async fn connect(&self, arguments: &ConnectionArguments) -> Result<Box<dyn Connection>> {
        (self.f)(arguments.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CuttleError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct EchoConnection {
        arguments: ConnectionArguments,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Connection for EchoConnection {
        fn driver_name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
            Ok(StatementResult::default())
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
            let host = self.arguments.get_string("host").unwrap_or_default();
            Ok(QueryResult {
                rows: vec![crate::Row::new(vec!["host".into()], vec![Value::Text(host)])],
                ..QueryResult::empty()
            })
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_connector_fn_forwards_arguments() {
        let connector = connector_fn(|arguments: ConnectionArguments| async move {
            Ok(Box::new(EchoConnection {
                arguments,
                closed: AtomicBool::new(false),
            }) as Box<dyn Connection>)
        });

        let args = ConnectionArguments::new().with("host", "an_ip_address_in_england");
        let conn = connector.connect(&args).await.expect("connect");

        let result = conn.query("SELECT host", &[]).await.expect("query");
        assert_eq!(
            result.rows[0].get(0),
            Some(&Value::from("an_ip_address_in_england"))
        );
        assert!(!conn.in_transaction());
        assert!(connector.check_arguments(&args).is_ok());
    }

    #[tokio::test]
    async fn test_connector_fn_propagates_errors() {
        let connector = connector_fn(|_args: ConnectionArguments| async move {
            Err::<Box<dyn Connection>, _>(CuttleError::Connection("refused".into()))
        });

        let err = connector
            .connect(&ConnectionArguments::new())
            .await
            .err()
            .expect("connect should fail");
        assert!(matches!(err, CuttleError::Connection(msg) if msg == "refused"));
    }
}
