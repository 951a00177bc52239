/// Integration tests for the SQLite connector
use cuttle_core::{Connection, ConnectionArguments, Connector, Value};
use cuttle_driver_sqlite::{SqliteConnection, SqliteConnector};
use cuttle_pool::{PoolConfig, PoolOptions, rollback_open_transaction};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Helper to create a database file with a small schema
async fn setup_test_database() -> (TempDir, String) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir
        .path()
        .join("cuttle_test.db")
        .to_string_lossy()
        .to_string();

    let conn = SqliteConnection::open(&db_path).expect("Failed to create test database");
    conn.execute_batch(
        r#"CREATE TABLE bakers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            signature TEXT,
            score REAL DEFAULT 0.0
        );
        INSERT INTO bakers (name, signature, score) VALUES ('paul', 'bread', 9.5);"#,
    )
    .await
    .expect("Failed to setup schema");
    conn.close().await.expect("Failed to close setup connection");

    (temp_dir, db_path)
}

#[tokio::test]
async fn test_sqlite_query_and_execute() {
    let (_dir, path) = setup_test_database().await;
    let conn = SqliteConnection::open(&path).expect("open");

    let result = conn
        .execute(
            "INSERT INTO bakers (name, signature) VALUES (?, ?)",
            &[Value::from("prue"), Value::Null],
        )
        .await
        .expect("insert");
    assert_eq!(result.affected_rows, 1);

    let result = conn
        .query(
            "SELECT id, name, signature, score FROM bakers ORDER BY id",
            &[],
        )
        .await
        .expect("select");
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.columns[1].name, "name");
    assert_eq!(result.columns[1].data_type, "TEXT");
    assert_eq!(result.columns[3].ordinal, 3);

    let paul = &result.rows[0];
    assert_eq!(paul.get_by_name("name"), Some(&Value::Text("paul".into())));
    assert_eq!(paul.get_by_name("score"), Some(&Value::Float(9.5)));
    let prue = &result.rows[1];
    assert_eq!(prue.get_by_name("signature"), Some(&Value::Null));
    assert_eq!(prue.get_by_name("id"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_sqlite_query_error() {
    let conn = SqliteConnection::open(":memory:").expect("open");
    let err = conn.query("SELECT * FROM missing", &[]).await.unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_sqlite_close() {
    let conn = SqliteConnection::open(":memory:").expect("open");
    assert!(!conn.is_closed());

    conn.close().await.expect("close");
    assert!(conn.is_closed());
    assert!(conn.query("SELECT 1", &[]).await.unwrap_err().is_closed_connection());

    // Closing twice is harmless.
    conn.close().await.expect("close again");
}

#[tokio::test]
async fn test_sqlite_in_transaction() {
    let conn = SqliteConnection::open(":memory:").expect("open");
    assert!(!conn.in_transaction());

    conn.execute("BEGIN", &[]).await.expect("begin");
    assert!(conn.in_transaction());

    conn.execute("ROLLBACK", &[]).await.expect("rollback");
    assert!(!conn.in_transaction());
}

#[tokio::test]
async fn test_sqlite_missing_parent_directory() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nope").join("db.sqlite");
    let err = SqliteConnection::open(&path.to_string_lossy())
        .err()
        .expect("open should fail");
    assert!(err.to_string().contains("Parent directory does not exist"));
}

#[test]
fn test_connector_check_arguments() {
    let connector = SqliteConnector::new();

    let err = connector
        .check_arguments(&ConnectionArguments::new())
        .unwrap_err();
    assert!(err.is_configuration());

    assert!(
        connector
            .check_arguments(&ConnectionArguments::new().with("database", ":memory:"))
            .is_ok()
    );

    let args = ConnectionArguments::new()
        .with("path", ":memory:")
        .with("busy_timeout_ms", "soon");
    assert!(connector.check_arguments(&args).unwrap_err().is_configuration());
}

#[tokio::test]
async fn test_connector_connect() {
    let (_dir, path) = setup_test_database().await;
    let args = ConnectionArguments::new()
        .with("path", path.as_str())
        .with("busy_timeout_ms", 250);

    let conn = SqliteConnector::new().connect(&args).await.expect("connect");
    assert_eq!(conn.driver_name(), "sqlite");
    let result = conn.query("SELECT name FROM bakers", &[]).await.expect("query");
    assert_eq!(result.row_count(), 1);
}

#[tokio::test]
async fn test_pool_over_sqlite() {
    let (_dir, path) = setup_test_database().await;
    let pool = PoolOptions::new()
        .with_config(PoolConfig::new(2, 0))
        .with_argument("path", path.as_str())
        .with_normalize(rollback_open_transaction)
        .build(SqliteConnector::new())
        .expect("pool");

    let mut conn = pool.acquire().await.expect("acquire");
    conn.execute("BEGIN", &[]).await.expect("begin");
    conn.execute("DELETE FROM bakers", &[]).await.expect("delete");
    conn.release().await;

    // The abandoned transaction is rolled back before the next checkout.
    let conn = pool.acquire().await.expect("acquire again");
    assert!(!conn.connection().expect("open").in_transaction());
    let result = conn
        .query("SELECT COUNT(*) AS n FROM bakers", &[])
        .await
        .expect("count");
    assert_eq!(result.rows[0].get(0), Some(&Value::Int(1)));
    assert_eq!(pool.stats().checked_out(), 1);
}

#[test]
fn test_pool_rejects_missing_path() {
    let err = PoolOptions::new()
        .build(SqliteConnector::new())
        .unwrap_err();
    assert!(err.is_configuration());
}
