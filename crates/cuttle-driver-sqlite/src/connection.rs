//! SQLite connection implementation

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use cuttle_core::{
    ColumnMeta, Connection, CuttleError, QueryResult, Result, Row, StatementResult, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};

/// SQLite connection wrapper
///
/// The underlying handle is dropped on [`close`](Connection::close), after
/// which every operation fails with `ClosedConnection`.
pub struct SqliteConnection {
    conn: Mutex<Option<RusqliteConnection>>,
    path: String,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_busy_timeout(path, None)
    }

    /// Open a SQLite database, waiting up to `busy_timeout` on locked tables
    pub fn open_with_busy_timeout(path: &str, busy_timeout: Option<Duration>) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = expand_path(path)?;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                CuttleError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(CuttleError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                CuttleError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            CuttleError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;

        if path != ":memory:" {
            conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| {
                CuttleError::Connection(format!("Failed to set journal mode: {}", e))
            })?;
        }

        if let Some(timeout) = busy_timeout {
            conn.busy_timeout(timeout).map_err(|e| {
                CuttleError::Connection(format!("Failed to set busy timeout: {}", e))
            })?;
        }

        tracing::debug!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: expanded_path,
        })
    }

    /// Path the database was opened from, after `~` and relative expansion
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute several `;`-separated statements without parameters
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!("executing SQL batch");
        self.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| CuttleError::Query(format!("Failed to execute batch: {}", e)))
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(CuttleError::ClosedConnection),
        }
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let rusqlite_params = values_to_rusqlite(params);
        let rows_affected = self.with_conn(|conn| {
            conn.execute(sql, params_from_iter(rusqlite_params.iter()))
                .map_err(|e| CuttleError::Query(format!("Failed to execute statement: {}", e)))
        })?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult {
            affected_rows: rows_affected as u64,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let rusqlite_params = values_to_rusqlite(params);

        let (columns, rows) = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| CuttleError::Query(format!("Failed to prepare query: {}", e)))?;

            let mut column_names = Vec::with_capacity(stmt.column_count());
            let mut columns = Vec::with_capacity(stmt.column_count());
            for (idx, col) in stmt.columns().iter().enumerate() {
                let name = col.name().to_string();
                column_names.push(name.clone());
                columns.push(ColumnMeta {
                    name,
                    data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
                    ordinal: idx,
                });
            }

            let mut rows = Vec::new();
            let mut query_rows = stmt
                .query(params_from_iter(rusqlite_params.iter()))
                .map_err(|e| CuttleError::Query(format!("Failed to execute query: {}", e)))?;

            while let Some(row) = query_rows
                .next()
                .map_err(|e| CuttleError::Query(format!("Failed to fetch row: {}", e)))?
            {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(rusqlite_to_value(row, i)?);
                }
                rows.push(Row::new(column_names.clone(), values));
            }
            Ok((columns, rows))
        })?;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );
        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    fn in_transaction(&self) -> bool {
        self.conn
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        match conn {
            Some(conn) => {
                tracing::debug!(path = %self.path, "closing SQLite connection");
                conn.close().map_err(|(_, e)| {
                    CuttleError::Connection(format!("Failed to close SQLite connection: {}", e))
                })
            }
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

/// Expand `~/` to the home directory and make relative paths absolute
fn expand_path(path: &str) -> Result<String> {
    if path == ":memory:" || path.starts_with("file:") {
        return Ok(path.to_string());
    }

    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => {
                return Err(CuttleError::Configuration(
                    "Unable to determine HOME directory".into(),
                ));
            }
        }
    } else if path.starts_with('~') {
        return Err(CuttleError::Configuration(
            "User-specific home directories (~user) are not supported".into(),
        ));
    } else {
        PathBuf::from(path)
    };

    let absolute = if expanded.is_relative() {
        std::env::current_dir()?.join(expanded)
    } else {
        expanded
    };
    Ok(absolute.to_string_lossy().to_string())
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int(i) => rusqlite::types::Value::Integer(*i),
        Value::Float(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Json(j) => rusqlite::types::Value::Text(j.to_string()),
    }
}

fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| CuttleError::Query(e.to_string()))?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}
