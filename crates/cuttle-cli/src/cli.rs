//! `cuttle` - run a statement through an application-scoped SQLite pool
//!
//! ```text
//! cuttle --config app.toml --sql "SELECT name FROM bakers" --scopes 8
//! ```
//!
//! Every scope runs the statement on its own pooled connection at the same
//! time, so with more scopes than `capacity + overflow` some of them queue.
//! The first scope's rows and the final pool statistics are printed as JSON.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cuttle_core::{CuttleError, QueryResult, Value};
use cuttle_driver_sqlite::SqliteConnector;
use cuttle_pool::{PoolConfig, PoolOptions, PoolStats, rollback_open_transaction};
use cuttle_scope::{App, AppConfig, ScopedPool};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::logging::LoggingConfig;

#[derive(Debug, Parser)]
#[command(name = "cuttle", version, about = "Exercise a cuttle connection pool against SQLite")]
struct Cli {
    /// Application config (TOML); `CUTTLEPOOL_*` keys configure the pool
    #[arg(short, long, env = "CUTTLE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, used unless the config sets `CUTTLEPOOL_PATH`
    #[arg(short, long, env = "CUTTLE_DATABASE", default_value = ":memory:")]
    database: String,

    /// Statement to run in every scope
    #[arg(long, default_value = "SELECT 1")]
    sql: String,

    /// Number of concurrent scopes
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
    scopes: u32,

    /// Idle capacity of the pool
    #[arg(long, default_value_t = PoolConfig::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Extra connections allowed beyond capacity
    #[arg(long, default_value_t = PoolConfig::DEFAULT_OVERFLOW)]
    overflow: usize,

    /// Seconds to wait for a connection (waits forever when omitted)
    #[arg(long)]
    timeout: Option<f64>,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    /// Trace pool bookkeeping
    #[arg(short, long)]
    verbose: bool,
}

/// What a run prints on stdout
#[derive(Debug, Serialize)]
struct Report {
    scopes: u32,
    rows: Vec<std::collections::HashMap<String, Value>>,
    affected_rows: u64,
    stats: PoolStats,
}

impl Cli {
    fn pool_options(&self) -> anyhow::Result<PoolOptions> {
        let mut options = PoolOptions::new()
            .with_capacity(self.capacity)
            .with_overflow(self.overflow)
            .with_argument("path", self.database.as_str())
            .with_normalize(rollback_open_transaction);

        if let Some(secs) = self.timeout {
            let timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid --timeout {}", secs))?;
            options = options.with_timeout(timeout);
        }
        Ok(options)
    }

    fn app_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => Ok(AppConfig::new()),
        }
    }
}

/// Whether a statement produces rows and has to go through `query`
fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "PRAGMA" | "VALUES" | "EXPLAIN"
    ) || sql.to_ascii_uppercase().contains(" RETURNING ")
}

enum Outcome {
    Rows(QueryResult),
    Affected(u64),
}

async fn run(cli: &Cli) -> anyhow::Result<Report> {
    let app = App::new("cuttle", cli.app_config()?);
    let scoped = Arc::new(
        ScopedPool::new(SqliteConnector::new(), cli.pool_options()?).with_app(Arc::clone(&app)),
    );
    let pool = scoped.pool(&app).context("failed to build pool")?;
    tracing::info!(
        capacity = pool.config().capacity(),
        overflow = pool.config().overflow(),
        scopes = cli.scopes,
        "running statement"
    );

    let mut tasks = JoinSet::new();
    for index in 0..cli.scopes {
        let scoped = Arc::clone(&scoped);
        let sql = cli.sql.clone();
        tasks.spawn(async move {
            let outcome = scoped
                .with_scope(None, move |scope| {
                    Box::pin(async move {
                        if returns_rows(&sql) {
                            Ok::<_, CuttleError>(Outcome::Rows(scope.query(&sql, &[]).await?))
                        } else {
                            let result = scope.execute(&sql, &[]).await?;
                            Ok(Outcome::Affected(result.affected_rows))
                        }
                    })
                })
                .await;
            (index, outcome)
        });
    }

    let mut rows = None;
    let mut affected_rows = 0;
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.context("scope task panicked")?;
        match outcome.with_context(|| format!("scope {} failed", index))? {
            Outcome::Rows(result) => {
                tracing::debug!(scope = index, rows = result.row_count(), "scope finished");
                if index == 0 {
                    rows = Some(result.rows.iter().map(|row| row.to_map()).collect());
                }
            }
            Outcome::Affected(count) => {
                tracing::debug!(scope = index, affected_rows = count, "scope finished");
                affected_rows += count;
            }
        }
    }

    let stats = pool.stats();
    scoped.shutdown().await;

    Ok(Report {
        scopes: cli.scopes,
        rows: rows.unwrap_or_default(),
        affected_rows,
        stats,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    logging::init(&logging.with_json(cli.json_logs))?;

    let report = run(&cli).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cuttle").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.database, ":memory:");
        assert_eq!(cli.sql, "SELECT 1");
        assert_eq!(cli.scopes, 4);
        assert_eq!(cli.capacity, 5);
        assert_eq!(cli.overflow, 1);
        assert!(cli.timeout.is_none());

        let options = cli.pool_options().unwrap();
        assert_eq!(options.config().timeout(), None);
        assert!(options.hooks().has_custom_normalize());
        assert_eq!(
            options.arguments().get_string("path").as_deref(),
            Some(":memory:")
        );
    }

    #[test]
    fn test_rejects_zero_scopes() {
        assert!(Cli::try_parse_from(["cuttle", "--scopes", "0"]).is_err());
    }

    #[test]
    fn test_timeout_option() {
        let cli = parse(&["--timeout", "0.25"]);
        let options = cli.pool_options().unwrap();
        assert_eq!(options.config().timeout(), Some(Duration::from_millis(250)));

        let cli = parse(&["--timeout=-1"]);
        assert!(cli.pool_options().is_err());
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  with t as (select 1) select * from t"));
        assert!(returns_rows("INSERT INTO t VALUES (1) RETURNING id"));
        assert!(!returns_rows("UPDATE bakers SET score = 10"));
        assert!(!returns_rows(""));
    }

    #[tokio::test]
    async fn test_run_against_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("bakery.db");
        let config = dir.path().join("app.toml");
        std::fs::write(
            &config,
            format!(
                "CUTTLEPOOL_PATH = {:?}\nCUTTLEPOOL_CAPACITY = 2\nCUTTLEPOOL_OVERFLOW = 0\nCUTTLEPOOL_BUSY_TIMEOUT_MS = 5000\n",
                db.to_string_lossy()
            ),
        )
        .unwrap();

        let setup = parse(&[
            "--config",
            &config.to_string_lossy(),
            "--scopes",
            "1",
            "--sql",
            "CREATE TABLE bakers (name TEXT)",
        ]);
        run(&setup).await.unwrap();

        let insert = parse(&[
            "--config",
            &config.to_string_lossy(),
            "--scopes",
            "3",
            "--sql",
            "INSERT INTO bakers VALUES ('paul')",
        ]);
        let report = run(&insert).await.unwrap();
        assert_eq!(report.affected_rows, 3);

        let select = parse(&[
            "--config",
            &config.to_string_lossy(),
            "--scopes",
            "5",
            "--sql",
            "SELECT COUNT(*) AS n FROM bakers",
        ]);
        let report = run(&select).await.unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].get("n"), Some(&Value::Int(3)));
        assert_eq!(report.stats.checked_out(), 0);
        assert_eq!(report.stats.capacity(), 2);
        assert!(report.stats.idle() <= 2);
    }
}
