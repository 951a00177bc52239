//! SQLite connector for the cuttle connection pool
//!
//! ```ignore
//! use cuttle_driver_sqlite::SqliteConnector;
//! use cuttle_pool::PoolOptions;
//!
//! let pool = PoolOptions::new()
//!     .with_argument("path", "/var/lib/app/app.db")
//!     .build(SqliteConnector::new())?;
//! ```

mod connection;
mod connector;

pub use connection::SqliteConnection;
pub use connector::SqliteConnector;
