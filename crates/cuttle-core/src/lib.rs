//! Cuttle Core - Shared abstractions for the cuttle connection pool
//!
//! This crate provides the fundamental traits and types that all other
//! cuttle crates depend on. It defines:
//!
//! - `Connection` - Trait for raw, driver-specific database connections
//! - `Connector` - Trait for opening new connections from arguments
//! - `ConnectionArguments` - Driver arguments forwarded verbatim on connect
//! - Common types like `Value`, `Row`, `QueryResult`, etc.

mod arguments;
mod connection;
mod error;
mod types;

pub use arguments::*;
pub use connection::*;
pub use error::*;
pub use types::*;
