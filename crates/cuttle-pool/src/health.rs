//! Health checks for pooled connections
//!
//! The pool pings every connection it takes out of the idle store and
//! every connection handed back to it. Unless a custom ping is supplied,
//! the check is a minimal round-trip query.
//!
//! # Example
//!
//! ```ignore
//! use cuttle_pool::health::{is_alive, ping_connection};
//!
//! let latency = ping_connection(&*conn).await?;
//! assert!(is_alive(&*conn).await);
//! ```

mod ping;

#[cfg(test)]
mod tests;

pub use ping::{PingError, PingResult, is_alive, ping_connection};
