//! Cuttle Scope - Application-scoped connection pools
//!
//! A [`ScopedPool`] keeps one [`ConnectionPool`](cuttle_pool::ConnectionPool)
//! per registered [`App`], built from shared pool options overlaid with the
//! app's `CUTTLEPOOL_*` configuration. An [`AppScope`] caches at most one
//! connection for the duration of a unit of work and hands it back when
//! the scope is torn down.

mod app;
mod scope;
mod scoped;

pub use app::{App, AppConfig, AppId, CONFIG_PREFIX};
pub use scope::AppScope;
pub use scoped::ScopedPool;
