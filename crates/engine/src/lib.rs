//! Composition runtime for Quilt
//!
//! This crate turns dispatch models into live objects:
//! - Dispatcher: creates composites, casts existing objects
//! - Composite: handle routing calls through per-method chains
//! - FragmentPool: shares stateless fragment instances
//! - RuntimeConfig: settings loaded from `quilt.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
pub mod config;
pub mod dispatcher;
pub mod instance;
pub mod pool;

pub use config::{RuntimeConfig, CONFIG_FILE_NAME};
pub use dispatcher::Dispatcher;
pub use instance::{Composite, Wrapped};
pub use pool::{FragmentPool, PoolMetrics};
