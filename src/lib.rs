//! Treewatch - Prometheus instrumentation for a binary search tree
//!
//! Observes tree insertions/removals and a background worker loop through
//! before/after/around advice, aggregates the results in a metric registry
//! and serves them on a pull-based scrape endpoint.

pub mod advice;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tree;
pub mod util;
pub mod worker;

pub use advice::Dispatcher;
pub use config::Config;
pub use error::{FailedRemove, MetricsError};
pub use tree::{Bst, InstrumentedTree};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
