//! Error types
//!
//! Library-level errors. The binary wraps these in `anyhow`.

use std::net::SocketAddr;
use thiserror::Error;

/// Result alias for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised by the registry and the exposition endpoint
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Two metrics registered under the same full name
    #[error("metric already registered: {0}")]
    DuplicateMetricName(String),

    /// Name does not match `[a-zA-Z_:][a-zA-Z0-9_:]*`
    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),

    /// Exposition endpoint could not bind its listener
    #[error("failed to bind metrics endpoint on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The tree had no such item to remove.
///
/// This is the expected, recoverable outcome of `remove` and is counted
/// rather than propagated by the remove advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("item not present in tree")]
pub struct FailedRemove;

/// Lets the remove advice tell the failed-remove signal apart from
/// errors it must propagate.
pub trait RemoveFailure {
    fn is_failed_remove(&self) -> bool;
}

impl RemoveFailure for FailedRemove {
    fn is_failed_remove(&self) -> bool {
        true
    }
}
