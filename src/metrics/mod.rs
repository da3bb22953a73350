//! Metrics and observability
//!
//! Registry of counters, gauges and summaries, the metric set declared for
//! the tree, and a Prometheus scrape endpoint.

mod exporter;
mod exposition;
mod registry;
mod tree_metrics;

pub use exporter::{MetricsServer, DEFAULT_PORT};
pub use exposition::{render, render_filtered, CONTENT_TYPE};
pub use registry::*;
pub use tree_metrics::{TreeMetrics, DEFAULT_NAMESPACE};
