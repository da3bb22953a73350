//! The metrics declared for the tree and its worker loop

use super::registry::{Counter, Gauge, Registry, Summary};
use crate::error::MetricsResult;

/// Default namespace prefix for every declared metric
pub const DEFAULT_NAMESPACE: &str = "java";

/// Handles to the five declared metrics
#[derive(Debug, Clone)]
pub struct TreeMetrics {
    pub iterations: Counter,
    pub failed_adds: Counter,
    pub failed_removes: Counter,
    pub nodes: Gauge,
    pub time_to_add: Summary,
}

impl TreeMetrics {
    /// Register all metrics on `registry`, all or nothing. Call once per
    /// registry.
    pub fn register(registry: &Registry) -> MetricsResult<Self> {
        let scratch = Registry::new(registry.namespace())?;
        let metrics = Self::declare(&scratch)?;
        registry.merge(scratch)?;
        Ok(metrics)
    }

    fn declare(registry: &Registry) -> MetricsResult<Self> {
        Ok(Self {
            iterations: registry.register_counter(
                "number_of_iterations",
                "Counts the number of attempted inserts and removes",
            )?,
            failed_adds: registry
                .register_counter("number_of_failed_adds", "Counts the number of failed adds")?,
            failed_removes: registry.register_counter(
                "number_of_failed_removes",
                "Counts the number of failed removes",
            )?,
            nodes: registry.register_gauge("number_of_nodes", "Counts Num Nodes")?,
            time_to_add: registry.register_summary("time_to_add", "returns add time")?,
        })
    }
}
