//! Instrumented tree integration tests

use std::sync::Arc;
use std::thread;

use treewatch::config::MetricsConfig;
use treewatch::metrics::{MetricValue, Registry};
use treewatch::{Dispatcher, InstrumentedTree, MetricsError};

fn disabled() -> MetricsConfig {
    MetricsConfig {
        enabled: false,
        ..MetricsConfig::default()
    }
}

fn value_of(registry: &Registry, name: &str) -> MetricValue {
    registry
        .snapshot()
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.value)
        .unwrap_or_else(|| panic!("metric {name} not registered"))
}

/// add(5) -> true, add(5) -> false, remove(5) -> ok
#[test]
fn test_add_duplicate_remove_scenario() {
    let dispatcher = Dispatcher::new(disabled()).unwrap();
    let tree = InstrumentedTree::new(dispatcher.clone());
    let registry = dispatcher.registry();

    assert!(tree.add(5));
    assert!(!tree.add(5));
    assert_eq!(tree.remove(&5), Some(5));

    assert_eq!(value_of(registry, "java_number_of_nodes"), MetricValue::Gauge(0));
    assert_eq!(value_of(registry, "java_number_of_failed_adds"), MetricValue::Counter(1));
    assert_eq!(value_of(registry, "java_number_of_failed_removes"), MetricValue::Counter(0));
    match value_of(registry, "java_time_to_add") {
        MetricValue::Summary { count, sum } => {
            assert_eq!(count, 2);
            assert!(sum >= 0.0);
        }
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn test_successful_adds_only() {
    let dispatcher = Dispatcher::new(disabled()).unwrap();
    let tree = InstrumentedTree::new(dispatcher.clone());

    for n in [8u32, 3, 10, 1, 6, 14, 4, 7, 13] {
        assert!(tree.add(n));
    }

    let m = dispatcher.metrics();
    assert_eq!(m.nodes.get(), 9);
    assert_eq!(m.failed_adds.get(), 0);
    assert_eq!(tree.to_vec(), [1, 3, 4, 6, 7, 8, 10, 13, 14]);
}

#[test]
fn test_failed_remove_leaves_gauge() {
    let dispatcher = Dispatcher::new(disabled()).unwrap();
    let tree = InstrumentedTree::new(dispatcher.clone());
    tree.add(1u32);
    tree.add(2);

    assert_eq!(tree.remove(&9), None);
    assert_eq!(tree.remove(&9), None);

    let m = dispatcher.metrics();
    assert_eq!(m.failed_removes.get(), 2);
    assert_eq!(m.nodes.get(), 2);
    assert!(tree.contains(&1));
}

#[test]
fn test_concurrent_callers() {
    let dispatcher = Dispatcher::new(disabled()).unwrap();
    let tree = Arc::new(InstrumentedTree::new(dispatcher.clone()));

    // every thread adds the same 100 keys; only one insert per key wins
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tree = tree.clone();
            thread::spawn(move || {
                for key in 0..100u32 {
                    tree.add(key);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let m = dispatcher.metrics();
    assert_eq!(m.nodes.get(), 100);
    assert_eq!(m.failed_adds.get(), 300);
    assert_eq!(m.time_to_add.get().0, 400);
}

#[test]
fn test_duplicate_registration_is_fatal_and_clean() {
    let registry = Arc::new(Registry::new("java").unwrap());
    registry.register_counter("number_of_failed_adds", "taken").unwrap();

    let err = Dispatcher::with_registry(registry.clone(), disabled())
        .err()
        .expect("registration should fail");
    assert!(matches!(err, MetricsError::DuplicateMetricName(ref n) if n == "java_number_of_failed_adds"));

    // none of the declared metrics were added
    let names: Vec<_> = registry.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["java_number_of_failed_adds"]);
}

#[test]
fn test_custom_namespace() {
    let config = MetricsConfig {
        namespace: "bst".to_string(),
        ..disabled()
    };
    let dispatcher = Dispatcher::new(config).unwrap();
    assert!(dispatcher
        .registry()
        .snapshot()
        .iter()
        .all(|s| s.name.starts_with("bst_")));
}
