//! Advice dispatch
//!
//! Observation logic attached before, after or around the tree and worker
//! operations. Operations are not woven at runtime; each call site wraps
//! the real operation in a closure and hands it to the matching advice
//! method here. Which advice applies to which operation is fixed by
//! [`BINDINGS`].

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::MetricsConfig;
use crate::error::{MetricsResult, RemoveFailure};
use crate::metrics::{MetricsServer, Registry, TreeMetrics};

/// Operations that carry advice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinPoint {
    /// The worker loop is about to start
    StartThread,
    /// One worker loop iteration
    ServerOperation,
    /// `Bst::add`
    TreeAdd,
    /// `Bst::remove`
    TreeRemove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    Before,
    After,
    Around,
}

/// Static advice bindings
pub const BINDINGS: &[(JoinPoint, AdviceKind)] = &[
    (JoinPoint::StartThread, AdviceKind::Before),
    (JoinPoint::ServerOperation, AdviceKind::After),
    (JoinPoint::TreeAdd, AdviceKind::Around),
    (JoinPoint::TreeRemove, AdviceKind::Around),
];

/// Advice kind bound to `point`
pub fn binding(point: JoinPoint) -> Option<AdviceKind> {
    BINDINGS
        .iter()
        .find(|(p, _)| *p == point)
        .map(|(_, kind)| *kind)
}

/// Exposition endpoint lifecycle. Only `NotStarted` allows a bind attempt.
#[derive(Debug, Clone, Copy)]
enum ServerSlot {
    NotStarted,
    Running(MetricsServer),
    Failed,
}

/// Runs advice against the declared metric set
pub struct Dispatcher {
    registry: Arc<Registry>,
    metrics: TreeMetrics,
    config: MetricsConfig,
    server: Mutex<ServerSlot>,
}

impl Dispatcher {
    /// Create a registry for `config.namespace`, declare every metric on it
    /// and build a dispatcher around it
    pub fn new(config: MetricsConfig) -> MetricsResult<Arc<Self>> {
        let registry = Arc::new(Registry::new(config.namespace.as_str())?);
        Self::with_registry(registry, config)
    }

    /// Declare the tree metrics on an existing registry
    pub fn with_registry(registry: Arc<Registry>, config: MetricsConfig) -> MetricsResult<Arc<Self>> {
        let metrics = TreeMetrics::register(&registry)?;
        Ok(Arc::new(Self {
            registry,
            metrics,
            config,
            server: Mutex::new(ServerSlot::NotStarted),
        }))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &TreeMetrics {
        &self.metrics
    }

    /// Address of the exposition endpoint, if it is running
    pub fn server_addr(&self) -> Option<SocketAddr> {
        match *self.server.lock() {
            ServerSlot::Running(server) => Some(server.local_addr()),
            ServerSlot::NotStarted | ServerSlot::Failed => None,
        }
    }

    /// Before the worker loop starts: bring up the exposition endpoint.
    ///
    /// Never fails. A bind error is logged and the loop runs without a
    /// scrape endpoint. Only the first call per dispatcher binds: later
    /// calls reuse the running server, or return `None` after a failure.
    pub fn before_start_thread(&self) -> Option<SocketAddr> {
        if !self.config.enabled {
            info!("Metrics endpoint disabled");
            return None;
        }

        let mut server = self.server.lock();
        match *server {
            ServerSlot::Running(running) => return Some(running.local_addr()),
            ServerSlot::Failed => return None,
            ServerSlot::NotStarted => {}
        }

        match MetricsServer::start(self.config.bind_addr, self.registry.clone()) {
            Ok(started) => {
                info!(addr = %started.local_addr(), "Prometheus exporter running");
                *server = ServerSlot::Running(started);
                Some(started.local_addr())
            }
            Err(e) => {
                error!(
                    error = %e,
                    reason = ?std::error::Error::source(&e),
                    "Prometheus exporter was unable to start"
                );
                *server = ServerSlot::Failed;
                None
            }
        }
    }

    /// After each worker iteration: count it.
    ///
    /// The count is taken even when the iteration unwinds.
    pub fn after_server_operation<R>(&self, proceed: impl FnOnce() -> R) -> R {
        struct CountOnDrop<'a>(&'a TreeMetrics);
        impl Drop for CountOnDrop<'_> {
            fn drop(&mut self) {
                self.0.iterations.inc();
            }
        }

        let _guard = CountOnDrop(&self.metrics);
        proceed()
    }

    /// Around `add`: time every attempt, then count the node or the
    /// rejected duplicate. Returns the operation's own result.
    pub fn around_add(&self, proceed: impl FnOnce() -> bool) -> bool {
        let timer = self.metrics.time_to_add.start_timer();
        let inserted = proceed();
        timer.observe_duration();

        if inserted {
            self.metrics.nodes.inc();
        } else {
            self.metrics.failed_adds.inc();
        }
        inserted
    }

    /// Around `remove`: a removed item decrements the node gauge and is
    /// returned as `Some`. The failed-remove signal is counted and
    /// swallowed (`None`). Any other error is passed through untouched.
    pub fn around_remove<T, E>(&self, proceed: impl FnOnce() -> Result<T, E>) -> Result<Option<T>, E>
    where
        E: RemoveFailure,
    {
        match proceed() {
            Ok(item) => {
                self.metrics.nodes.dec();
                Ok(Some(item))
            }
            Err(e) if e.is_failed_remove() => {
                self.metrics.failed_removes.inc();
                Ok(None)
            }
            Err(e) => {
                warn!("Remove failed with an error the advice does not handle");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailedRemove;
    use std::panic::{self, AssertUnwindSafe};

    fn dispatcher() -> Arc<Dispatcher> {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        Dispatcher::new(config).unwrap()
    }

    #[derive(Debug, PartialEq)]
    enum StoreError {
        Missing,
        Corrupted,
    }

    impl RemoveFailure for StoreError {
        fn is_failed_remove(&self) -> bool {
            matches!(self, StoreError::Missing)
        }
    }

    #[test]
    fn test_every_join_point_bound() {
        assert_eq!(binding(JoinPoint::StartThread), Some(AdviceKind::Before));
        assert_eq!(binding(JoinPoint::ServerOperation), Some(AdviceKind::After));
        assert_eq!(binding(JoinPoint::TreeAdd), Some(AdviceKind::Around));
        assert_eq!(binding(JoinPoint::TreeRemove), Some(AdviceKind::Around));
    }

    #[test]
    fn test_add_outcomes() {
        let d = dispatcher();
        assert!(d.around_add(|| true));
        assert!(!d.around_add(|| false));

        let m = d.metrics();
        assert_eq!(m.nodes.get(), 1);
        assert_eq!(m.failed_adds.get(), 1);
        assert_eq!(m.time_to_add.get().0, 2);
    }

    #[test]
    fn test_add_timer_survives_unwind() {
        let d = dispatcher();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            d.around_add(|| panic!("tree walk blew up"))
        }));
        assert!(result.is_err());

        let m = d.metrics();
        assert_eq!(m.time_to_add.get().0, 1);
        assert_eq!(m.nodes.get(), 0);
        assert_eq!(m.failed_adds.get(), 0);
    }

    #[test]
    fn test_remove_outcomes() {
        let d = dispatcher();
        assert_eq!(d.around_remove(|| Ok::<_, FailedRemove>(7)), Ok(Some(7)));
        assert_eq!(d.around_remove(|| Err::<i32, _>(FailedRemove)), Ok(None));

        let m = d.metrics();
        assert_eq!(m.nodes.get(), -1);
        assert_eq!(m.failed_removes.get(), 1);
    }

    #[test]
    fn test_remove_passes_unknown_errors() {
        let d = dispatcher();
        assert_eq!(d.around_remove(|| Err::<u8, _>(StoreError::Corrupted)), Err(StoreError::Corrupted));
        assert_eq!(d.around_remove(|| Err::<u8, _>(StoreError::Missing)), Ok(None));

        let m = d.metrics();
        assert_eq!(m.failed_removes.get(), 1);
        assert_eq!(m.nodes.get(), 0);
    }

    #[test]
    fn test_iteration_counted_regardless_of_result() {
        let d = dispatcher();
        assert_eq!(d.after_server_operation(|| 1), 1);
        d.after_server_operation(|| ());
        let _ = panic::catch_unwind(AssertUnwindSafe(|| d.after_server_operation(|| panic!("boom"))));
        assert_eq!(d.metrics().iterations.get(), 3);
    }

    #[test]
    fn test_start_disabled_is_noop() {
        let d = dispatcher();
        assert_eq!(d.before_start_thread(), None);
        assert_eq!(d.server_addr(), None);
    }

    #[test]
    fn test_start_is_idempotent() {
        let config = MetricsConfig {
            enabled: true,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..MetricsConfig::default()
        };
        let d = Dispatcher::new(config).unwrap();
        let first = d.before_start_thread().unwrap();
        assert_eq!(d.before_start_thread(), Some(first));
    }

    #[test]
    fn test_bind_failure_is_not_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = MetricsConfig {
            enabled: true,
            bind_addr: taken.local_addr().unwrap(),
            ..MetricsConfig::default()
        };
        let d = Dispatcher::new(config).unwrap();
        assert_eq!(d.before_start_thread(), None);
        assert!(d.after_server_operation(|| d.around_add(|| true)));
        assert_eq!(d.metrics().iterations.get(), 1);
    }

    #[test]
    fn test_failed_start_is_not_retried() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = MetricsConfig {
            enabled: true,
            bind_addr: taken.local_addr().unwrap(),
            ..MetricsConfig::default()
        };
        let d = Dispatcher::new(config).unwrap();
        assert_eq!(d.before_start_thread(), None);

        // the port is free now, but the endpoint stays down
        drop(taken);
        assert_eq!(d.before_start_thread(), None);
        assert_eq!(d.before_start_thread(), None);
        assert_eq!(d.server_addr(), None);
    }
}
