//! Metric registry
//!
//! Named counters, gauges and summaries behind cheap cloneable handles.
//! Counters and gauges are lock-free atomics; a summary keeps its count and
//! sum under its own mutex so a reader always sees a matching pair.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{MetricsError, MetricsResult};

/// Metric type as written on the `# TYPE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
        }
    }
}

/// Point-in-time value of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    /// `sum` is in seconds
    Summary { count: u64, sum: f64 },
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Summary { .. } => MetricKind::Summary,
        }
    }
}

/// One entry of a registry snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Full name including the namespace prefix
    pub name: String,
    pub help: String,
    pub value: MetricValue,
}

impl MetricSample {
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Monotonic counter handle
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Up/down gauge handle
#[derive(Debug, Clone, Default)]
pub struct Gauge(Arc<AtomicI64>);

impl Gauge {
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct SummaryState {
    count: u64,
    sum: f64,
}

/// Duration summary handle (count + sum)
#[derive(Debug, Clone, Default)]
pub struct Summary(Arc<Mutex<SummaryState>>);

impl Summary {
    pub fn observe(&self, duration: Duration) {
        let mut state = self.0.lock();
        state.count += 1;
        state.sum += duration.as_secs_f64();
    }

    /// Start timing. The elapsed time is recorded exactly once, either by
    /// [`SummaryTimer::observe_duration`] or when the timer is dropped.
    pub fn start_timer(&self) -> SummaryTimer {
        SummaryTimer {
            summary: self.clone(),
            start: Instant::now(),
            observed: false,
        }
    }

    /// Returns `(count, sum_seconds)`
    pub fn get(&self) -> (u64, f64) {
        let state = self.0.lock();
        (state.count, state.sum)
    }
}

/// Guard returned by [`Summary::start_timer`].
///
/// Dropping it without calling `observe_duration` still records, so a
/// timed operation that unwinds is measured too.
#[must_use = "dropping the timer records immediately"]
pub struct SummaryTimer {
    summary: Summary,
    start: Instant,
    observed: bool,
}

impl SummaryTimer {
    /// Stop the timer and record the elapsed time
    pub fn observe_duration(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.observed {
            self.observed = true;
            self.summary.observe(elapsed);
        }
        elapsed
    }
}

impl Drop for SummaryTimer {
    fn drop(&mut self) {
        self.record();
    }
}

#[derive(Debug, Clone)]
enum Handle {
    Counter(Counter),
    Gauge(Gauge),
    Summary(Summary),
}

impl Handle {
    fn value(&self) -> MetricValue {
        match self {
            Handle::Counter(c) => MetricValue::Counter(c.get()),
            Handle::Gauge(g) => MetricValue::Gauge(g.get()),
            Handle::Summary(s) => {
                let (count, sum) = s.get();
                MetricValue::Summary { count, sum }
            }
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Handle::Counter(_) => MetricKind::Counter,
            Handle::Gauge(_) => MetricKind::Gauge,
            Handle::Summary(_) => MetricKind::Summary,
        }
    }
}

#[derive(Debug)]
struct Entry {
    name: String,
    help: String,
    handle: Handle,
}

/// Names of the time series a metric writes. A summary also owns
/// `<name>_count` and `<name>_sum`, which must not clash with other metrics.
fn series_names(name: &str, kind: MetricKind) -> Vec<String> {
    match kind {
        MetricKind::Summary => vec![
            name.to_string(),
            format!("{name}_count"),
            format!("{name}_sum"),
        ],
        _ => vec![name.to_string()],
    }
}

fn clashes(entries: &[Entry], name: &str, kind: MetricKind) -> bool {
    let new_series = series_names(name, kind);
    entries.iter().any(|entry| {
        series_names(&entry.name, entry.handle.kind())
            .iter()
            .any(|existing| new_series.contains(existing))
    })
}

/// Check a name against the Prometheus grammar `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Holds every declared metric for the life of the process
#[derive(Debug)]
pub struct Registry {
    namespace: String,
    entries: RwLock<Vec<Entry>>,
}

impl Registry {
    /// Create an empty registry. An empty namespace means no prefix.
    pub fn new(namespace: impl Into<String>) -> MetricsResult<Self> {
        let namespace = namespace.into();
        if !namespace.is_empty() && !is_valid_name(&namespace) {
            return Err(MetricsError::InvalidMetricName(namespace));
        }
        Ok(Self {
            namespace,
            entries: RwLock::new(Vec::new()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn register_counter(&self, name: &str, help: &str) -> MetricsResult<Counter> {
        let counter = Counter::default();
        self.register(name, help, Handle::Counter(counter.clone()))?;
        Ok(counter)
    }

    pub fn register_gauge(&self, name: &str, help: &str) -> MetricsResult<Gauge> {
        let gauge = Gauge::default();
        self.register(name, help, Handle::Gauge(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn register_summary(&self, name: &str, help: &str) -> MetricsResult<Summary> {
        let summary = Summary::default();
        self.register(name, help, Handle::Summary(summary.clone()))?;
        Ok(summary)
    }

    fn register(&self, name: &str, help: &str, handle: Handle) -> MetricsResult<()> {
        if !is_valid_name(name) {
            return Err(MetricsError::InvalidMetricName(name.to_string()));
        }
        let full_name = if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        };

        let mut entries = self.entries.write();
        if clashes(&entries, &full_name, handle.kind()) {
            return Err(MetricsError::DuplicateMetricName(full_name));
        }

        entries.push(Entry {
            name: full_name,
            help: help.to_string(),
            handle,
        });
        Ok(())
    }

    /// Move every metric of `other` into this registry, all or nothing.
    ///
    /// Lets a group of metrics be declared on a scratch registry first so a
    /// clash leaves the target untouched.
    pub fn merge(&self, other: Registry) -> MetricsResult<()> {
        let incoming = other.entries.into_inner();
        let mut entries = self.entries.write();
        if let Some(clash) = incoming
            .iter()
            .find(|e| clashes(&entries, &e.name, e.handle.kind()))
        {
            return Err(MetricsError::DuplicateMetricName(clash.name.clone()));
        }
        entries.extend(incoming);
        Ok(())
    }

    /// Current value of every metric, in registration order.
    ///
    /// Each value is read atomically on its own; the snapshot as a whole
    /// is not a single instant across metrics.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let entries: Vec<(String, String, Handle)> = self
            .entries
            .read()
            .iter()
            .map(|e| (e.name.clone(), e.help.clone(), e.handle.clone()))
            .collect();

        entries
            .into_iter()
            .map(|(name, help, handle)| MetricSample {
                name,
                help,
                value: handle.value(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
