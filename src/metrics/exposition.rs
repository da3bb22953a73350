//! Prometheus text exposition (format 0.0.4)

use std::fmt::Write;

use super::registry::{MetricSample, MetricValue};

/// Content type served alongside [`render`] output
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Render samples, one HELP/TYPE block per metric
pub fn render(samples: &[MetricSample]) -> String {
    let mut out = String::new();
    for sample in samples {
        write_sample(sample, &mut out);
    }
    out
}

/// Render only the metrics named in `names`.
///
/// A summary is selected by its own name or by either of its
/// `_count`/`_sum` series names. An empty filter selects everything.
pub fn render_filtered(samples: &[MetricSample], names: &[String]) -> String {
    if names.is_empty() {
        return render(samples);
    }
    let mut out = String::new();
    for sample in samples.iter().filter(|s| selected(s, names)) {
        write_sample(sample, &mut out);
    }
    out
}

fn selected(sample: &MetricSample, names: &[String]) -> bool {
    names.iter().any(|n| {
        n == &sample.name
            || (matches!(sample.value, MetricValue::Summary { .. })
                && n.strip_prefix(sample.name.as_str())
                    .is_some_and(|suffix| suffix == "_count" || suffix == "_sum"))
    })
}

fn write_sample(sample: &MetricSample, out: &mut String) {
    let name = &sample.name;
    let _ = writeln!(out, "# HELP {} {}", name, escape_help(&sample.help));
    let _ = writeln!(out, "# TYPE {} {}", name, sample.kind().as_str());
    match sample.value {
        MetricValue::Counter(v) => {
            let _ = writeln!(out, "{}{{}} {}", name, v);
        }
        MetricValue::Gauge(v) => {
            let _ = writeln!(out, "{}{{}} {}", name, v);
        }
        MetricValue::Summary { count, sum } => {
            let _ = writeln!(out, "{}_count{{}} {}", name, count);
            let _ = writeln!(out, "{}_sum{{}} {}", name, sum);
        }
    }
}
