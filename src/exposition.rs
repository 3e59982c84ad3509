//! Prometheus text exposition format (version 0.0.4).
//!
//! [`TextFormatter`] is a reusable string builder: load help/type headers,
//! samples, whole metrics or whole collector sets into it, then
//! [`dump`](TextFormatter::dump) the accumulated text, which also resets the
//! buffer for the next scrape.
//!
//! # Output
//!
//! For every metric, in registration order:
//!
//! ```text
//! # HELP http_requests_total Total HTTP requests.
//! # TYPE http_requests_total counter
//! http_requests_total{method="GET"} 1027
//! http_requests_total{method="POST"} 3
//!
//! ```
//!
//! Samples are written in the order their label sets were first seen.
//! Histogram samples are written bucket by bucket, then `+Inf`, `_count` and
//! `_sum`. Label values are substituted literally (no escaping).
//!
//! # Number formatting
//!
//! Values use the shortest decimal that parses back to the same `f64`, so
//! nothing is rounded: `2.0` renders as `2`, `0.1` as `0.1`. Magnitudes at or
//! above `1e16` or below `1e-5` use exponent notation, and non-finite values
//! render as `NaN`, `+Inf` and `-Inf`.

use std::sync::Arc;

use crate::collector::Collector;
use crate::error::Result;
use crate::map::ConcurrentMap;
use crate::metric::{Metric, MetricSample};
use crate::sample::{MetricKind, Sample};

/// Content type a transport must send alongside [`bridge`](crate::registry::Registry::bridge) output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Renders a histogram bucket bound for the `le` label.
///
/// Uses the shortest round-trip representation and appends `.0` when it has
/// no decimal point, so `5.0` renders as `"5.0"` and `0.25` as `"0.25"`.
///
/// ```rust
/// use metrica::exposition::format_bound;
///
/// assert_eq!(format_bound(5.0), "5.0");
/// assert_eq!(format_bound(0.005), "0.005");
/// assert_eq!(format_bound(2.5), "2.5");
/// ```
pub fn format_bound(bound: f64) -> String {
    if bound.is_infinite() {
        return if bound > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if bound.is_nan() {
        return "NaN".to_string();
    }
    let mut out = bound.to_string();
    if !out.contains('.') {
        out.push_str(".0");
    }
    out
}

/// Renders a sample value.
///
/// ```rust
/// use metrica::exposition::format_value;
///
/// assert_eq!(format_value(2.0), "2");
/// assert_eq!(format_value(2.3), "2.3");
/// assert_eq!(format_value(-1.0), "-1");
/// assert_eq!(format_value(f64::INFINITY), "+Inf");
/// assert_eq!(format_value(1e300), "1e300");
/// ```
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-5..1e16).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

/// Renders an l-value: `name[_suffix]{k1="v1",k2="v2"}`.
///
/// Keys and values are paired positionally; the braces are omitted when
/// there are no labels.
///
/// ```rust
/// use metrica::exposition::render_l_value;
///
/// let none: [&str; 0] = [];
/// assert_eq!(render_l_value("up", None, &none, &none), "up");
/// assert_eq!(
///     render_l_value("req", Some("count"), &["method"], &["GET"]),
///     r#"req_count{method="GET"}"#
/// );
/// ```
pub fn render_l_value<K, V>(name: &str, suffix: Option<&str>, keys: &[K], values: &[V]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::with_capacity(name.len() + 16 * keys.len());
    write_l_value(&mut out, name, suffix, keys, values);
    out
}

fn write_l_value<K, V>(out: &mut String, name: &str, suffix: Option<&str>, keys: &[K], values: &[V])
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    out.push_str(name);
    if let Some(suffix) = suffix {
        out.push('_');
        out.push_str(suffix);
    }
    if keys.is_empty() {
        return;
    }
    out.push('{');
    for (i, (key, value)) in keys.iter().zip(values).enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(key.as_ref());
        out.push_str("=\"");
        out.push_str(value.as_ref());
        out.push('"');
    }
    out.push('}');
}

/// Stateful builder for exposition text.
#[derive(Debug, Default, Clone)]
pub struct TextFormatter {
    buffer: String,
}

impl TextFormatter {
    /// Creates an empty formatter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `# HELP <name> <help>\n`.
    pub fn load_help(&mut self, name: &str, help: &str) {
        self.buffer.push_str("# HELP ");
        self.buffer.push_str(name);
        self.buffer.push(' ');
        self.buffer.push_str(help);
        self.buffer.push('\n');
    }

    /// Appends `# TYPE <name> <kind>\n`.
    pub fn load_type(&mut self, name: &str, kind: MetricKind) {
        self.buffer.push_str("# TYPE ");
        self.buffer.push_str(name);
        self.buffer.push(' ');
        self.buffer.push_str(kind.as_str());
        self.buffer.push('\n');
    }

    /// Appends an l-value (no trailing newline). See [`render_l_value`].
    pub fn load_l_value<K, V>(&mut self, name: &str, suffix: Option<&str>, keys: &[K], values: &[V])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        write_l_value(&mut self.buffer, name, suffix, keys, values);
    }

    /// Appends `<l_value> <value>\n`.
    pub fn load_sample(&mut self, sample: &Sample) {
        self.buffer.push_str(sample.l_value());
        self.buffer.push(' ');
        self.buffer.push_str(&format_value(sample.value()));
        self.buffer.push('\n');
    }

    /// Appends a whole metric: headers, every sample, then a blank line.
    pub fn load_metric(&mut self, metric: &Metric) {
        self.load_help(metric.name(), metric.help());
        self.load_type(metric.name(), metric.kind());
        for sample in metric.samples() {
            match sample {
                MetricSample::Scalar(sample) => self.load_sample(&sample),
                MetricSample::Histogram(histogram) => {
                    for sample in histogram.samples() {
                        self.load_sample(sample);
                    }
                }
            }
        }
        self.buffer.push('\n');
    }

    /// Appends every metric of every collector, in insertion order.
    ///
    /// Each collector is asked for its current metric set through
    /// [`Collector::collect`].
    ///
    /// # Errors
    ///
    /// Propagates the first collector failure. Text loaded before the failure
    /// stays in the buffer; callers normally [`clear`](Self::clear) it.
    pub fn load_metrics(&mut self, collectors: &ConcurrentMap<Arc<Collector>>) -> Result<()> {
        for collector in collectors.values() {
            for metric in collector.collect()? {
                self.load_metric(&metric);
            }
        }
        Ok(())
    }

    /// Discards the accumulated text.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns the accumulated text and resets the buffer.
    pub fn dump(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// The accumulated text.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Length of the accumulated text in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been loaded since the last dump or clear.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::BucketSet;
    use crate::metric::{Counter, Gauge, Histogram, Opts};

    #[test]
    fn test_load_l_value() {
        let mut formatter = TextFormatter::new();
        formatter.load_l_value("test", None, &["foo", "bar", "bing"], &["one", "two", "three"]);
        assert_eq!(formatter.dump(), r#"test{foo="one",bar="two",bing="three"}"#);
        assert!(formatter.is_empty());
    }

    #[test]
    fn test_load_l_value_with_suffix_no_labels() {
        let keys: [&str; 0] = [];
        let mut formatter = TextFormatter::new();
        formatter.load_l_value("latency", Some("sum"), &keys, &keys);
        assert_eq!(formatter.as_str(), "latency_sum");
    }

    #[test]
    fn test_render_l_value_without_labels() {
        let none: [&str; 0] = [];
        assert_eq!(render_l_value("up", None, &none, &none), "up");
        assert_eq!(render_l_value("up", Some("total"), &none, &none), "up_total");
    }

    #[test]
    fn test_load_sample() {
        let mut formatter = TextFormatter::new();
        let sample = Sample::new(MetricKind::Counter, r#"test{foo="one"}"#, 22.2);
        formatter.load_sample(&sample);
        assert_eq!(formatter.dump(), "test{foo=\"one\"} 22.2\n");
    }

    #[test]
    fn test_load_metric() {
        let counter = Counter::new(
            Opts::new("test_counter", "counter under test").with_label_keys(["foo", "bar"]),
        )
        .unwrap();
        counter.add(2.3, &["f", "b"]).unwrap();
        counter.add(4.6, &["o", "r"]).unwrap();

        let mut formatter = TextFormatter::new();
        formatter.load_metric(&counter);
        assert_eq!(
            formatter.dump(),
            "# HELP test_counter counter under test\n\
             # TYPE test_counter counter\n\
             test_counter{foo=\"f\",bar=\"b\"} 2.3\n\
             test_counter{foo=\"o\",bar=\"r\"} 4.6\n\
             \n"
        );
    }

    #[test]
    fn test_load_metric_without_samples() {
        let gauge = Gauge::new(Opts::new("idle", "never touched")).unwrap();
        let mut formatter = TextFormatter::new();
        formatter.load_metric(&gauge);
        assert_eq!(
            formatter.dump(),
            "# HELP idle never touched\n# TYPE idle gauge\n\n"
        );
    }

    #[test]
    fn test_load_histogram_metric() {
        let histogram = Histogram::new(
            Opts::new("test_histogram", "histogram under test"),
            Some(BucketSet::linear(5.0, 5.0, 2).unwrap()),
        )
        .unwrap();
        histogram.observe(3.0, &[]).unwrap();
        histogram.observe(7.0, &[]).unwrap();

        let mut formatter = TextFormatter::new();
        formatter.load_metric(&histogram);
        assert_eq!(
            formatter.dump(),
            "# HELP test_histogram histogram under test\n\
             # TYPE test_histogram histogram\n\
             test_histogram{le=\"5.0\"} 1\n\
             test_histogram{le=\"10.0\"} 2\n\
             test_histogram{le=\"+Inf\"} 2\n\
             test_histogram_count 2\n\
             test_histogram_sum 10\n\
             \n"
        );
    }

    #[test]
    fn test_load_metrics_in_collector_order() {
        let collectors = ConcurrentMap::new();
        let first = Arc::new(Collector::new("first"));
        let second = Arc::new(Collector::new("second"));

        let b = Counter::new(Opts::new("test_counter_b", "counter under test")).unwrap();
        let a = Counter::new(Opts::new("test_counter_a", "counter under test")).unwrap();
        b.add(4.6, &[]).unwrap();
        a.add(2.3, &[]).unwrap();
        second.add_metric(b).unwrap();
        first.add_metric(a).unwrap();

        collectors.set("first", first);
        collectors.set("second", second);

        let mut formatter = TextFormatter::new();
        formatter.load_metrics(&collectors).unwrap();
        let text = formatter.dump();
        let a_pos = text.find("test_counter_a 2.3").unwrap();
        let b_pos = text.find("test_counter_b 4.6").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn test_clear() {
        let mut formatter = TextFormatter::new();
        formatter.load_help("x", "y");
        assert!(!formatter.is_empty());
        formatter.clear();
        assert_eq!(formatter.len(), 0);
    }

    #[test]
    fn test_format_bound() {
        assert_eq!(format_bound(5.0), "5.0");
        assert_eq!(format_bound(10.0), "10.0");
        assert_eq!(format_bound(0.025), "0.025");
        assert_eq!(format_bound(f64::INFINITY), "+Inf");
        assert_eq!(format_bound(-1.0), "-1.0");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(41.0), "41");
        assert_eq!(format_value(0.1), "0.1");
        assert_eq!(format_value(1048576.0), "1048576");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(1.5e-7), "1.5e-7");
        assert_eq!(format_value(0.1 + 0.2).parse::<f64>().unwrap(), 0.1 + 0.2);
    }
}
