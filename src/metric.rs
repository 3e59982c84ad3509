//! Metric families and their typed handles.
//!
//! A [`Metric`] is a named, typed family of samples. Each distinct set of
//! label values gets its own sample, created on first use and kept for the
//! lifetime of the metric. Producers normally go through the typed handles:
//!
//! - [`Counter`]: monotonically non-decreasing values
//! - [`Gauge`]: values that go up and down
//! - [`Histogram`]: cumulative bucket counts with `_count` and `_sum`
//!
//! Handles are cheap to clone and convert into `Arc<Metric>` for registration
//! with a [`Collector`](crate::collector::Collector) or
//! [`Registry`](crate::registry::Registry).
//!
//! # Example
//!
//! ```rust
//! use metrica::metric::{Counter, Opts};
//!
//! let requests = Counter::new(
//!     Opts::new("requests_total", "Requests served.")
//!         .with_namespace("myapp")
//!         .with_label_keys(["method"]),
//! )
//! .unwrap();
//!
//! requests.inc(&["GET"]).unwrap();
//! requests.add(2.0, &["POST"]).unwrap();
//!
//! assert_eq!(requests.name(), "myapp_requests_total");
//! assert_eq!(requests.get(&["POST"]).unwrap(), 2.0);
//! ```

mod counter;
mod gauge;
mod histogram;

use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::buckets::BucketSet;
use crate::error::{MetricError, Result};
use crate::exposition::render_l_value;
use crate::map::ConcurrentMap;
use crate::sample::{HistogramSample, MetricKind, Sample};

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::Histogram;

static METRIC_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("metric name pattern is valid")
});

static LABEL_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label key pattern is valid")
});

/// Label keys generated by histograms and summaries.
pub const RESERVED_LABEL_KEYS: [&str; 2] = ["le", "quantile"];

/// Checks `name` against `^[a-zA-Z_:][a-zA-Z0-9_:]*$`.
///
/// ```rust
/// use metrica::metric::validate_metric_name;
///
/// assert!(validate_metric_name("http_requests_total").is_ok());
/// assert!(validate_metric_name("node:cpu:rate5m").is_ok());
/// assert!(validate_metric_name("9lives").is_err());
/// ```
pub fn validate_metric_name(name: &str) -> Result<()> {
    if METRIC_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(MetricError::invalid(format!("invalid metric name: {name:?}")))
    }
}

fn validate_label_keys(name: &str, keys: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(keys.len());
    for key in keys {
        if RESERVED_LABEL_KEYS.contains(&key.as_str()) {
            return Err(MetricError::invalid(format!(
                "{name}: label key {key:?} is reserved"
            )));
        }
        if !LABEL_KEY_RE.is_match(key) {
            return Err(MetricError::invalid(format!(
                "{name}: invalid label key {key:?}"
            )));
        }
        if !seen.insert(key.as_str()) {
            return Err(MetricError::invalid(format!(
                "{name}: duplicate label key {key:?}"
            )));
        }
    }
    Ok(())
}

/// Construction options shared by every typed handle.
///
/// The exposed name is `namespace_subsystem_name`, with absent parts skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opts {
    /// Base metric name.
    pub name: String,
    /// Text for the `# HELP` line.
    pub help: String,
    /// Label keys, in the order their values are passed to every operation.
    pub label_keys: Vec<String>,
    /// Optional prefix.
    pub namespace: Option<String>,
    /// Optional infix between namespace and name.
    pub subsystem: Option<String>,
}

impl Opts {
    /// Options with a name and help text, no labels and no prefix.
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Opts {
            name: name.into(),
            help: help.into(),
            ..Default::default()
        }
    }

    /// Sets the label keys.
    pub fn with_label_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the subsystem.
    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    /// The exposed metric name.
    pub fn full_name(&self) -> String {
        match (&self.namespace, &self.subsystem) {
            (Some(ns), Some(ss)) => format!("{}_{}_{}", ns, ss, self.name),
            (Some(ns), None) => format!("{}_{}", ns, self.name),
            (None, Some(ss)) => format!("{}_{}", ss, self.name),
            (None, None) => self.name.clone(),
        }
    }
}

/// One entry of a metric's sample map.
#[derive(Debug, Clone)]
pub enum MetricSample {
    /// A counter, gauge or summary sample.
    Scalar(Arc<Sample>),
    /// The sample group of one histogram label set.
    Histogram(Arc<HistogramSample>),
}

/// A named, typed family of samples keyed by label values.
pub struct Metric {
    kind: MetricKind,
    name: String,
    help: String,
    label_keys: Vec<String>,
    samples: ConcurrentMap<MetricSample>,
    buckets: Option<BucketSet>,
}

impl Metric {
    /// Creates a counter, gauge or summary family.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] for an invalid name, an
    /// invalid, reserved or repeated label key, or [`MetricKind::Histogram`]
    /// (use [`Metric::histogram`]).
    pub fn new<I, S>(kind: MetricKind, name: &str, help: &str, label_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if kind == MetricKind::Histogram {
            return Err(MetricError::invalid(format!(
                "{name}: histograms need a bucket layout"
            )));
        }
        Self::build(kind, name, help, label_keys, None)
    }

    /// Creates a histogram family with the given bucket layout.
    ///
    /// # Errors
    ///
    /// Same validation as [`Metric::new`].
    pub fn histogram<I, S>(name: &str, help: &str, label_keys: I, buckets: BucketSet) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(MetricKind::Histogram, name, help, label_keys, Some(buckets))
    }

    fn build<I, S>(
        kind: MetricKind,
        name: &str,
        help: &str,
        label_keys: I,
        buckets: Option<BucketSet>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_metric_name(name)?;
        let label_keys: Vec<String> = label_keys.into_iter().map(Into::into).collect();
        validate_label_keys(name, &label_keys)?;
        Ok(Metric {
            kind,
            name: name.to_string(),
            help: help.to_string(),
            label_keys,
            samples: ConcurrentMap::new(),
            buckets,
        })
    }

    pub(crate) fn from_opts(kind: MetricKind, opts: Opts, buckets: Option<BucketSet>) -> Result<Self> {
        let name = opts.full_name();
        Self::build(kind, &name, &opts.help, opts.label_keys, buckets)
    }

    /// Metric kind.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Full metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Label keys, in order.
    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    /// Bucket layout, for histograms.
    pub fn buckets(&self) -> Option<&BucketSet> {
        self.buckets.as_ref()
    }

    fn check_arity<V: AsRef<str>>(&self, label_values: &[V]) -> Result<()> {
        if label_values.len() != self.label_keys.len() {
            return Err(MetricError::invalid(format!(
                "{}: expected {} label values, got {}",
                self.name,
                self.label_keys.len(),
                label_values.len()
            )));
        }
        Ok(())
    }

    fn key_for<V: AsRef<str>>(&self, label_values: &[V]) -> String {
        render_l_value(&self.name, None, &self.label_keys, label_values)
    }

    /// Returns the sample for `label_values`, creating a zero sample on first use.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if the number of values does
    /// not match the label keys, or if this is a histogram.
    pub fn sample_for<V: AsRef<str>>(&self, label_values: &[V]) -> Result<Arc<Sample>> {
        self.check_arity(label_values)?;
        if self.kind == MetricKind::Histogram {
            return Err(MetricError::invalid(format!(
                "{}: histogram has no scalar samples",
                self.name
            )));
        }
        let l_value = self.key_for(label_values);
        let entry = self.samples.get_or_insert_with(&l_value, || {
            Ok(MetricSample::Scalar(Arc::new(Sample::new(
                self.kind,
                l_value.clone(),
                0.0,
            ))))
        })?;
        match entry {
            MetricSample::Scalar(sample) => Ok(sample),
            MetricSample::Histogram(_) => Err(MetricError::invalid(format!(
                "{}: expected a scalar sample",
                self.name
            ))),
        }
    }

    /// Returns the histogram sample group for `label_values`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if the number of values does
    /// not match the label keys, or if this is not a histogram.
    pub fn histogram_sample_for<V: AsRef<str>>(&self, label_values: &[V]) -> Result<Arc<HistogramSample>> {
        self.check_arity(label_values)?;
        let buckets = self.buckets.as_ref().ok_or_else(|| {
            MetricError::invalid(format!("{}: not a histogram", self.name))
        })?;
        let key = self.key_for(label_values);
        let entry = self.samples.get_or_insert_with(&key, || {
            HistogramSample::new(&self.name, buckets, &self.label_keys, label_values)
                .map(|h| MetricSample::Histogram(Arc::new(h)))
        })?;
        match entry {
            MetricSample::Histogram(histogram) => Ok(histogram),
            MetricSample::Scalar(_) => Err(MetricError::invalid(format!(
                "{}: expected a histogram sample",
                self.name
            ))),
        }
    }

    /// Looks up an existing entry without creating one.
    pub fn find_sample<V: AsRef<str>>(&self, label_values: &[V]) -> Result<Option<MetricSample>> {
        self.check_arity(label_values)?;
        Ok(self.samples.get(&self.key_for(label_values)))
    }

    /// Every entry, in the order its label set was first seen.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.values()
    }

    /// Number of distinct label sets seen so far.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Drops every sample.
    pub fn clear(&self) {
        self.samples.clear();
    }
}

impl Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("label_keys", &self.label_keys)
            .field("samples", &self.samples.len())
            .finish()
    }
}
