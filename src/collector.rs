//! Named sets of metrics with a pluggable collection source.
//!
//! A [`Collector`] owns a map of metrics keyed by name and a [`Collect`]
//! source that decides what a scrape sees. The default source,
//! [`StaticCollect`], returns the stored metrics as they are. Sources that
//! need to refresh values first (such as the [`process`] collector) or
//! compute metrics on the fly implement [`Collect`] themselves, or wrap a
//! closure in [`FnCollect`].
//!
//! # Example
//!
//! ```rust
//! use metrica::collector::Collector;
//! use metrica::metric::{Gauge, Opts};
//!
//! let collector = Collector::new("queues");
//! let depth = Gauge::new(Opts::new("queue_depth", "Items waiting.")).unwrap();
//! collector.add_metric(depth.clone()).unwrap();
//!
//! depth.set(12.0, &[]).unwrap();
//! let metrics = collector.collect().unwrap();
//! assert_eq!(metrics.len(), 1);
//! assert_eq!(metrics[0].name(), "queue_depth");
//! ```

pub mod process;

use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{MetricError, Result};
use crate::map::ConcurrentMap;
use crate::metric::Metric;

/// Produces the metrics a collector exposes on a scrape.
pub trait Collect: Send + Sync {
    /// Returns the metrics to render, in order. `metrics` is the collector's
    /// own metric map.
    fn collect(&self, metrics: &ConcurrentMap<Arc<Metric>>) -> Result<Vec<Arc<Metric>>>;
}

/// Returns the stored metrics in insertion order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticCollect;

impl Collect for StaticCollect {
    fn collect(&self, metrics: &ConcurrentMap<Arc<Metric>>) -> Result<Vec<Arc<Metric>>> {
        Ok(metrics.values())
    }
}

/// Adapts a closure into a [`Collect`] source.
///
/// ```rust
/// use std::sync::Arc;
/// use metrica::collector::{Collector, FnCollect};
///
/// let collector = Collector::with_source(
///     "filtered",
///     FnCollect::new(|metrics| {
///         Ok(metrics
///             .values()
///             .into_iter()
///             .filter(|m| !m.name().starts_with("debug_"))
///             .collect())
///     }),
/// );
/// assert!(collector.collect().unwrap().is_empty());
/// ```
pub struct FnCollect<F> {
    f: F,
}

impl<F> FnCollect<F>
where
    F: Fn(&ConcurrentMap<Arc<Metric>>) -> Result<Vec<Arc<Metric>>> + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        FnCollect { f }
    }
}

impl<F> Collect for FnCollect<F>
where
    F: Fn(&ConcurrentMap<Arc<Metric>>) -> Result<Vec<Arc<Metric>>> + Send + Sync,
{
    fn collect(&self, metrics: &ConcurrentMap<Arc<Metric>>) -> Result<Vec<Arc<Metric>>> {
        (self.f)(metrics)
    }
}

/// A named metric set plus the source that collects it.
pub struct Collector {
    name: String,
    metrics: ConcurrentMap<Arc<Metric>>,
    source: Box<dyn Collect>,
}

impl Collector {
    /// Creates an empty collector backed by [`StaticCollect`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_source(name, StaticCollect)
    }

    /// Creates an empty collector backed by `source`.
    pub fn with_source(name: impl Into<String>, source: impl Collect + 'static) -> Self {
        Collector {
            name: name.into(),
            metrics: ConcurrentMap::new(),
            source: Box::new(source),
        }
    }

    /// Collector name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a metric under its name.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::AlreadyRegistered`] if a metric with the same
    /// name exists; the existing metric and its samples are left untouched.
    pub fn add_metric(&self, metric: impl Into<Arc<Metric>>) -> Result<()> {
        let metric = metric.into();
        let name = metric.name().to_string();
        match self.metrics.insert_new(&name, metric) {
            Ok(()) => {
                debug!(collector = %self.name, metric = %name, "metric registered");
                Ok(())
            }
            Err(MetricError::AlreadyRegistered { .. }) => {
                warn!(collector = %self.name, metric = %name, "metric already registered");
                Err(MetricError::metric_registered(name))
            }
            Err(err) => Err(err),
        }
    }

    /// Looks up a metric by name.
    pub fn metric(&self, name: &str) -> Option<Arc<Metric>> {
        self.metrics.get(name)
    }

    /// Removes a metric, returning it if it was present.
    pub fn remove_metric(&self, name: &str) -> Option<Arc<Metric>> {
        let removed = self.metrics.take(name);
        if removed.is_some() {
            debug!(collector = %self.name, metric = %name, "metric removed");
        }
        removed
    }

    /// Runs the collection source over the stored metrics.
    ///
    /// # Errors
    ///
    /// Whatever the source reports; [`StaticCollect`] never fails.
    pub fn collect(&self) -> Result<Vec<Arc<Metric>>> {
        self.source.collect(&self.metrics)
    }

    /// The stored metrics.
    pub fn metrics(&self) -> &ConcurrentMap<Arc<Metric>> {
        &self.metrics
    }

    /// Number of stored metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns `true` if no metric is stored.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Drops every stored metric, clearing their samples.
    pub fn clear(&self) {
        for metric in self.metrics.values() {
            metric.clear();
        }
        self.metrics.clear();
    }
}

impl Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("metrics", &self.metrics.keys())
            .finish()
    }
}
