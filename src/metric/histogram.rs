//! Histogram handle.

use std::fmt::{self, Debug};
use std::ops::Deref;
use std::sync::Arc;

use super::{Metric, Opts};
use crate::buckets::BucketSet;
use crate::error::Result;
use crate::sample::{HistogramSample, MetricKind};

/// Cloneable handle to a histogram family.
///
/// Each label set gets its own [`HistogramSample`] with the shared bucket
/// layout.
///
/// ```rust
/// use metrica::buckets::BucketSet;
/// use metrica::metric::{Histogram, Opts};
///
/// let latency = Histogram::new(
///     Opts::new("request_seconds", "Request latency.").with_label_keys(["route"]),
///     Some(BucketSet::exponential(0.01, 10.0, 3).unwrap()),
/// )
/// .unwrap();
///
/// latency.observe(0.2, &["/"]).unwrap();
/// latency.observe(3.0, &["/"]).unwrap();
///
/// let sample = latency.sample(&["/"]).unwrap();
/// assert_eq!(sample.bucket_value(1.0), Some(1.0));
/// assert_eq!(sample.count(), 2.0);
/// ```
#[derive(Clone)]
pub struct Histogram {
    metric: Arc<Metric>,
}

impl Histogram {
    /// Creates a histogram from `opts`. `None` uses [`BucketSet::default`].
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`](crate::error::MetricError::InvalidArgument)
    /// for an invalid name or label key.
    pub fn new(opts: Opts, buckets: Option<BucketSet>) -> Result<Self> {
        let buckets = buckets.unwrap_or_default();
        Ok(Histogram {
            metric: Arc::new(Metric::from_opts(MetricKind::Histogram, opts, Some(buckets))?),
        })
    }

    /// Creates a histogram with explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`](crate::error::MetricError::InvalidArgument)
    /// if the bounds decrease.
    pub fn with_bounds(opts: Opts, bounds: impl Into<Vec<f64>>) -> Result<Self> {
        Self::new(opts, Some(BucketSet::new(bounds)?))
    }

    /// Records `value` in the sample group for `label_values`.
    #[inline]
    pub fn observe(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.metric.histogram_sample_for(label_values)?.observe(value)
    }

    /// The sample group for `label_values`, created on first use.
    pub fn sample(&self, label_values: &[&str]) -> Result<Arc<HistogramSample>> {
        self.metric.histogram_sample_for(label_values)
    }

    /// The underlying metric.
    pub fn metric(&self) -> &Arc<Metric> {
        &self.metric
    }
}

impl Deref for Histogram {
    type Target = Metric;

    fn deref(&self) -> &Metric {
        &self.metric
    }
}

impl From<Histogram> for Arc<Metric> {
    fn from(histogram: Histogram) -> Self {
        histogram.metric
    }
}

impl Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Histogram").field(&self.metric).finish()
    }
}
