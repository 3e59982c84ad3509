//! Monotonic counter handle.
//!
//! A [`Counter`] only goes up. Negative increments are rejected with
//! [`MetricError::InvalidArgument`](crate::error::MetricError::InvalidArgument)
//! and leave the value unchanged.

use std::fmt::{self, Debug};
use std::ops::Deref;
use std::sync::Arc;

use super::{Metric, MetricSample, Opts};
use crate::error::Result;
use crate::sample::MetricKind;

/// Cloneable handle to a counter family.
///
/// # Examples
///
/// ```rust
/// use metrica::metric::{Counter, Opts};
///
/// let counter = Counter::new(
///     Opts::new("test_counter", "counter under test").with_label_keys(["label"]),
/// )
/// .unwrap();
///
/// counter.inc(&["foo"]).unwrap();
/// counter.inc(&["foo"]).unwrap();
/// assert_eq!(counter.get(&["foo"]).unwrap(), 2.0);
///
/// assert!(counter.add(-1.0, &["foo"]).is_err());
/// assert_eq!(counter.get(&["foo"]).unwrap(), 2.0);
/// ```
///
/// Shared across threads:
///
/// ```rust
/// use metrica::metric::{Counter, Opts};
/// use std::thread;
///
/// let counter = Counter::new(Opts::new("jobs_total", "Jobs processed.")).unwrap();
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = counter.clone();
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 counter.inc(&[]).unwrap();
///             }
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(counter.get(&[]).unwrap(), 4000.0);
/// ```
#[derive(Clone)]
pub struct Counter {
    metric: Arc<Metric>,
}

impl Counter {
    /// Creates a counter from `opts`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`](crate::error::MetricError::InvalidArgument)
    /// for an invalid name or label key.
    pub fn new(opts: Opts) -> Result<Self> {
        Ok(Counter {
            metric: Arc::new(Metric::from_opts(MetricKind::Counter, opts, None)?),
        })
    }

    /// Adds one.
    #[inline]
    pub fn inc(&self, label_values: &[&str]) -> Result<()> {
        self.add(1.0, label_values)
    }

    /// Adds `value`, which must be non-negative.
    #[inline]
    pub fn add(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.metric.sample_for(label_values)?.add(value)
    }

    /// Current value for `label_values`; zero if the label set was never used.
    pub fn get(&self, label_values: &[&str]) -> Result<f64> {
        Ok(match self.metric.find_sample(label_values)? {
            Some(MetricSample::Scalar(sample)) => sample.value(),
            _ => 0.0,
        })
    }

    /// The underlying metric.
    pub fn metric(&self) -> &Arc<Metric> {
        &self.metric
    }
}

impl Deref for Counter {
    type Target = Metric;

    fn deref(&self) -> &Metric {
        &self.metric
    }
}

impl From<Counter> for Arc<Metric> {
    fn from(counter: Counter) -> Self {
        counter.metric
    }
}

impl Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.metric).finish()
    }
}
