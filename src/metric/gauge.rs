//! Gauge handle: a value that can go up and down.

use std::fmt::{self, Debug};
use std::ops::Deref;
use std::sync::Arc;

use super::{Metric, MetricSample, Opts};
use crate::error::Result;
use crate::sample::MetricKind;

/// Cloneable handle to a gauge family.
///
/// ```rust
/// use metrica::metric::{Gauge, Opts};
///
/// let in_flight = Gauge::new(Opts::new("in_flight_requests", "Requests in flight.")).unwrap();
/// in_flight.inc(&[]).unwrap();
/// in_flight.inc(&[]).unwrap();
/// in_flight.dec(&[]).unwrap();
/// assert_eq!(in_flight.get(&[]).unwrap(), 1.0);
///
/// in_flight.set(-3.5, &[]).unwrap();
/// assert_eq!(in_flight.get(&[]).unwrap(), -3.5);
/// ```
#[derive(Clone)]
pub struct Gauge {
    metric: Arc<Metric>,
}

impl Gauge {
    /// Creates a gauge from `opts`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`](crate::error::MetricError::InvalidArgument)
    /// for an invalid name or label key.
    pub fn new(opts: Opts) -> Result<Self> {
        Ok(Gauge {
            metric: Arc::new(Metric::from_opts(MetricKind::Gauge, opts, None)?),
        })
    }

    /// Adds one.
    #[inline]
    pub fn inc(&self, label_values: &[&str]) -> Result<()> {
        self.add(1.0, label_values)
    }

    /// Subtracts one.
    #[inline]
    pub fn dec(&self, label_values: &[&str]) -> Result<()> {
        self.sub(1.0, label_values)
    }

    /// Adds a non-negative `value`. Use [`sub`](Self::sub) to go down.
    #[inline]
    pub fn add(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.metric.sample_for(label_values)?.add(value)
    }

    /// Subtracts `value`.
    #[inline]
    pub fn sub(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.metric.sample_for(label_values)?.sub(value)
    }

    /// Replaces the value.
    #[inline]
    pub fn set(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.metric.sample_for(label_values)?.set(value)
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

impl Deref for Gauge {
    type Target = Metric;

    fn deref(&self) -> &Metric {
        &self.metric
    }
}

impl From<Gauge> for Arc<Metric> {
    fn from(gauge: Gauge) -> Self {
        gauge.metric
    }
}

impl Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Gauge").field(&self.metric).finish()
    }
}
