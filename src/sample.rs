//! Atomically updatable sample cells.
//!
//! A [`Sample`] is one line of exposition output: a fully rendered left-hand
//! side (the *l-value*, e.g. `http_requests_total{method="GET"}`) and an `f64`
//! value. The value is stored as raw bits in an [`AtomicU64`] so updates are
//! lock-free compare-and-swap loops; once a sample exists, producers never
//! contend on any map lock to update it.
//!
//! Histograms are built from several samples; see [`histogram`].
//!
//! # Example
//!
//! ```rust
//! use metrica::sample::{MetricKind, Sample};
//!
//! let sample = Sample::new(MetricKind::Gauge, "queue_depth", 0.0);
//! sample.add(5.0).unwrap();
//! sample.sub(2.0).unwrap();
//! assert_eq!(sample.value(), 3.0);
//! ```

pub mod histogram;

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{MetricError, Result};

pub use histogram::HistogramSample;

/// The type of a metric, as written on its `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricKind {
    /// Monotonically non-decreasing value.
    Counter,
    /// Value that can go up and down.
    Gauge,
    /// Cumulative bucket counts plus `_count` and `_sum`.
    Histogram,
    /// Only exists as a type string; quantiles are not computed.
    Summary,
}

impl MetricKind {
    /// The type string used in the exposition format.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named `f64` cell with lock-free updates.
///
/// Counter and histogram samples only go up: [`add`](Self::add) rejects
/// negative amounts and [`sub`](Self::sub)/[`set`](Self::set) are refused.
/// Gauge samples accept all three.
pub struct Sample {
    kind: MetricKind,
    l_value: String,
    bits: CachePadded<AtomicU64>,
}

impl Sample {
    /// Creates a sample with the given kind, l-value and initial value.
    pub fn new(kind: MetricKind, l_value: impl Into<String>, initial: f64) -> Self {
        Sample {
            kind,
            l_value: l_value.into(),
            bits: CachePadded::new(AtomicU64::new(initial.to_bits())),
        }
    }

    /// The kind of the metric this sample belongs to.
    #[inline]
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// The rendered left-hand side of the exposition line.
    #[inline]
    pub fn l_value(&self) -> &str {
        &self.l_value
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Adds `delta` to the value.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if `delta` is negative or
    /// NaN; the value is left unchanged.
    pub fn add(&self, delta: f64) -> Result<()> {
        if !(delta >= 0.0) {
            return Err(MetricError::invalid(format!(
                "{}: increment must be non-negative, got {delta}",
                self.l_value
            )));
        }
        self.update(|current| current + delta);
        Ok(())
    }

    /// Subtracts `delta` from the value. Gauge samples only.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] for any kind other than
    /// [`MetricKind::Gauge`].
    pub fn sub(&self, delta: f64) -> Result<()> {
        self.require_gauge("sub")?;
        self.update(|current| current - delta);
        Ok(())
    }

    /// Replaces the value. Gauge samples only.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] for any kind other than
    /// [`MetricKind::Gauge`].
    pub fn set(&self, value: f64) -> Result<()> {
        self.require_gauge("set")?;
        self.bits.store(value.to_bits(), Ordering::Release);
        Ok(())
    }

    fn require_gauge(&self, op: &str) -> Result<()> {
        if self.kind != MetricKind::Gauge {
            return Err(MetricError::invalid(format!(
                "{}: {op} is only supported on gauges, not {}",
                self.l_value, self.kind
            )));
        }
        Ok(())
    }

    /// Compare-and-swap retry loop applying `f` to the current value.
    #[inline]
    fn update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Debug for Sample {
    /// Formats as `l_value value`, the same shape as the exposition line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.l_value, self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new() {
        let sample = Sample::new(MetricKind::Counter, "requests_total", 0.0);
        assert_eq!(sample.value(), 0.0);
        assert_eq!(sample.l_value(), "requests_total");
        assert_eq!(sample.kind(), MetricKind::Counter);
    }

    #[test]
    fn test_add() {
        let sample = Sample::new(MetricKind::Counter, "c", 0.0);
        sample.add(1.0).unwrap();
        sample.add(2.5).unwrap();
        assert_eq!(sample.value(), 3.5);
    }

    #[test]
    fn test_add_negative_rejected() {
        let sample = Sample::new(MetricKind::Counter, "c", 4.0);
        let err = sample.add(-1.0).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(sample.value(), 4.0);
    }

    #[test]
    fn test_add_nan_rejected() {
        let sample = Sample::new(MetricKind::Counter, "c", 2.0);
        let err = sample.add(f64::NAN).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(sample.value(), 2.0);
        sample.add(1.0).unwrap();
        assert_eq!(sample.value(), 3.0);
    }

    #[test]
    fn test_sub_and_set_require_gauge() {
        let counter = Sample::new(MetricKind::Counter, "c", 1.0);
        assert!(counter.sub(1.0).is_err());
        assert!(counter.set(5.0).is_err());
        assert_eq!(counter.value(), 1.0);

        let bucket = Sample::new(MetricKind::Histogram, "h{le=\"1.0\"}", 0.0);
        assert!(bucket.set(5.0).is_err());
    }

    #[test]
    fn test_gauge_ops() {
        let gauge = Sample::new(MetricKind::Gauge, "g", 0.0);
        gauge.add(10.0).unwrap();
        gauge.sub(15.0).unwrap();
        assert_eq!(gauge.value(), -5.0);
        gauge.set(42.0).unwrap();
        assert_eq!(gauge.value(), 42.0);
    }

    #[test]
    fn test_metric_kind_strings() {
        assert_eq!(MetricKind::Counter.as_str(), "counter");
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!(MetricKind::Histogram.as_str(), "histogram");
        assert_eq!(MetricKind::Summary.as_str(), "summary");
    }

    #[test]
    fn test_debug() {
        let sample = Sample::new(MetricKind::Gauge, "g{a=\"b\"}", 2.0);
        assert_eq!(format!("{:?}", sample), "g{a=\"b\"} 2");
    }

    #[test]
    fn test_multiple_threads() {
        let sample = Arc::new(Sample::new(MetricKind::Counter, "c", 0.0));
        let mut handles = vec![];

        for _ in 0..8 {
            let sample = Arc::clone(&sample);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    sample.add(1.0).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sample.value(), 8000.0);
    }
}
