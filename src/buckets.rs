//! Histogram bucket layouts.
//!
//! A [`BucketSet`] is an immutable, non-decreasing list of upper bounds. It is
//! cheap to clone (the bounds live behind an `Arc`), so one layout can be
//! shared by every label set of a histogram.
//!
//! ```rust
//! use metrica::buckets::BucketSet;
//!
//! let linear = BucketSet::linear(5.0, 5.0, 3).unwrap();
//! assert_eq!(linear.bounds(), &[5.0, 10.0, 15.0]);
//!
//! let exponential = BucketSet::exponential(1.0, 2.0, 4).unwrap();
//! assert_eq!(exponential.bounds(), &[1.0, 2.0, 4.0, 8.0]);
//! ```

use std::ops::Deref;
use std::sync::Arc;

use crate::error::{MetricError, Result};

/// Bounds used when a histogram is built without an explicit layout.
pub const DEFAULT_BOUNDS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Ordered upper bounds of a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSet {
    bounds: Arc<[f64]>,
}

impl BucketSet {
    /// Creates a layout from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if the list is empty, contains
    /// NaN, or any bound is smaller than its predecessor.
    pub fn new(bounds: impl Into<Vec<f64>>) -> Result<Self> {
        let bounds = bounds.into();
        if bounds.is_empty() {
            return Err(MetricError::invalid("bucket layout needs at least one bound"));
        }
        if bounds.iter().any(|b| b.is_nan()) {
            return Err(MetricError::invalid("bucket bounds must not be NaN"));
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] > pair[1]) {
            return Err(MetricError::invalid(format!(
                "bucket bounds must be non-decreasing: {} > {}",
                pair[0], pair[1]
            )));
        }
        Ok(BucketSet {
            bounds: bounds.into(),
        })
    }

    /// `count` bounds: `start`, `start + width`, ...
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if `count` is less than 2.
    pub fn linear(start: f64, width: f64, count: usize) -> Result<Self> {
        if count <= 1 {
            return Err(MetricError::invalid(format!(
                "linear buckets need count > 1, got {count}"
            )));
        }
        let bounds: Vec<f64> = (0..count).map(|i| start + width * i as f64).collect();
        Self::new(bounds)
    }

    /// `count` bounds: `start`, `start * factor`, `start * factor^2`, ...
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if `count` is zero, `start`
    /// is not positive or `factor` is not greater than 1.
    pub fn exponential(start: f64, factor: f64, count: usize) -> Result<Self> {
        if count < 1 {
            return Err(MetricError::invalid("exponential buckets need count >= 1"));
        }
        if start <= 0.0 {
            return Err(MetricError::invalid(format!(
                "exponential buckets need start > 0, got {start}"
            )));
        }
        if factor <= 1.0 {
            return Err(MetricError::invalid(format!(
                "exponential buckets need factor > 1, got {factor}"
            )));
        }
        let mut bounds = Vec::with_capacity(count);
        let mut next = start;
        for _ in 0..count {
            bounds.push(next);
            next *= factor;
        }
        Self::new(bounds)
    }

    /// The bounds, in ascending order.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Number of finite bounds (`+Inf` is implicit and not counted).
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Returns `true` if there are no finite bounds (never, for a constructed set).
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

impl Default for BucketSet {
    fn default() -> Self {
        BucketSet {
            bounds: Arc::from(&DEFAULT_BOUNDS[..]),
        }
    }
}

impl Deref for BucketSet {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.bounds
    }
}
