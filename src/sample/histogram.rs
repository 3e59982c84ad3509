//! The sample group behind one label set of a histogram.
//!
//! A [`HistogramSample`] owns one [`Sample`] per bucket bound, one for `+Inf`,
//! one for `_count` and one for `_sum`. Bucket counts are cumulative: an
//! observation increments every bucket whose bound is greater than or equal
//! to it.
//!
//! ```rust
//! use metrica::buckets::BucketSet;
//! use metrica::sample::HistogramSample;
//!
//! let buckets = BucketSet::linear(5.0, 5.0, 3).unwrap();
//! let no_labels: [&str; 0] = [];
//! let histogram = HistogramSample::new("latency", &buckets, &no_labels, &no_labels).unwrap();
//!
//! for value in [1.0, 7.0, 11.0, 22.0] {
//!     histogram.observe(value).unwrap();
//! }
//! assert_eq!(histogram.bucket_value(5.0), Some(1.0));
//! assert_eq!(histogram.bucket_value(15.0), Some(3.0));
//! assert_eq!(histogram.inf_value(), 4.0);
//! assert_eq!(histogram.sum(), 41.0);
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{MetricKind, Sample};
use crate::buckets::BucketSet;
use crate::error::{MetricError, Result};
use crate::exposition::{format_bound, render_l_value};
use crate::map::ConcurrentMap;

const INF_KEY: &str = "+Inf";
const COUNT_KEY: &str = "count";
const SUM_KEY: &str = "sum";

/// Bucket, `+Inf`, `_count` and `_sum` samples for one label set.
pub struct HistogramSample {
    buckets: BucketSet,
    /// Every sample in exposition order: buckets ascending, `+Inf`, count, sum.
    ordered: Vec<Arc<Sample>>,
    /// Formatted bound (or `+Inf`/`count`/`sum`) to l-value.
    l_values: ConcurrentMap<String>,
    /// L-value to sample.
    samples: ConcurrentMap<Arc<Sample>>,
    /// Serializes observations so every sample of one observation moves together.
    lock: Mutex<()>,
}

impl HistogramSample {
    /// Builds the sample group for `name` with the given label pairs.
    ///
    /// Bucket l-values carry the label pairs plus `le="<bound>"`; the count
    /// and sum l-values carry the `_count` and `_sum` suffixes.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidArgument`] if keys and values differ in
    /// length.
    pub fn new<K, V>(name: &str, buckets: &BucketSet, label_keys: &[K], label_values: &[V]) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if label_keys.len() != label_values.len() {
            return Err(MetricError::invalid(format!(
                "{name}: expected {} label values, got {}",
                label_keys.len(),
                label_values.len()
            )));
        }

        let mut bucket_keys: Vec<&str> = label_keys.iter().map(AsRef::as_ref).collect();
        bucket_keys.push("le");
        let base_values: Vec<&str> = label_values.iter().map(AsRef::as_ref).collect();

        let l_values = ConcurrentMap::new();
        let samples = ConcurrentMap::new();
        let mut ordered = Vec::with_capacity(buckets.len() + 3);

        let mut push = |key: String, l_value: String| {
            let sample = Arc::new(Sample::new(MetricKind::Histogram, l_value.clone(), 0.0));
            samples.set(&l_value, Arc::clone(&sample));
            l_values.set(&key, l_value);
            ordered.push(sample);
        };

        for bound in buckets.iter().copied().chain(std::iter::once(f64::INFINITY)) {
            let le = format_bound(bound);
            let l_value = {
                let mut values = base_values.clone();
                values.push(le.as_str());
                render_l_value(name, None, &bucket_keys, &values)
            };
            push(le, l_value);
        }
        push(
            COUNT_KEY.to_string(),
            render_l_value(name, Some(COUNT_KEY), label_keys, label_values),
        );
        push(
            SUM_KEY.to_string(),
            render_l_value(name, Some(SUM_KEY), label_keys, label_values),
        );

        Ok(HistogramSample {
            buckets: buckets.clone(),
            ordered,
            l_values,
            samples,
            lock: Mutex::new(()),
        })
    }

    /// Records one observation.
    ///
    /// Buckets are scanned from the largest bound down; the scan stops at the
    /// first bound strictly below `value`. `+Inf` and `_count` are incremented
    /// by one and `value` is added to `_sum`. Negative observations are
    /// accepted and lower the sum.
    pub fn observe(&self, value: f64) -> Result<()> {
        let _guard = self.lock.lock();
        let finite = &self.ordered[..self.buckets.len()];
        for (bound, sample) in self.buckets.iter().zip(finite).rev() {
            if *bound < value {
                break;
            }
            sample.add(1.0)?;
        }
        let tail = &self.ordered[self.buckets.len()..];
        tail[0].add(1.0)?;
        tail[1].add(1.0)?;
        tail[2].update(|sum| sum + value);
        Ok(())
    }

    /// The bucket layout.
    pub fn buckets(&self) -> &BucketSet {
        &self.buckets
    }

    /// Cumulative count of the bucket with the given bound, if it exists.
    pub fn bucket_value(&self, bound: f64) -> Option<f64> {
        self.sample_for_key(&format_bound(bound)).map(|s| s.value())
    }

    /// Total number of observations, as reported by the `+Inf` bucket.
    pub fn inf_value(&self) -> f64 {
        self.ordered[self.buckets.len()].value()
    }

    /// Total number of observations, as reported by `_count`.
    pub fn count(&self) -> f64 {
        self.ordered[self.buckets.len() + 1].value()
    }

    /// Sum of all observed values.
    pub fn sum(&self) -> f64 {
        self.ordered[self.buckets.len() + 2].value()
    }

    /// The l-value for a bucket (formatted bound or `+Inf`), `count` or `sum`.
    pub fn l_value_for(&self, key: &str) -> Option<String> {
        self.l_values.get(key)
    }

    /// Looks up a sample by its full l-value.
    pub fn sample(&self, l_value: &str) -> Option<Arc<Sample>> {
        self.samples.get(l_value)
    }

    fn sample_for_key(&self, key: &str) -> Option<Arc<Sample>> {
        self.l_values.get(key).and_then(|l_value| self.samples.get(&l_value))
    }

    /// Every sample in exposition order.
    pub fn samples(&self) -> &[Arc<Sample>] {
        &self.ordered
    }
}

impl Debug for HistogramSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ordered.iter()).finish()
    }
}
