//! Serializable point-in-time captures of a registry.
//!
//! [`Registry::snapshot`] collects every metric the same way
//! [`bridge`](Registry::bridge) does, but returns plain data instead of
//! exposition text, so it can be encoded with any serde format.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature; [`RegistrySnapshot::to_json`]
//! additionally requires `json`:
//!
//! ```toml
//! [dependencies]
//! metrica = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use metrica::metric::{Counter, Opts};
//! use metrica::registry::Registry;
//!
//! let registry = Registry::new("app");
//! let counter = registry.must_register_metric(
//!     Counter::new(Opts::new("requests_total", "Requests.")).unwrap(),
//! );
//! counter.add(42.0, &[]).unwrap();
//!
//! let snapshot = registry.snapshot().unwrap();
//! let family = snapshot.get("requests_total").unwrap();
//! assert_eq!(family.samples[0].l_value, "requests_total");
//! assert_eq!(family.samples[0].value, 42.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metric::{Metric, MetricSample};
use crate::registry::Registry;
use crate::sample::{MetricKind, Sample};

/// One exposition line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleSnapshot {
    /// Rendered left-hand side, labels included.
    pub l_value: String,
    /// Value at capture time.
    pub value: f64,
}

impl From<&Sample> for SampleSnapshot {
    fn from(sample: &Sample) -> Self {
        SampleSnapshot {
            l_value: sample.l_value().to_string(),
            value: sample.value(),
        }
    }
}

/// One metric family with all of its samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilySnapshot {
    /// Metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Samples in exposition order; histogram groups are flattened.
    pub samples: Vec<SampleSnapshot>,
}

impl From<&Metric> for FamilySnapshot {
    fn from(metric: &Metric) -> Self {
        let mut samples = Vec::new();
        for entry in metric.samples() {
            match entry {
                MetricSample::Scalar(sample) => samples.push(SampleSnapshot::from(&*sample)),
                MetricSample::Histogram(histogram) => samples.extend(
                    histogram
                        .samples()
                        .iter()
                        .map(|sample| SampleSnapshot::from(&**sample)),
                ),
            }
        }
        FamilySnapshot {
            name: metric.name().to_string(),
            help: metric.help().to_string(),
            kind: metric.kind(),
            samples,
        }
    }
}

/// Every family of a registry, in exposition order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySnapshot {
    /// Registry name.
    pub name: String,
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_ms: Option<u64>,
    /// Metric families.
    pub families: Vec<FamilySnapshot>,
}

impl RegistrySnapshot {
    /// Attaches a capture timestamp.
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Finds a family by name.
    pub fn get(&self, name: &str) -> Option<&FamilySnapshot> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Encodes the snapshot as JSON.
    #[cfg(feature = "json")]
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }
}

impl Registry {
    /// Captures every collector's metrics.
    ///
    /// # Errors
    ///
    /// Propagates the first collector failure, like [`bridge`](Registry::bridge).
    pub fn snapshot(&self) -> Result<RegistrySnapshot> {
        let families = self.with_collectors(|collectors| {
            let mut families = Vec::new();
            for collector in collectors {
                for metric in collector.collect()? {
                    families.push(FamilySnapshot::from(&*metric));
                }
            }
            Ok(families)
        })?;
        Ok(RegistrySnapshot {
            name: self.name().to_string(),
            timestamp_ms: None,
            families,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::BucketSet;
    use crate::metric::{Gauge, Histogram, Opts};

    fn populated() -> Registry {
        let registry = Registry::new("snap");
        let gauge = registry.must_register_metric(
            Gauge::new(Opts::new("temperature", "Degrees.").with_label_keys(["room"])).unwrap(),
        );
        gauge.set(19.5, &["hall"]).unwrap();
        let histogram = registry.must_register_metric(
            Histogram::with_bounds(Opts::new("size", "Sizes."), vec![1.0, 10.0]).unwrap(),
        );
        histogram.observe(4.0, &[]).unwrap();
        registry
    }

    #[test]
    fn test_snapshot_families() {
        let snapshot = populated().snapshot().unwrap();
        assert_eq!(snapshot.name, "snap");
        assert_eq!(snapshot.families.len(), 2);

        let temperature = snapshot.get("temperature").unwrap();
        assert_eq!(temperature.kind, MetricKind::Gauge);
        assert_eq!(
            temperature.samples,
            vec![SampleSnapshot {
                l_value: r#"temperature{room="hall"}"#.to_string(),
                value: 19.5,
            }]
        );

        let size = snapshot.get("size").unwrap();
        let values: Vec<f64> = size.samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 1.0, 1.0, 4.0]);
        assert_eq!(size.samples[2].l_value, r#"size{le="+Inf"}"#);
        assert!(snapshot.get("missing").is_none());
    }

    #[test]
    fn test_family_from_metric() {
        let gauge = Gauge::new(Opts::new("g", "h")).unwrap();
        gauge.set(1.0, &[]).unwrap();
        let family = FamilySnapshot::from(&**gauge.metric());
        assert_eq!(family.name, "g");
        assert_eq!(family.help, "h");
        assert_eq!(family.samples.len(), 1);
    }

    #[test]
    fn test_with_timestamp() {
        let snapshot = Registry::new("t").snapshot().unwrap().with_timestamp(1234567890);
        assert_eq!(snapshot.timestamp_ms, Some(1234567890));
    }

    #[test]
    fn test_histogram_without_observations() {
        let registry = Registry::new("t");
        registry
            .register_metric(Histogram::new(Opts::new("h", "h"), Some(BucketSet::default())).unwrap())
            .unwrap();
        let snapshot = registry.snapshot().unwrap();
        assert!(snapshot.get("h").unwrap().samples.is_empty());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json() {
        let json = populated().snapshot().unwrap().to_json(false).unwrap();
        assert!(json.starts_with(r#"{"name":"snap","families":["#));
        assert!(json.contains(r#""kind":"gauge""#));
        assert!(json.contains(r#""value":19.5"#));

        let pretty = populated().snapshot().unwrap().to_json(true).unwrap();
        assert!(pretty.contains('\n'));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_round_trip() {
        let snapshot = populated().snapshot().unwrap().with_timestamp(7);
        let json = snapshot.to_json(false).unwrap();
        let decoded: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
    }
}
