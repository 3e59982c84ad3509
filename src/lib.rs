//! # Metrica - Thread-Safe Prometheus Metrics
//!
//! A Rust library for instrumenting multi-threaded programs with counters,
//! gauges and histograms, and exposing them in the Prometheus text exposition
//! format (version 0.0.4).
//!
//! ## Architecture
//!
//! ```text
//! Registry ──▶ Collector ──▶ Metric ──▶ Sample / HistogramSample
//!    │             │            │
//!  bridge()     Collect      label values ──▶ l-value
//! ```
//!
//! - A [`Registry`](registry::Registry) holds named collectors and renders
//!   them with [`bridge`](registry::Registry::bridge).
//! - A [`Collector`](collector::Collector) holds metrics and a
//!   [`Collect`](collector::Collect) source that decides what a scrape sees.
//! - A [`Metric`](metric::Metric) is a named family; each distinct set of
//!   label values gets its own sample on first use.
//! - A [`Sample`](sample::Sample) is an `f64` cell updated with lock-free
//!   compare-and-swap, padded to its own cache line with
//!   [`crossbeam_utils::CachePadded`].
//!
//! Every lookup table is a [`ConcurrentMap`](map::ConcurrentMap): a
//! reader-writer locked, insertion-ordered string map. Once a label set has
//! been seen, updates to it never take a write lock.
//!
//! ## Metric Types
//!
//! | Type | Operations | Exposed as |
//! |------|------------|------------|
//! | [`Counter`](metric::Counter) | `inc`, `add` (non-negative) | `counter` |
//! | [`Gauge`](metric::Gauge) | `inc`, `dec`, `add`, `sub`, `set` | `gauge` |
//! | [`Histogram`](metric::Histogram) | `observe` | `histogram` (buckets, `+Inf`, `_count`, `_sum`) |
//!
//! ## Quick Start
//!
//! ```rust
//! use metrica::buckets::BucketSet;
//! use metrica::metric::{Counter, Histogram, Opts};
//! use metrica::registry::Registry;
//!
//! let registry = Registry::new("app");
//!
//! let requests = registry.must_register_metric(
//!     Counter::new(Opts::new("http_requests_total", "Requests served.").with_label_keys(["method"]))
//!         .unwrap(),
//! );
//! let latency = registry.must_register_metric(
//!     Histogram::new(
//!         Opts::new("http_request_seconds", "Request latency."),
//!         Some(BucketSet::exponential(0.01, 10.0, 3).unwrap()),
//!     )
//!     .unwrap(),
//! );
//!
//! requests.inc(&["GET"]).unwrap();
//! latency.observe(0.042, &[]).unwrap();
//!
//! let text = registry.bridge().unwrap();
//! assert!(text.contains("http_requests_total{method=\"GET\"} 1\n"));
//! assert!(text.contains("http_request_seconds{le=\"0.1\"} 1\n"));
//! ```
//!
//! ## Default Registry
//!
//! Programs that only need one registry can use the process-wide default,
//! which also exposes the standard `process_*` metrics where procfs exists:
//!
//! ```rust
//! use metrica::metric::{Gauge, Opts};
//!
//! let registry = metrica::init_default().unwrap();
//! let workers = metrica::must_register_metric(
//!     Gauge::new(Opts::new("busy_workers", "Workers handling a request.")).unwrap(),
//! );
//! workers.set(4.0, &[]).unwrap();
//!
//! // Serve `registry.bridge()` with this content type.
//! assert_eq!(metrica::CONTENT_TYPE, "text/plain; version=0.0.4");
//! assert!(registry.bridge().unwrap().contains("busy_workers 4\n"));
//! # metrica::destroy_default();
//! ```
//!
//! ## Thread Safety
//!
//! All handles are `Send + Sync` and cheap to clone. Registration and
//! scraping are serialized against each other, so a scrape never observes a
//! half-registered collector. A histogram observation updates all of its
//! samples under one lock, so `_count` always matches `+Inf`.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] (registration and teardown at `debug`,
//! duplicate registrations at `warn`, scrape failures at `error`) and never
//! installs a subscriber.
//!
//! ## Feature Flags
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `serde` | [`snapshot`] | Serializable registry snapshots |
//! | `json` | [`snapshot`] | Adds `RegistrySnapshot::to_json` |
//! | `full` | All of the above | |

pub mod buckets;
pub mod collector;
pub mod error;
pub mod exposition;
pub mod map;
pub mod metric;
pub mod registry;
pub mod sample;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use error::{MetricError, Result};
pub use exposition::CONTENT_TYPE;
pub use registry::default::{
    default_registry, destroy_default, init_default, must_register_metric, register_metric,
};
