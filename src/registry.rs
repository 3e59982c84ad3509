//! The top-level registration surface and scrape entry point.
//!
//! A [`Registry`] is a named set of [`Collector`]s. It always contains a
//! collector named `default`, which is where [`Registry::register_metric`]
//! puts metrics. [`Registry::bridge`] renders every collector's metrics into
//! the text exposition format, ready to be served with
//! [`CONTENT_TYPE`](crate::exposition::CONTENT_TYPE).
//!
//! Registration and scraping are serialized against each other: a scrape
//! always sees a consistent set of collectors and metrics, and metrics
//! registered during a scrape show up in the next one.
//!
//! A process-wide registry is available through the [`default`] module.
//!
//! # Example
//!
//! ```rust
//! use metrica::metric::{Counter, Opts};
//! use metrica::registry::Registry;
//!
//! let registry = Registry::new("app");
//! let counter = registry.must_register_metric(
//!     Counter::new(Opts::new("test_counter", "counter under test").with_label_keys(["label"]))
//!         .unwrap(),
//! );
//! counter.inc(&["foo"]).unwrap();
//! counter.inc(&["foo"]).unwrap();
//!
//! let text = registry.bridge().unwrap();
//! assert!(text.contains("test_counter{label=\"foo\"} 2\n"));
//! ```

pub mod default;

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::collector::process::{ProcessCollector, ProcessPaths};
use crate::collector::Collector;
use crate::error::{MetricError, Result};
use crate::exposition::TextFormatter;
use crate::map::ConcurrentMap;
use crate::metric::{self, Metric};

/// Name of the collector every registry starts with.
pub const DEFAULT_COLLECTOR_NAME: &str = "default";

/// Named set of collectors.
pub struct Registry {
    name: String,
    collectors: ConcurrentMap<Arc<Collector>>,
    formatter: Mutex<TextFormatter>,
    /// Held shared by `bridge`, exclusively by registration.
    gate: RwLock<()>,
}

impl Registry {
    /// Creates a registry holding an empty `default` collector.
    pub fn new(name: impl Into<String>) -> Self {
        let collectors = ConcurrentMap::new();
        collectors.set(
            DEFAULT_COLLECTOR_NAME,
            Arc::new(Collector::new(DEFAULT_COLLECTOR_NAME)),
        );
        Registry {
            name: name.into(),
            collectors,
            formatter: Mutex::new(TextFormatter::new()),
            gate: RwLock::new(()),
        }
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `metric` to the `default` collector.
    ///
    /// # Errors
    ///
    /// [`MetricError::AlreadyRegistered`] if the name is taken (the existing
    /// metric is untouched), [`MetricError::NotFound`] if the `default`
    /// collector was unregistered.
    pub fn register_metric(&self, metric: impl Into<Arc<Metric>>) -> Result<()> {
        let _gate = self.gate.write();
        let collector = self.collectors.get(DEFAULT_COLLECTOR_NAME).ok_or_else(|| {
            MetricError::NotFound(format!("{}: default collector", self.name))
        })?;
        collector.add_metric(metric)
    }

    /// Registers `metric` and hands it back.
    ///
    /// A failed registration, e.g. a duplicate name, is logged and then
    /// aborts the process, whichever thread made the call.
    pub fn must_register_metric<M>(&self, metric: M) -> M
    where
        M: Clone + Into<Arc<Metric>>,
    {
        if let Err(err) = self.register_metric(metric.clone()) {
            registration_failed(&self.name, &err);
        }
        metric
    }

    /// Adds a collector.
    ///
    /// # Errors
    ///
    /// [`MetricError::AlreadyRegistered`] if a collector with the same name exists.
    pub fn register_collector(&self, collector: impl Into<Arc<Collector>>) -> Result<()> {
        let collector = collector.into();
        let name = collector.name().to_string();
        let _gate = self.gate.write();
        match self.collectors.insert_new(&name, collector) {
            Ok(()) => {
                debug!(registry = %self.name, collector = %name, "collector registered");
                Ok(())
            }
            Err(MetricError::AlreadyRegistered { .. }) => {
                warn!(registry = %self.name, collector = %name, "collector already registered");
                Err(MetricError::collector_registered(name))
            }
            Err(err) => Err(err),
        }
    }

    /// Removes a collector, returning it if it was present.
    pub fn unregister_collector(&self, name: &str) -> Option<Arc<Collector>> {
        let _gate = self.gate.write();
        let removed = self.collectors.take(name);
        if removed.is_some() {
            debug!(registry = %self.name, collector = %name, "collector unregistered");
        }
        removed
    }

    /// Looks up a collector by name.
    pub fn collector(&self, name: &str) -> Option<Arc<Collector>> {
        self.collectors.get(name)
    }

    /// Collector names in registration order.
    pub fn collector_names(&self) -> Vec<String> {
        self.collectors.keys()
    }

    /// Registers the `process` collector reading the standard procfs paths.
    ///
    /// # Errors
    ///
    /// Fails if procfs cannot be read or parsed (the collector is then not
    /// registered), or if a `process` collector already exists.
    pub fn enable_process_metrics(&self) -> Result<()> {
        self.enable_custom_process_metrics(ProcessPaths::default())
    }

    /// Registers the `process` collector reading from `paths`.
    ///
    /// The files are read once up front so that a missing or malformed
    /// source is reported here rather than on every scrape.
    pub fn enable_custom_process_metrics(&self, paths: ProcessPaths) -> Result<()> {
        let process = ProcessCollector::new(paths)?;
        process.refresh()?;
        self.register_collector(process.into_collector()?)
    }

    /// Checks a metric name against `^[a-zA-Z_:][a-zA-Z0-9_:]*$`.
    pub fn validate_metric_name(name: &str) -> Result<()> {
        metric::validate_metric_name(name)
    }

    /// Renders every collector's metrics in the text exposition format.
    ///
    /// Must not be called from inside a [`Collect`](crate::collector::Collect)
    /// source of this registry.
    ///
    /// # Errors
    ///
    /// Propagates the first collector failure; no partial text is returned.
    pub fn bridge(&self) -> Result<String> {
        let _gate = self.gate.read();
        let mut formatter = self.formatter.lock();
        formatter.clear();
        if let Err(err) = formatter.load_metrics(&self.collectors) {
            formatter.clear();
            error!(registry = %self.name, error = %err, "failed to collect metrics");
            return Err(err);
        }
        Ok(formatter.dump())
    }

    /// Runs `f` over the collectors in registration order, with registration
    /// held off until it returns.
    #[cfg(feature = "serde")]
    pub(crate) fn with_collectors<T>(&self, f: impl FnOnce(&[Arc<Collector>]) -> Result<T>) -> Result<T> {
        let _gate = self.gate.read();
        f(&self.collectors.values())
    }

    /// Tears the registry down, clearing every collector and metric.
    pub fn destroy(self) {
        self.teardown();
    }

    pub(crate) fn teardown(&self) {
        let _gate = self.gate.write();
        debug!(registry = %self.name, collectors = self.collectors.len(), "destroying registry");
        for collector in self.collectors.values() {
            collector.clear();
        }
        self.collectors.clear();
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("collectors", &self.collectors.keys())
            .finish()
    }
}

/// Terminates the process after a failed `must_register_metric`.
pub(crate) fn registration_failed(registry: &str, err: &MetricError) -> ! {
    error!(registry, error = %err, "failed to register metric, aborting");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::BucketSet;
    use crate::collector::FnCollect;
    use crate::metric::{Counter, Gauge, Histogram, Opts};
    use std::thread;

    #[test]
    fn test_new_has_default_collector() {
        let registry = Registry::new("test");
        assert_eq!(registry.collector_names(), vec![DEFAULT_COLLECTOR_NAME]);
        assert!(registry.collector(DEFAULT_COLLECTOR_NAME).unwrap().is_empty());
    }

    #[test]
    fn test_bridge_labeled_counter() {
        let registry = Registry::new("test");
        let counter = Counter::new(
            Opts::new("test_counter", "counter under test").with_label_keys(["label"]),
        )
        .unwrap();
        registry.register_metric(counter.clone()).unwrap();
        counter.inc(&["foo"]).unwrap();
        counter.inc(&["foo"]).unwrap();

        assert_eq!(
            registry.bridge().unwrap(),
            "# HELP test_counter counter under test\n\
             # TYPE test_counter counter\n\
             test_counter{label=\"foo\"} 2\n\
             \n"
        );
    }

    #[test]
    fn test_bridge_resets_between_calls() {
        let registry = Registry::new("test");
        let gauge = registry.must_register_metric(Gauge::new(Opts::new("g", "h")).unwrap());
        gauge.set(1.0, &[]).unwrap();
        let first = registry.bridge().unwrap();
        gauge.set(2.0, &[]).unwrap();
        let second = registry.bridge().unwrap();
        assert!(first.contains("g 1\n"));
        assert!(second.contains("g 2\n"));
        assert!(!second.contains("g 1\n"));
    }

    #[test]
    fn test_bridge_full_histogram() {
        let registry = Registry::new("test");
        let histogram = registry.must_register_metric(
            Histogram::new(
                Opts::new("test_histogram", "histogram under test"),
                Some(BucketSet::linear(5.0, 5.0, 3).unwrap()),
            )
            .unwrap(),
        );
        for value in [1.0, 7.0, 11.0, 22.0] {
            histogram.observe(value, &[]).unwrap();
        }
        assert_eq!(
            registry.bridge().unwrap(),
            "# HELP test_histogram histogram under test\n\
             # TYPE test_histogram histogram\n\
             test_histogram{le=\"5.0\"} 1\n\
             test_histogram{le=\"10.0\"} 2\n\
             test_histogram{le=\"15.0\"} 3\n\
             test_histogram{le=\"+Inf\"} 4\n\
             test_histogram_count 4\n\
             test_histogram_sum 41\n\
             \n"
        );
    }

    #[test]
    fn test_duplicate_registration_keeps_samples() {
        let registry = Registry::new("test");
        let original = Counter::new(Opts::new("dup_total", "Original.")).unwrap();
        registry.register_metric(original.clone()).unwrap();
        original.add(7.0, &[]).unwrap();

        let err = registry
            .register_metric(Counter::new(Opts::new("dup_total", "Impostor.")).unwrap())
            .unwrap_err();
        assert!(err.is_already_registered());
        assert_eq!(original.get(&[]).unwrap(), 7.0);

        let text = registry.bridge().unwrap();
        assert!(text.contains("# HELP dup_total Original.\n"));
        assert!(text.contains("dup_total 7\n"));
    }

    const FATAL_CHILD_ENV: &str = "METRICA_FATAL_CHILD";

    /// Runs `body` in a re-executed copy of this test binary and asserts that
    /// the child process dies. `test_name` is the full path of the calling test.
    pub(super) fn assert_process_dies(test_name: &str, body: impl FnOnce()) {
        if std::env::var(FATAL_CHILD_ENV).as_deref() == Ok(test_name) {
            body();
            return;
        }
        let output = std::process::Command::new(std::env::current_exe().unwrap())
            .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
            .env(FATAL_CHILD_ENV, test_name)
            .output()
            .unwrap();
        assert!(
            !output.status.success(),
            "child survived: {}",
            String::from_utf8_lossy(&output.stdout)
        );
    }

    #[test]
    fn test_must_register_duplicate_aborts() {
        assert_process_dies("registry::tests::test_must_register_duplicate_aborts", || {
            let registry = Arc::new(Registry::new("test"));
            registry.must_register_metric(Gauge::new(Opts::new("g", "h")).unwrap());
            let worker = Arc::clone(&registry);
            // A worker thread failing must take the whole process down.
            let _ = thread::spawn(move || {
                worker.must_register_metric(Gauge::new(Opts::new("g", "h")).unwrap());
            })
            .join();
        });
    }

    #[test]
    fn test_register_collector() {
        let registry = Registry::new("test");
        let extra = Collector::new("extra");
        extra
            .add_metric(Gauge::new(Opts::new("extra_gauge", "h")).unwrap())
            .unwrap();
        registry.register_collector(extra).unwrap();

        let err = registry.register_collector(Collector::new("extra")).unwrap_err();
        assert!(matches!(
            err,
            MetricError::AlreadyRegistered { kind: "collector", .. }
        ));
        assert_eq!(registry.collector("extra").unwrap().len(), 1);

        assert!(registry.unregister_collector("extra").is_some());
        assert_eq!(registry.collector_names(), vec![DEFAULT_COLLECTOR_NAME]);
    }

    #[test]
    fn test_register_without_default_collector() {
        let registry = Registry::new("test");
        registry.unregister_collector(DEFAULT_COLLECTOR_NAME);
        let err = registry
            .register_metric(Gauge::new(Opts::new("g", "h")).unwrap())
            .unwrap_err();
        assert!(matches!(err, MetricError::NotFound(_)));
    }

    #[test]
    fn test_bridge_collector_failure() {
        let registry = Registry::new("test");
        registry
            .register_collector(Collector::with_source(
                "broken",
                FnCollect::new(|_: &ConcurrentMap<Arc<Metric>>| {
                    Err(MetricError::NotFound("upstream".into()))
                }),
            ))
            .unwrap();
        assert!(registry.bridge().is_err());

        registry.unregister_collector("broken");
        assert_eq!(registry.bridge().unwrap(), "");
    }

    #[test]
    fn test_validate_metric_name() {
        assert!(Registry::validate_metric_name("process_open_fds").is_ok());
        assert!(Registry::validate_metric_name("open fds").is_err());
    }

    #[test]
    fn test_concurrent_register_and_bridge() {
        let registry = Arc::new(Registry::new("test"));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..25 {
                        let gauge =
                            Gauge::new(Opts::new(format!("gauge_{t}_{i}"), "h")).unwrap();
                        gauge.set(1.0, &[]).unwrap();
                        registry.register_metric(gauge).unwrap();
                    }
                })
            })
            .collect();
        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..50 {
                    let text = registry.bridge().unwrap();
                    assert_eq!(text.matches("# HELP").count(), text.matches("# TYPE").count());
                }
            })
        };
        for handle in writers {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        let text = registry.bridge().unwrap();
        assert_eq!(text.matches("# TYPE").count(), 100);
    }

    #[test]
    fn test_destroy_clears_metrics() {
        let registry = Registry::new("test");
        let counter = registry.must_register_metric(
            Counter::new(Opts::new("c", "h").with_label_keys(["k"])).unwrap(),
        );
        counter.inc(&["v"]).unwrap();
        registry.destroy();
        assert_eq!(counter.sample_count(), 0);
    }

    #[test]
    fn test_enable_custom_process_metrics_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new("test");
        let paths = ProcessPaths::default().with_limits_path(dir.path().join("nope"));
        assert!(matches!(
            registry.enable_custom_process_metrics(paths),
            Err(MetricError::Io { .. })
        ));
        assert!(registry.collector("process").is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_enable_process_metrics() {
        let registry = Registry::new("test");
        registry.enable_process_metrics().unwrap();
        let text = registry.bridge().unwrap();
        assert!(text.contains("# TYPE process_open_fds gauge\n"));
        assert!(text.contains("process_max_fds "));
        assert!(registry.enable_process_metrics().unwrap_err().is_already_registered());
    }
}
