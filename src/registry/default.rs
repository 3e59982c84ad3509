//! The process-wide default registry.
//!
//! [`init_default`] creates a registry named `default`, with process metrics
//! enabled when procfs is available. It is idempotent: later calls return the
//! same registry. [`destroy_default`] tears it down and allows a fresh
//! [`init_default`].
//!
//! ```rust
//! use metrica::metric::{Gauge, Opts};
//! use metrica::registry::default;
//!
//! let registry = default::init_default().unwrap();
//! let gauge = default::must_register_metric(Gauge::new(Opts::new("workers", "Busy workers.")).unwrap());
//! gauge.set(3.0, &[]).unwrap();
//! assert!(registry.bridge().unwrap().contains("workers 3\n"));
//!
//! default::destroy_default();
//! assert!(default::default_registry().is_none());
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{registration_failed, Registry};
use crate::error::{MetricError, Result};
use crate::metric::Metric;

/// Name of the default registry.
pub const DEFAULT_REGISTRY_NAME: &str = "default";

static DEFAULT_REGISTRY: Lazy<RwLock<Option<Arc<Registry>>>> = Lazy::new(|| RwLock::new(None));

/// Creates the default registry if needed and returns it.
///
/// On first initialization process metrics are attempted; if procfs cannot
/// be read a warning is logged and the registry is returned without them.
pub fn init_default() -> Result<Arc<Registry>> {
    if let Some(registry) = DEFAULT_REGISTRY.read().as_ref() {
        return Ok(Arc::clone(registry));
    }
    let mut slot = DEFAULT_REGISTRY.write();
    if let Some(registry) = slot.as_ref() {
        return Ok(Arc::clone(registry));
    }
    let registry = Arc::new(Registry::new(DEFAULT_REGISTRY_NAME));
    if let Err(err) = registry.enable_process_metrics() {
        warn!(error = %err, "process metrics unavailable");
    }
    debug!(registry = DEFAULT_REGISTRY_NAME, "default registry initialized");
    *slot = Some(Arc::clone(&registry));
    Ok(registry)
}

/// The default registry, if initialized.
pub fn default_registry() -> Option<Arc<Registry>> {
    DEFAULT_REGISTRY.read().clone()
}

/// Removes and tears down the default registry. A no-op if absent.
///
/// Handles obtained earlier stay valid but see an empty registry.
pub fn destroy_default() {
    let taken = DEFAULT_REGISTRY.write().take();
    if let Some(registry) = taken {
        match Arc::try_unwrap(registry) {
            Ok(registry) => registry.destroy(),
            Err(shared) => shared.teardown(),
        }
    }
}

fn require_default() -> Result<Arc<Registry>> {
    default_registry()
        .ok_or_else(|| MetricError::NotFound("default registry is not initialized".to_string()))
}

/// Registers `metric` with the default registry.
///
/// # Errors
///
/// [`MetricError::NotFound`] if [`init_default`] has not been called, plus
/// everything [`Registry::register_metric`] reports.
pub fn register_metric(metric: impl Into<Arc<Metric>>) -> Result<()> {
    require_default()?.register_metric(metric)
}

/// Registers `metric` with the default registry and hands it back.
///
/// Aborts the process if the default registry is not initialized or
/// registration fails.
pub fn must_register_metric<M>(metric: M) -> M
where
    M: Clone + Into<Arc<Metric>>,
{
    match require_default() {
        Ok(registry) => registry.must_register_metric(metric),
        Err(err) => registration_failed(DEFAULT_REGISTRY_NAME, &err),
    }
}
