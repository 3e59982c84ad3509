//! Unified error type for the whole crate.
//!
//! Every fallible operation (sample updates, metric construction, registration,
//! process statistics, snapshots) reports a [`MetricError`], so callers can use
//! a single [`Result`] alias regardless of which layer failed.
//!
//! # Example
//!
//! ```rust
//! use metrica::error::{MetricError, Result};
//! use metrica::metric::{Counter, Opts};
//!
//! fn record() -> Result<()> {
//!     let counter = Counter::new(Opts::new("jobs_total", "Jobs processed."))?;
//!     counter.add(-1.0, &[]).or_else(|err| match err {
//!         MetricError::InvalidArgument(_) => Ok(()),
//!         other => Err(other),
//!     })
//! }
//! # record().unwrap();
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Error type for all metric, collector and registry operations.
#[derive(Debug, Error)]
pub enum MetricError {
    /// A caller supplied a value the operation cannot accept: a negative
    /// counter increment, the wrong metric kind, a reserved label, a
    /// decreasing bucket layout or a malformed metric name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A metric or collector with the same name is already registered.
    #[error("{kind} already registered: {name}")]
    AlreadyRegistered {
        /// What was being registered (`"metric"` or `"collector"`).
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// A structure that must exist is missing (for example the default
    /// collector, or the default registry before initialization).
    #[error("not found: {0}")]
    NotFound(String),

    /// A lock could not be acquired.
    ///
    /// `parking_lot` locks neither fail nor poison, so nothing in this crate
    /// currently produces this variant; it is kept so embedders wrapping
    /// fallible locks share the same taxonomy.
    #[error("lock failure: {0}")]
    LockFailure(String),

    /// Reading a procfs file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file or directory that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A procfs file was read but its contents could not be understood.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// The file that was being parsed.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Error from the JSON snapshot encoder.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetricError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MetricError::InvalidArgument(msg.into())
    }

    pub(crate) fn metric_registered(name: impl Into<String>) -> Self {
        MetricError::AlreadyRegistered {
            kind: "metric",
            name: name.into(),
        }
    }

    pub(crate) fn collector_registered(name: impl Into<String>) -> Self {
        MetricError::AlreadyRegistered {
            kind: "collector",
            name: name.into(),
        }
    }

    /// Returns `true` for [`MetricError::AlreadyRegistered`].
    pub fn is_already_registered(&self) -> bool {
        matches!(self, MetricError::AlreadyRegistered { .. })
    }

    /// Returns `true` for [`MetricError::InvalidArgument`].
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, MetricError::InvalidArgument(_))
    }
}

/// Result type for metric operations.
pub type Result<T> = std::result::Result<T, MetricError>;
