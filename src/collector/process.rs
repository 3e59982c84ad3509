//! Standard `process_*` metrics read from procfs.
//!
//! On every collection [`ProcessCollector`] re-reads
//!
//! - `/proc/self/limits` for the open-file and address-space soft limits,
//! - `/proc/self/stat` for CPU time, memory usage and start time,
//! - `/proc/self/fd` for the number of open descriptors,
//! - `/proc/stat` for the boot time the start time is relative to,
//!
//! and updates seven gauges before handing them to the formatter. All paths
//! can be redirected through [`ProcessPaths`], which is how the parsers are
//! tested without a real procfs.
//!
//! The parsers themselves ([`parse_limits`], [`parse_stat`],
//! [`parse_boot_time`]) are pure functions over file contents.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use super::{Collect, Collector};
use crate::error::{MetricError, Result};
use crate::map::ConcurrentMap;
use crate::metric::{Gauge, Metric, Opts};

/// Name under which the process collector is registered.
pub const PROCESS_COLLECTOR_NAME: &str = "process";

const FALLBACK_CLK_TCK: f64 = 100.0;
const FALLBACK_PAGE_SIZE: f64 = 4096.0;

/// Where the process collector reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPaths {
    /// Resource limits table, `/proc/self/limits` by default.
    pub limits: PathBuf,
    /// Process status line, `/proc/self/stat` by default.
    pub stat: PathBuf,
    /// Open descriptor directory, `/proc/self/fd` by default.
    pub fd_dir: PathBuf,
    /// Kernel statistics holding `btime`, `/proc/stat` by default.
    pub kernel_stat: PathBuf,
}

impl Default for ProcessPaths {
    fn default() -> Self {
        ProcessPaths {
            limits: PathBuf::from("/proc/self/limits"),
            stat: PathBuf::from("/proc/self/stat"),
            fd_dir: PathBuf::from("/proc/self/fd"),
            kernel_stat: PathBuf::from("/proc/stat"),
        }
    }
}

impl ProcessPaths {
    /// Overrides the limits file.
    pub fn with_limits_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.limits = path.into();
        self
    }

    /// Overrides the stat file.
    pub fn with_stat_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stat = path.into();
        self
    }

    /// Overrides the descriptor directory.
    pub fn with_fd_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.fd_dir = path.into();
        self
    }

    /// Overrides the kernel stat file.
    pub fn with_kernel_stat_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_stat = path.into();
        self
    }
}

/// One side of a resource limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitValue {
    /// A finite limit.
    Limited(u64),
    /// `unlimited`.
    Unlimited,
}

impl LimitValue {
    /// The value as exposed: `unlimited` becomes `-1`.
    pub fn as_f64(&self) -> f64 {
        match self {
            LimitValue::Limited(v) => *v as f64,
            LimitValue::Unlimited => -1.0,
        }
    }

    fn parse(token: &str) -> Option<Self> {
        if token == "unlimited" {
            Some(LimitValue::Unlimited)
        } else {
            token.parse().ok().map(LimitValue::Limited)
        }
    }
}

/// A row of `/proc/self/limits`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRow {
    /// Limit name, e.g. `Max open files`.
    pub name: String,
    /// Soft limit.
    pub soft: LimitValue,
    /// Hard limit.
    pub hard: LimitValue,
    /// Unit column, absent for some rows.
    pub units: Option<String>,
}

/// Parses the contents of `/proc/self/limits`.
///
/// The header line is skipped. In every other row the name runs until the
/// first token that is a number or `unlimited`; the soft limit, hard limit
/// and optional unit follow.
///
/// ```rust
/// use metrica::collector::process::{parse_limits, LimitValue};
///
/// let rows = parse_limits(
///     "Limit                     Soft Limit           Hard Limit           Units\n\
///      Max open files            1024                 4096                 files\n\
///      Max address space         unlimited            unlimited            bytes\n",
/// )
/// .unwrap();
/// assert_eq!(rows[0].name, "Max open files");
/// assert_eq!(rows[0].soft, LimitValue::Limited(1024));
/// assert_eq!(rows[1].hard, LimitValue::Unlimited);
/// ```
pub fn parse_limits(content: &str) -> std::result::Result<Vec<LimitRow>, String> {
    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (line_no == 0 && line.starts_with("Limit")) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let first_value = tokens
            .iter()
            .position(|t| LimitValue::parse(t).is_some())
            .ok_or_else(|| format!("line {}: no limit values", line_no + 1))?;
        if first_value == 0 {
            return Err(format!("line {}: missing limit name", line_no + 1));
        }
        let soft = LimitValue::parse(tokens[first_value])
            .ok_or_else(|| format!("line {}: bad soft limit", line_no + 1))?;
        let hard = tokens
            .get(first_value + 1)
            .and_then(|t| LimitValue::parse(t))
            .ok_or_else(|| format!("line {}: bad hard limit", line_no + 1))?;
        rows.push(LimitRow {
            name: tokens[..first_value].join(" "),
            soft,
            hard,
            units: tokens.get(first_value + 2).map(|u| u.to_string()),
        });
    }
    Ok(rows)
}

/// Fields of `/proc/self/stat` the collector uses. Times are in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcStat {
    /// User-mode CPU time (field 14).
    pub utime: u64,
    /// Kernel-mode CPU time (field 15).
    pub stime: u64,
    /// Start time after boot (field 22).
    pub starttime: u64,
    /// Virtual memory size in bytes (field 23).
    pub vsize: u64,
    /// Resident set size in pages (field 24).
    pub rss: i64,
}

/// Parses the contents of `/proc/self/stat`.
///
/// Fields are counted after the last `)` so that a command name containing
/// spaces or parentheses does not shift them.
pub fn parse_stat(content: &str) -> std::result::Result<ProcStat, String> {
    let rest = content
        .rfind(')')
        .map(|i| &content[i + 1..])
        .ok_or_else(|| "missing command name".to_string())?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    Ok(ProcStat {
        utime: stat_field(&fields, 14)?,
        stime: stat_field(&fields, 15)?,
        starttime: stat_field(&fields, 22)?,
        vsize: stat_field(&fields, 23)?,
        rss: stat_field(&fields, 24)?,
    })
}

/// Parses 1-based field `n`; `fields[0]` is field 3 (state).
fn stat_field<T>(fields: &[&str], n: usize) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    fields
        .get(n - 3)
        .ok_or_else(|| format!("missing field {n}"))?
        .parse()
        .map_err(|e| format!("field {n}: {e}"))
}

/// Extracts `btime` (boot time, unix seconds) from `/proc/stat`.
pub fn parse_boot_time(content: &str) -> std::result::Result<u64, String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .ok_or_else(|| "no btime line".to_string())?
        .trim()
        .parse()
        .map_err(|e| format!("btime: {e}"))
}

#[cfg(unix)]
fn sysconf_or(name: libc::c_int, fallback: f64) -> f64 {
    // SAFETY: sysconf has no preconditions and only reads configuration.
    let value = unsafe { libc::sysconf(name) };
    if value > 0 {
        value as f64
    } else {
        fallback
    }
}

#[cfg(unix)]
fn clock_ticks() -> f64 {
    sysconf_or(libc::_SC_CLK_TCK, FALLBACK_CLK_TCK)
}

#[cfg(not(unix))]
fn clock_ticks() -> f64 {
    FALLBACK_CLK_TCK
}

#[cfg(unix)]
fn page_size() -> f64 {
    sysconf_or(libc::_SC_PAGESIZE, FALLBACK_PAGE_SIZE)
}

#[cfg(not(unix))]
fn page_size() -> f64 {
    FALLBACK_PAGE_SIZE
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| MetricError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_err(path: &Path) -> impl FnOnce(String) -> MetricError + '_ {
    move |reason| MetricError::Parse {
        path: path.to_path_buf(),
        reason,
    }
}

/// Refreshes and exposes the `process_*` gauges.
#[derive(Debug, Clone)]
pub struct ProcessCollector {
    paths: ProcessPaths,
    max_fds: Gauge,
    virtual_memory_max_bytes: Gauge,
    cpu_seconds_total: Gauge,
    virtual_memory_bytes: Gauge,
    resident_memory_bytes: Gauge,
    start_time_seconds: Gauge,
    open_fds: Gauge,
}

impl ProcessCollector {
    /// Creates the gauges, reading from `paths` on every collection.
    pub fn new(paths: ProcessPaths) -> Result<Self> {
        let gauge = |name: &str, help: &str| Gauge::new(Opts::new(name, help));
        Ok(ProcessCollector {
            paths,
            max_fds: gauge("process_max_fds", "Maximum number of open file descriptors.")?,
            virtual_memory_max_bytes: gauge(
                "process_virtual_memory_max_bytes",
                "Maximum amount of virtual memory available in bytes.",
            )?,
            cpu_seconds_total: gauge(
                "process_cpu_seconds_total",
                "Total user and system CPU time spent in seconds.",
            )?,
            virtual_memory_bytes: gauge("process_virtual_memory_bytes", "Virtual memory size in bytes.")?,
            resident_memory_bytes: gauge("process_resident_memory_bytes", "Resident memory size in bytes.")?,
            start_time_seconds: gauge(
                "process_start_time_seconds",
                "Start time of the process since unix epoch in seconds.",
            )?,
            open_fds: gauge("process_open_fds", "Number of open file descriptors.")?,
        })
    }

    /// The gauges in exposition order.
    pub fn gauges(&self) -> [&Gauge; 7] {
        [
            &self.max_fds,
            &self.virtual_memory_max_bytes,
            &self.cpu_seconds_total,
            &self.virtual_memory_bytes,
            &self.resident_memory_bytes,
            &self.start_time_seconds,
            &self.open_fds,
        ]
    }

    /// Paths this collector reads from.
    pub fn paths(&self) -> &ProcessPaths {
        &self.paths
    }

    /// Wraps this source in a [`Collector`] named [`PROCESS_COLLECTOR_NAME`]
    /// that holds its gauges.
    pub fn into_collector(self) -> Result<Collector> {
        let gauges: Vec<Gauge> = self.gauges().into_iter().cloned().collect();
        let collector = Collector::with_source(PROCESS_COLLECTOR_NAME, self);
        for gauge in gauges {
            collector.add_metric(gauge)?;
        }
        Ok(collector)
    }

    /// Re-reads procfs and updates every gauge.
    ///
    /// # Errors
    ///
    /// [`MetricError::Io`] if a file cannot be read, [`MetricError::Parse`]
    /// if its contents are malformed or a required limit row is missing.
    pub fn refresh(&self) -> Result<()> {
        let limits_path = &self.paths.limits;
        let limits = parse_limits(&read(limits_path)?).map_err(parse_err(limits_path))?;
        let soft_limit = |name: &str| {
            limits
                .iter()
                .find(|row| row.name == name)
                .map(|row| row.soft.as_f64())
                .ok_or_else(|| MetricError::Parse {
                    path: limits_path.clone(),
                    reason: format!("no {name:?} row"),
                })
        };
        self.max_fds.set(soft_limit("Max open files")?, &[])?;
        self.virtual_memory_max_bytes
            .set(soft_limit("Max address space")?, &[])?;

        let stat_path = &self.paths.stat;
        let stat = parse_stat(&read(stat_path)?).map_err(parse_err(stat_path))?;
        let kernel_path = &self.paths.kernel_stat;
        let boot_time = parse_boot_time(&read(kernel_path)?).map_err(parse_err(kernel_path))?;

        let ticks = clock_ticks();
        self.cpu_seconds_total
            .set((stat.utime + stat.stime) as f64 / ticks, &[])?;
        self.virtual_memory_bytes.set(stat.vsize as f64, &[])?;
        self.resident_memory_bytes
            .set(stat.rss as f64 * page_size(), &[])?;
        self.start_time_seconds
            .set(boot_time as f64 + stat.starttime as f64 / ticks, &[])?;

        let fd_dir = &self.paths.fd_dir;
        let open_fds = fs::read_dir(fd_dir)
            .map_err(|source| MetricError::Io {
                path: fd_dir.clone(),
                source,
            })?
            .count();
        self.open_fds.set(open_fds as f64, &[])?;

        debug!(open_fds, rss_pages = stat.rss, "process metrics refreshed");
        Ok(())
    }
}

impl Collect for ProcessCollector {
    fn collect(&self, metrics: &ConcurrentMap<Arc<Metric>>) -> Result<Vec<Arc<Metric>>> {
        self.refresh()?;
        Ok(metrics.values())
    }
}
