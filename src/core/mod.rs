// Core types
pub mod types;
pub use types::*;

// Error taxonomy
pub mod error;

// Resource-allocation graph
pub mod graph;

// Vertex interning
pub mod registry;

// Mutex event hooks over the global detector state
pub mod hooks;

// Background cycle scanner
pub mod monitor;

// Event logging
pub mod logger;
pub use logger::init_logger;

// Tracked wrappers for hosts without symbol interposition
pub mod tracked_mutex;
pub use tracked_mutex::TrackedMutex;

pub mod tracked_thread;
pub use tracked_thread::TrackedThread;

use crate::core::error::DetectorError;
use crate::core::monitor::MonitorHandle;
use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use std::time::Duration;

// The running monitor, if any. One monitor per process.
lazy_static::lazy_static! {
    static ref MONITOR: Mutex<Option<MonitorHandle>> = Mutex::new(None);
}

/// Write one diagnostic line per detected cycle to stderr.
///
/// Format: timestamp, implicated thread, then the ordered cycle of
/// alternating thread and mutex vertices.
pub(crate) fn report_to_stderr(info: &DeadlockInfo) {
    let cycle = info
        .cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    eprintln!(
        "[{}] lockgraph: potential deadlock involving Thread {}: {}",
        info.timestamp, info.thread_id, cycle
    );
}

/// Lockgraph configuration builder
///
/// ```no_run
/// use lockgraph::Lockgraph;
///
/// Lockgraph::new()
///     .callback(|info| eprintln!("deadlock: {:?}", info.cycle))
///     .start()
///     .expect("failed to start detector");
/// ```
pub struct Lockgraph {
    log_path: Option<String>,
    period: Duration,
    callback: Box<dyn Fn(DeadlockInfo) + Send + 'static>,
}

impl Default for Lockgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockgraph {
    /// Create a builder with default settings
    ///
    /// By default:
    /// - Event logging is disabled
    /// - The monitor scans once per second
    /// - Detected cycles are reported as a line on stderr
    pub fn new() -> Self {
        Lockgraph {
            log_path: None,
            period: DEFAULT_MONITOR_PERIOD,
            callback: Box::new(|info| report_to_stderr(&info)),
        }
    }

    /// Enable the event log and set its file path
    ///
    /// A `{timestamp}` placeholder in the path is replaced with the current
    /// timestamp.
    pub fn with_log<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Set how often the monitor scans the graph for cycles
    pub fn monitor_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set a custom callback to be invoked once per detected cycle
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(DeadlockInfo) + Send + 'static,
    {
        self.callback = Box::new(callback);
        self
    }

    /// Start the detector: initialize logging if configured and spawn the
    /// monitor thread.
    ///
    /// # Errors
    /// Returns an error if the logger cannot be initialized or a monitor is
    /// already running.
    pub fn start(self) -> Result<()> {
        let mut slot = MONITOR.lock();
        if slot.is_some() {
            bail!("lockgraph detector is already running");
        }

        if let Some(log_path) = self.log_path {
            init_logger(Some(log_path)).context("Failed to initialize event logger")?;
        }

        hooks::force_init();
        *slot = Some(monitor::spawn(self.period, self.callback));
        Ok(())
    }
}

/// Stop the monitor started by [`Lockgraph::start`].
///
/// Raises the monitor's stop flag and joins its thread. The graph and the
/// hooks keep working; only the periodic scan stops.
pub fn shutdown() -> std::result::Result<(), DetectorError> {
    let handle = MONITOR.lock().take().ok_or(DetectorError::NotReady)?;
    handle.shutdown();
    if let Err(e) = logger::flush_logs() {
        eprintln!("lockgraph: failed to flush event log: {e:?}");
    }
    Ok(())
}

/// Install an already-spawned monitor as the process monitor, if none runs.
///
/// Used by the preload bootstrap, which starts the monitor itself.
#[cfg(all(unix, feature = "preload"))]
pub(crate) fn install_monitor(handle: MonitorHandle) {
    let mut slot = MONITOR.lock();
    if slot.is_none() {
        *slot = Some(handle);
    }
}
