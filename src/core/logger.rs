//! Event log of mutex and thread operations
//!
//! The detector can optionally record every hooked event as a JSON line. File
//! I/O runs on a dedicated writer thread fed through a channel, so the hooks
//! only pay for a channel send. The log is an audit trail of what the
//! detector observed; graph state is not logged, it is reconstructed from the
//! events.

use crate::core::types::{Events, MutexAddr, ThreadId};
use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const DEFAULT_LOG_PATH: &str = "lockgraph_{timestamp}.log";

/// A single logged event
#[derive(Debug, serde::Serialize, Clone)]
pub struct LogEntry {
    /// Thread that performed the action (0 for thread-less events)
    pub thread_id: ThreadId,
    /// Mutex that was involved (0 for thread-only events)
    pub mutex_addr: MutexAddr,
    /// Type of event that occurred
    pub event: Events,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Parent thread for spawn events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ThreadId>,
}

/// Commands for controlling the async logger thread
#[derive(Debug)]
enum LoggerCommand {
    LogEntry(LogEntry),
    Flush(Sender<()>),
}

/// Asynchronous JSON-lines event logger
pub struct EventLogger {
    sender: Sender<LoggerCommand>,
    flushing: Arc<AtomicBool>,
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Warning: failed to flush event log on drop: {e:?}");
        }
    }
}

impl EventLogger {
    /// Create a logger writing to `path`.
    ///
    /// A `{timestamp}` placeholder in the path is replaced with the current
    /// UTC time, and missing parent directories are created.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        if let Some(parent) = path_buf.parent()
            && parent.to_string_lossy() != ""
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        #[allow(clippy::literal_string_with_formatting_args)]
        let file_path = if path_buf.to_string_lossy().contains("{timestamp}") {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(
                path_buf
                    .to_string_lossy()
                    .replace("{timestamp}", &timestamp.to_string()),
            )
        } else {
            path_buf
        };

        let (tx, rx) = channel::<LoggerCommand>();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)?;

        let flushing = Arc::new(AtomicBool::new(false));
        let flushing_clone = Arc::clone(&flushing);

        thread::spawn(move || async_logger_thread(file, rx, flushing_clone));

        Ok(EventLogger {
            sender: tx,
            flushing,
        })
    }

    /// Record one event. Non-blocking; a closed channel only prints a warning.
    pub fn log_event(
        &self,
        thread_id: ThreadId,
        mutex_addr: MutexAddr,
        event: Events,
        parent_id: Option<ThreadId>,
    ) {
        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0;

        let entry = LogEntry {
            thread_id,
            mutex_addr,
            event,
            timestamp,
            parent_id,
        };

        if let Err(e) = self.sender.send(LoggerCommand::LogEntry(entry)) {
            eprintln!("Failed to send log entry: {e:?}");
        }
    }

    /// Block until all pending entries are on disk.
    pub fn flush(&self) -> Result<()> {
        // CAS so concurrent flushes collapse into one
        let already_flushing = self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();

        if already_flushing {
            return Ok(());
        }

        let result = (|| {
            let (flush_tx, flush_rx) = channel();
            self.sender.send(LoggerCommand::Flush(flush_tx))?;

            match flush_rx.recv_timeout(Duration::from_secs(10)) {
                Ok(_) => Ok(()),
                Err(_) => Err(anyhow::anyhow!("Flush operation timed out")),
            }
        })();

        self.flushing.store(false, Ordering::SeqCst);
        result
    }
}

fn async_logger_thread(file: File, rx: Receiver<LoggerCommand>, flushing: Arc<AtomicBool>) {
    let mut writer = BufWriter::new(file);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            LoggerCommand::LogEntry(entry) => {
                if let Ok(json) = serde_json::to_string(&entry)
                    && let Err(e) = writeln!(writer, "{json}").and_then(|_| writer.flush())
                {
                    eprintln!("Logger write error: {e:?}");
                }
            }
            LoggerCommand::Flush(responder) => {
                flushing.store(true, Ordering::Release);
                if let Err(e) = writer.flush() {
                    eprintln!("Logger flush error: {e:?}");
                }
                flushing.store(false, Ordering::Release);
                let _ = responder.send(());
            }
        }
    }

    // Channel closed, final flush before the thread exits
    if let Err(e) = writer.flush() {
        eprintln!("Logger final flush error: {e:?}");
    }
}

// Global logger instance; None until logging is enabled
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<Option<EventLogger>> = Mutex::new(None);
}
static LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable event logging, writing to `path` (or the default path on `None`).
pub fn init_logger(path: Option<String>) -> Result<()> {
    let logger = EventLogger::with_file(path.as_deref().unwrap_or(DEFAULT_LOG_PATH))?;
    *GLOBAL_LOGGER.lock() = Some(logger);
    LOGGING_ENABLED.store(true, Ordering::SeqCst);
    Ok(())
}

/// Cheap check the hooks make before building a log entry
pub fn is_logging_enabled() -> bool {
    LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// Log a thread spawn/exit event
pub fn log_thread_event(thread_id: ThreadId, parent_id: Option<ThreadId>, event: Events) {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_ref() {
        logger.log_event(thread_id, 0, event, parent_id);
    }
}

/// Log a thread-mutex interaction event
pub fn log_interaction_event(thread_id: ThreadId, mutex_addr: MutexAddr, event: Events) {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_ref() {
        logger.log_event(thread_id, mutex_addr, event, None);
    }
}

/// Flush the global logger, if logging is enabled
pub fn flush_logs() -> Result<()> {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_ref() {
        logger.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_basic_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("basic.log");

        let logger = EventLogger::with_file(&log_path).unwrap();

        logger.log_event(1, 0, Events::Spawn, None);
        logger.log_event(1, 0x10, Events::Attempt, None);
        logger.log_event(1, 0x10, Events::Acquired, None);
        logger.log_event(1, 0x10, Events::Released, None);

        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("\"thread_id\":1"));
        assert!(lines[0].contains("\"event\":\"Spawn\""));
        assert!(lines[1].contains("\"event\":\"Attempt\""));
    }

    #[test]
    fn test_flush_idempotence() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("flush_test.log");

        let logger = EventLogger::with_file(&log_path).unwrap();

        for i in 0..10 {
            logger.log_event(i, 0, Events::Spawn, None);
        }

        logger.flush().unwrap();
        logger.flush().unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }

    #[test]
    fn test_parent_id_serialized_only_when_present() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("parent.log");

        let logger = EventLogger::with_file(&log_path).unwrap();
        logger.log_event(2, 0, Events::Spawn, Some(1));
        logger.log_event(2, 0x20, Events::Attempt, None);
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[0].contains("\"parent_id\":1"));
        assert!(!lines[1].contains("parent_id"));
    }
}
