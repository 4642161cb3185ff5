//! Append-only audit log of facade calls.
//!
//! Each call produces exactly one line:
//!
//! ```text
//! 2024-01-15T09:30:00.125Z | INFO | lookup_mcap | P: (1234, 2024-01-15) | Time: 0.42ms | Status: SUCCESS
//! 2024-01-15T09:30:01.002Z | ERROR | lookup_sector | P: (9999, 2024-01-15) | Time: 0.31ms | Status: FAILURE | Error: Data not found.
//! ```
//!
//! Writing the log must never fail the call being logged, so [`CallLog::record`]
//! is infallible: sinks report their own failures through `tracing`.

use chrono::{DateTime, SecondsFormat, Utc};
use mcapdb_core::{LookupError, LookupResult, Result};
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Whether a call produced a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call returned a value.
    Success,
    /// The call returned a sentinel; carries the reason.
    Failure(String),
}

impl From<&LookupResult> for CallOutcome {
    fn from(result: &LookupResult) -> Self {
        result
            .error_message()
            .map_or(Self::Success, Self::Failure)
    }
}

/// One logged facade call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// When the call finished.
    pub timestamp: DateTime<Utc>,
    /// Facade function name.
    pub function: String,
    /// Arguments as received, rendered as text.
    pub arguments: Vec<String>,
    /// Wall time spent inside the facade.
    pub elapsed: Duration,
    /// Result of the call.
    pub outcome: CallOutcome,
}

impl CallRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        function: impl Into<String>,
        arguments: Vec<String>,
        elapsed: Duration,
        outcome: CallOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            function: function.into(),
            arguments,
            elapsed,
            outcome,
        }
    }

    /// Returns true if the call produced a value.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, CallOutcome::Success)
    }

    /// Render the record as a single log line (without the trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        let level = if self.is_success() { "INFO" } else { "ERROR" };
        let mut line = format!(
            "{} | {level} | {} | P: ({}) | Time: {:.2}ms | Status: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.function,
            single_line(&self.arguments.join(", ")),
            self.elapsed.as_secs_f64() * 1000.0,
            if self.is_success() { "SUCCESS" } else { "FAILURE" },
        );
        if let CallOutcome::Failure(message) = &self.outcome {
            line.push_str(" | Error: ");
            line.push_str(&single_line(message));
        }
        line
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Destination for call records.
pub trait CallLog: Send + Sync + Debug {
    /// Persist one record. Failures are handled by the sink and never surface here.
    fn record(&self, record: &CallRecord);

    /// Flush buffered records to durable storage.
    fn flush(&self) {}
}

/// Size-rotated, append-only call log file.
///
/// Every record is flushed and synced before [`CallLog::record`] returns. When
/// appending would grow the file past `max_bytes`, the file rolls over:
/// `log` becomes `log.1`, `log.1` becomes `log.2`, and so on up to
/// `backup_count`; the oldest backup is discarded.
///
/// If the active file cannot be reopened after a rollover, records fail until a
/// later append manages to reopen it; nothing is written into a backup.
#[derive(Debug)]
pub struct FileCallLog {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    file: Mutex<Option<File>>,
    failures: AtomicU64,
}

impl FileCallLog {
    /// Open (or create) the log file for appending.
    ///
    /// # Errors
    /// Returns [`LookupError::Logging`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, backup_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path).map_err(|e| {
            LookupError::Logging(format!("cannot open {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), max_bytes, backup_count, "Opened call log");
        Ok(Self {
            path,
            max_bytes,
            backup_count,
            file: Mutex::new(Some(file)),
            failures: AtomicU64::new(0),
        })
    }

    /// Path of the active log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records that could not be written.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    /// The open handle, reopening the active path if a previous rollover lost it.
    fn active<'a>(&self, slot: &'a mut Option<File>) -> io::Result<&'a mut File> {
        if slot.is_none() {
            *slot = Some(open_append(&self.path)?);
            debug!(path = %self.path.display(), "Reopened call log");
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::other("call log handle unavailable"))
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let mut slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        let incoming = line.len() as u64 + 1;
        let current = self.active(&mut slot)?.metadata()?.len();
        if current > 0 && current + incoming > self.max_bytes {
            self.rotate(&mut slot)?;
        }

        let file = self.active(&mut slot)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        file.sync_data()
    }

    fn rotate(&self, slot: &mut Option<File>) -> io::Result<()> {
        if self.backup_count == 0 {
            return self.active(slot)?.set_len(0);
        }

        for index in (1..self.backup_count).rev() {
            let source = self.backup_path(index);
            if source.exists() {
                fs::rename(&source, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;
        // The old handle now refers to the first backup.
        *slot = None;
        *slot = Some(open_append(&self.path)?);

        debug!(path = %self.path.display(), "Rotated call log");
        Ok(())
    }
}

impl CallLog for FileCallLog {
    fn record(&self, record: &CallRecord) {
        if let Err(e) = self.append(&record.to_line()) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                path = %self.path.display(),
                function = %record.function,
                error = %e,
                "Failed to write call log entry"
            );
        }
    }

    fn flush(&self) {
        let slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Err(e)) = slot.as_ref().map(File::sync_all) {
            warn!(path = %self.path.display(), error = %e, "Failed to flush call log");
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// In-memory call log for tests and embedding hosts that ship records elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCallLog {
    records: Mutex<Vec<CallRecord>>,
}

impl MemoryCallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<CallRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CallLog for MemoryCallLog {
    fn record(&self, record: &CallRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
