//! Storage traits and error types
//!
//! This module defines the trait interface for record sinks and
//! associated error types.

use crate::record::Record;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Sink not initialized")]
    NotInitialized,

    #[error("Sink already closed: {0}")]
    Closed(String),

    #[error("Failed to create output file {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sink lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Facts about the output file, reported in the run summary
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Append-only, durable destination for records
///
/// Implementations must make every appended record durable before
/// `append_record` returns, and must be safe to share between concurrent
/// fetch tasks.
pub trait RecordSink: Send + Sync {
    /// Creates the output file and writes the header
    ///
    /// When `path` is None a timestamped file name in the configured results
    /// directory is used. Returns the path actually written.
    fn initialize(&self, path: Option<&Path>) -> StorageResult<PathBuf>;

    /// Appends one record and syncs it to disk
    fn append_record(&self, record: &Record) -> StorageResult<()>;

    /// Checks that the file exists, is readable and carries the header
    fn verify_integrity(&self) -> bool;

    /// Counts data rows currently on disk, excluding the header
    fn count_persisted_records(&self) -> usize;

    /// Flushes and syncs everything written so far; no-op once closed
    fn force_sync(&self) -> StorageResult<()>;

    /// Performs the final sync and releases the file; safe to call repeatedly
    fn close(&self) -> StorageResult<()>;

    /// Output file details, if the sink has been initialized
    fn file_info(&self) -> Option<FileInfo>;

    /// Path of the output file, if the sink has been initialized
    fn path(&self) -> Option<PathBuf>;
}
