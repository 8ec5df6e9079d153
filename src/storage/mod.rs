//! Storage module for persisting extracted records
//!
//! This module handles:
//! - The `RecordSink` trait every output backend implements
//! - The append-only CSV sink with per-record durability
//! - Output file layout (header, naming, quoting)

mod csv_sink;
pub mod schema;
mod traits;

pub use csv_sink::CsvSink;
pub use traits::{FileInfo, RecordSink, StorageError, StorageResult};

use std::path::Path;

/// Creates a CSV sink writing into `results_dir`
///
/// The sink still needs `initialize` before records can be appended.
pub fn open_sink(results_dir: &Path) -> CsvSink {
    CsvSink::new(results_dir)
}
