//! CSV record sink
//!
//! One file handle behind one mutex. Every append is flushed and synced to
//! disk before the call returns, so an interrupted run loses at most the
//! record that was being written.

use crate::record::Record;
use crate::storage::schema::{default_file_name, header_line, is_header, split_rows, write_row};
use crate::storage::traits::{FileInfo, RecordSink, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SinkInner {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    closed: bool,
    final_syncs: u32,
}

/// Append-only CSV file sink
#[derive(Debug)]
pub struct CsvSink {
    results_dir: PathBuf,
    inner: Mutex<SinkInner>,
}

impl CsvSink {
    /// Creates a sink that writes into `results_dir` when no explicit path is given
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            inner: Mutex::new(SinkInner::default()),
        }
    }

    /// Number of final syncs performed by `close`
    pub fn final_sync_count(&self) -> u32 {
        self.lock().map(|inner| inner.final_syncs).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|inner| inner.closed).unwrap_or(true)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, SinkInner>> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }

    fn read_contents(&self) -> Option<Vec<u8>> {
        let path = self.path()?;
        fs::read(path).ok()
    }
}

fn sync_writer(writer: &mut BufWriter<File>) -> StorageResult<()> {
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

impl RecordSink for CsvSink {
    fn initialize(&self, path: Option<&Path>) -> StorageResult<PathBuf> {
        let mut inner = self.lock()?;
        if inner.closed {
            return Err(StorageError::Closed("cannot re-initialize".to_string()));
        }

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.results_dir.join(default_file_name(Utc::now())),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Create {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let file = File::create(&path).map_err(|source| StorageError::Create {
            path: path.display().to_string(),
            source,
        })?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header_line())?;
        sync_writer(&mut writer)?;

        tracing::info!("Output file initialized: {}", path.display());

        inner.path = Some(path.clone());
        inner.writer = Some(writer);
        Ok(path)
    }

    fn append_record(&self, record: &Record) -> StorageResult<()> {
        let mut inner = self.lock()?;
        if inner.closed {
            return Err(StorageError::Closed(record.detail_url.clone()));
        }
        let writer = inner.writer.as_mut().ok_or(StorageError::NotInitialized)?;

        write_row(&mut *writer, &record.to_row())?;
        writer.flush()?;
        writer.get_ref().sync_data()?;

        tracing::debug!(
            status = record.status.as_str(),
            "Record persisted: {}",
            record.detail_url
        );
        Ok(())
    }

    fn verify_integrity(&self) -> bool {
        let Some(path) = self.path() else {
            tracing::error!("Integrity check failed: sink was never initialized");
            return false;
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Integrity check failed: cannot read {}: {}", path.display(), e);
                return false;
            }
        };

        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Integrity check failed: {} is not UTF-8: {}", path.display(), e);
                return false;
            }
        };

        let rows = split_rows(text);
        match rows.first() {
            None => {
                tracing::error!("Integrity check failed: {} is empty", path.display());
                false
            }
            Some(first) if !is_header(first) => {
                tracing::error!("Integrity check failed: {} has no header", path.display());
                false
            }
            Some(_) => {
                tracing::info!(
                    "Integrity check passed: {} records in {}",
                    rows.len() - 1,
                    path.display()
                );
                true
            }
        }
    }

    fn count_persisted_records(&self) -> usize {
        let Some(bytes) = self.read_contents() else {
            return 0;
        };
        let text = String::from_utf8_lossy(&bytes);
        let rows = split_rows(&text);
        match rows.first() {
            Some(first) if is_header(first) => rows.len() - 1,
            _ => rows.len(),
        }
    }

    fn force_sync(&self) -> StorageResult<()> {
        let mut inner = self.lock()?;
        if let Some(writer) = inner.writer.as_mut() {
            sync_writer(writer)?;
            tracing::debug!("Output file force-synced");
        }
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let mut inner = self.lock()?;
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        if let Some(mut writer) = inner.writer.take() {
            sync_writer(&mut writer)?;
            inner.final_syncs += 1;
            if let Some(path) = &inner.path {
                tracing::info!("Output file closed: {}", path.display());
            }
        }
        Ok(())
    }

    fn file_info(&self) -> Option<FileInfo> {
        let path = self.path()?;
        let meta = fs::metadata(&path).ok()?;
        Some(FileInfo {
            size_bytes: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            path,
        })
    }

    fn path(&self) -> Option<PathBuf> {
        self.lock().ok().and_then(|inner| inner.path.clone())
    }
}
