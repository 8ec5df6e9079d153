//! Run statistics aggregation
//!
//! Batches report their own outcome counts; the coordinator folds them into
//! run-wide totals. Merging is plain field-wise addition, so batches can be
//! merged in any order with identical results.

use crate::record::RecordStatus;

/// Outcome counts for a batch or a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Detail references attempted (successful + errors + skipped)
    pub total_processed: u64,

    /// Records persisted with SUCCESS status
    pub successful: u64,

    /// Records persisted with ERROR status
    pub errors: u64,

    /// Records persisted with SKIPPED status
    pub skipped: u64,

    /// Listing pages handled, whether or not navigation succeeded
    pub pages_processed: u64,

    /// Total listing pages discovered for the run
    pub total_pages: u64,

    /// Total items reported by the catalog's summary line
    pub total_items: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one persisted record
    pub fn record(&mut self, status: RecordStatus) {
        self.total_processed += 1;
        match status {
            RecordStatus::Success => self.successful += 1,
            RecordStatus::Error => self.errors += 1,
            RecordStatus::Skipped => self.skipped += 1,
        }
    }

    /// Folds a batch's counts into these totals
    ///
    /// `total_pages` and `total_items` are run-level facts discovered once and
    /// are left untouched.
    pub fn merge(&mut self, batch: &RunStats) {
        self.total_processed += batch.total_processed;
        self.successful += batch.successful;
        self.errors += batch.errors;
        self.skipped += batch.skipped;
        self.pages_processed += batch.pages_processed;
    }

    /// Success rate as a percentage, 0.0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        (self.successful as f64 / self.total_processed as f64) * 100.0
    }

    /// Returns true when the per-status buckets add up to the total
    pub fn is_consistent(&self) -> bool {
        self.total_processed == self.successful + self.errors + self.skipped
    }
}

/// Logs progress after a batch completes
pub fn log_progress(current_batch: usize, total_batches: usize, stats: &RunStats) {
    let progress = if total_batches == 0 {
        100.0
    } else {
        (current_batch as f64 / total_batches as f64) * 100.0
    };

    tracing::info!(
        current_batch,
        total_batches,
        total_processed = stats.total_processed,
        successful = stats.successful,
        errors = stats.errors,
        "Progress: {:.1}% ({}/{} batches)",
        progress,
        current_batch,
        total_batches
    );
}

/// Prints run statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStats) {
    println!("Total processed: {}", stats.total_processed);
    println!("Success rate: {:.1}%", stats.success_rate());
    println!("Successful: {}", stats.successful);
    println!("Errors: {}", stats.errors);
    println!("Skipped: {}", stats.skipped);
    println!(
        "Pages processed: {} / {}",
        stats.pages_processed, stats.total_pages
    );
    println!("Total items available: {}", stats.total_items);
}
