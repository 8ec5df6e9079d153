use crate::output::RunStats;
use crate::record::{Record, RecordStatus};
use std::collections::BTreeMap;

/// State owned by one coordinator invocation
///
/// Holds the run-wide statistics and an in-memory copy of every record
/// produced, which is only used for the end-of-run summary. The output file
/// remains the system of record.
#[derive(Debug, Default)]
pub struct RunState {
    stats: RunStats,
    records: Vec<Record>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Folds a finished batch into the run
    pub fn absorb_batch(&mut self, batch_stats: &RunStats, records: Vec<Record>) {
        self.stats.merge(batch_stats);
        self.records.extend(records);
    }

    /// Counts SUCCESS records per classification, sorted by classification
    pub fn classification_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            if record.status == RecordStatus::Success {
                *counts
                    .entry(record.classification.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        counts
    }
}
