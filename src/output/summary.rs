//! Run-end summary generation
//!
//! Formats a finished run as a human-readable markdown report: totals,
//! success rate, classification breakdown and output file details.

use crate::output::stats::RunStats;
use crate::state::RunState;
use crate::storage::FileInfo;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Everything the run-end report needs
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// "full" or "sample"
    pub mode: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub stats: RunStats,

    /// SUCCESS records per classification
    pub classification_counts: BTreeMap<String, u64>,

    pub file_info: Option<FileInfo>,

    /// Result of the final integrity check, if one ran
    pub integrity_ok: Option<bool>,
}

impl RunSummary {
    pub fn from_state(
        mode: &str,
        started_at: DateTime<Utc>,
        state: &RunState,
        file_info: Option<FileInfo>,
    ) -> Self {
        Self {
            mode: mode.to_string(),
            started_at,
            finished_at: Utc::now(),
            stats: *state.stats(),
            classification_counts: state.classification_counts(),
            file_info,
            integrity_ok: None,
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }
}

/// Formats a run summary as markdown
pub fn format_summary(summary: &RunSummary) -> String {
    let stats = &summary.stats;
    let mut md = String::new();

    md.push_str("# Catalog Harvest Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Mode**: {}\n", summary.mode));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    let duration = summary.duration_seconds();
    md.push_str(&format!(
        "- **Duration**: {} seconds ({:.2} minutes)\n\n",
        duration,
        duration as f64 / 60.0
    ));

    md.push_str("## Statistics\n\n");
    md.push_str(&format!("- **Total Processed**: {}\n", stats.total_processed));
    md.push_str(&format!("- **Successful**: {}\n", stats.successful));
    md.push_str(&format!("- **Errors**: {}\n", stats.errors));
    md.push_str(&format!("- **Skipped**: {}\n", stats.skipped));
    md.push_str(&format!("- **Success Rate**: {:.1}%\n", stats.success_rate()));
    md.push_str(&format!(
        "- **Pages Processed**: {} / {}\n",
        stats.pages_processed, stats.total_pages
    ));
    md.push_str(&format!("- **Total Items Available**: {}\n\n", stats.total_items));

    if !summary.classification_counts.is_empty() {
        md.push_str("## Classifications\n\n");
        md.push_str("| Classification | Records |\n");
        md.push_str("|----------------|---------|\n");
        for (classification, count) in &summary.classification_counts {
            md.push_str(&format!("| {} | {} |\n", classification, count));
        }
        md.push('\n');
    }

    md.push_str("## Output\n\n");
    match &summary.file_info {
        Some(info) => {
            md.push_str(&format!("- **File**: {}\n", info.path.display()));
            md.push_str(&format!(
                "- **Size**: {} bytes ({:.2} KB)\n",
                info.size_bytes,
                info.size_bytes as f64 / 1024.0
            ));
            if let Some(modified) = info.modified {
                md.push_str(&format!("- **Modified**: {}\n", modified.to_rfc3339()));
            }
        }
        None => md.push_str("- No output file was written\n"),
    }
    if let Some(ok) = summary.integrity_ok {
        md.push_str(&format!(
            "- **Integrity**: {}\n",
            if ok { "verified" } else { "FAILED" }
        ));
    }

    md
}

/// Writes the markdown summary to `output_path`
pub fn write_summary(summary: &RunSummary, output_path: &Path) -> std::io::Result<()> {
    let mut file = File::create(output_path)?;
    file.write_all(format_summary(summary).as_bytes())?;
    Ok(())
}
