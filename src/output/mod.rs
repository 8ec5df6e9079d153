//! Output module for run statistics and summaries
//!
//! This module handles:
//! - Aggregating per-batch outcome counts into run totals
//! - Logging batch progress
//! - Generating the run-end markdown summary

pub mod stats;
mod summary;

pub use stats::{log_progress, print_statistics, RunStats};
pub use summary::{format_summary, write_summary, RunSummary};
