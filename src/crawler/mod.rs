//! Crawler module for listing navigation and detail harvesting
//!
//! This module contains the core harvesting logic, including:
//! - Stateful pagination through the listing
//! - Listing parsing and detail reference extraction
//! - Detail fetching with retry logic
//! - Batch planning, lane scheduling and run coordination

mod coordinator;
mod fetcher;
mod navigator;
mod parser;
mod planner;
mod scheduler;

pub use coordinator::{Coordinator, RunMode};
pub use fetcher::{DetailFetcher, FetchFailure, RetryPolicy};
pub use navigator::Navigator;
pub use parser::{ListingPage, ListingParser};
pub use planner::{create_batches, create_batches_with, create_range_batches, BatchPlan};
pub use scheduler::{BatchOutcome, Scheduler, ALREADY_PROCESSED};
