//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `NavState` / `PaginationCursor`: per-session pagination walk
//! - `RunState`: run-wide statistics and the in-memory record view, owned by
//!   one coordinator invocation

mod nav_state;
mod run_state;

// Re-export main types
pub use nav_state::{AdvanceOutcome, NavAction, NavState, PaginationCursor, SPARE_ATTEMPTS};
pub use run_state::RunState;
