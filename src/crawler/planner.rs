//! Batch planning
//!
//! Splits the listing's page range into fixed-size, contiguous batches.

use std::fmt;

/// One contiguous range of listing pages processed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// First page of the batch (1-based, inclusive)
    pub start_page: u32,

    /// Last page of the batch (inclusive)
    pub end_page: u32,

    /// Display name, `BATCH_001` onwards
    pub name: String,

    /// Permits of the run-wide fetch gate, logged with the batch
    pub max_concurrent: u32,
}

impl BatchPlan {
    pub fn new(index: usize, start_page: u32, end_page: u32, max_concurrent: u32) -> Self {
        Self {
            start_page,
            end_page,
            name: format!("BATCH_{:03}", index),
            max_concurrent,
        }
    }

    /// Pages in this batch, in order
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start_page..=self.end_page
    }

    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }
}

impl fmt::Display for BatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pages {}-{})", self.name, self.start_page, self.end_page)
    }
}

/// Plans batches covering pages `1..=total_pages`
///
/// Either argument being zero yields an empty plan.
pub fn create_batches(total_pages: u32, batch_size: u32) -> Vec<BatchPlan> {
    let max_concurrent = crate::config::ScraperConfig::default().max_concurrent;
    create_batches_with(total_pages, batch_size, max_concurrent)
}

/// Plans batches with an explicit per-batch concurrency
pub fn create_batches_with(
    total_pages: u32,
    batch_size: u32,
    max_concurrent: u32,
) -> Vec<BatchPlan> {
    if total_pages == 0 || batch_size == 0 {
        return Vec::new();
    }

    let mut batches = Vec::with_capacity(total_pages.div_ceil(batch_size) as usize);
    let mut start = 1u32;
    while start <= total_pages {
        let end = start.saturating_add(batch_size - 1).min(total_pages);
        batches.push(BatchPlan::new(batches.len() + 1, start, end, max_concurrent));
        if end == total_pages {
            break;
        }
        start = end + 1;
    }
    batches
}

/// Plans batches over an explicit page range (sample mode)
pub fn create_range_batches(
    start_page: u32,
    end_page: u32,
    batch_size: u32,
    max_concurrent: u32,
) -> Vec<BatchPlan> {
    if start_page == 0 || end_page < start_page {
        return Vec::new();
    }
    let span = end_page - start_page + 1;
    create_batches_with(span, batch_size, max_concurrent)
        .into_iter()
        .enumerate()
        .map(|(i, plan)| {
            BatchPlan::new(
                i + 1,
                plan.start_page + start_page - 1,
                plan.end_page + start_page - 1,
                max_concurrent,
            )
        })
        .collect()
}
