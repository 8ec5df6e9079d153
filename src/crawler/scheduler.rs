//! Batch scheduler
//!
//! This module handles:
//! - Splitting a batch's pages into round-robin lanes, one render context each
//! - Running lanes concurrently and each lane's pages one at a time
//! - Gating detail fetches with a run-wide semaphore
//! - Appending every record to the sink as soon as it exists
//! - Skipping references already processed earlier in the run

use crate::config::Config;
use crate::crawler::fetcher::{bounded, DetailFetcher};
use crate::crawler::navigator::Navigator;
use crate::crawler::parser::{ListingPage, ListingParser};
use crate::crawler::planner::BatchPlan;
use crate::extract::Extractor;
use crate::output::RunStats;
use crate::record::Record;
use crate::render::{RenderContext, RenderError, RenderSession, Renderer};
use crate::storage::RecordSink;
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Reason attached to references seen earlier in the run
pub const ALREADY_PROCESSED: &str = "already processed";

/// Records and counts produced by a page, lane or batch
///
/// `records` and `stats` cover exactly the records appended to the sink,
/// including when `failure` is set and the batch stopped early.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub stats: RunStats,
    pub records: Vec<Record>,
    pub failure: Option<HarvestError>,
}

impl BatchOutcome {
    fn push(&mut self, record: Record) {
        self.stats.record(record.status);
        self.records.push(record);
    }

    /// Keeps the first failure only
    fn fail(&mut self, error: HarvestError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }

    fn absorb(&mut self, other: BatchOutcome) {
        self.stats.merge(&other.stats);
        self.records.extend(other.records);
        if let Some(error) = other.failure {
            self.fail(error);
        }
    }
}

/// Runs batches of listing pages against a renderer
///
/// Cloning is cheap; clones share the fetch gate, the processed-reference
/// set and the cancellation token.
#[derive(Clone)]
pub struct Scheduler {
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn RecordSink>,
    navigator: Navigator,
    parser: Arc<ListingParser>,
    fetcher: DetailFetcher,
    gate: Arc<Semaphore>,
    processed: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
    base_url: String,
    content_root: String,
    sessions_per_batch: u32,
    timeout: Duration,
    settle: Duration,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn RecordSink>,
        extractor: Arc<dyn Extractor>,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            renderer,
            sink,
            navigator: Navigator::new(config),
            parser: Arc::new(ListingParser::new(&config.site)?),
            fetcher: DetailFetcher::new(extractor, &config.scraper),
            gate: Arc::new(Semaphore::new(config.scraper.max_concurrent as usize)),
            processed: Arc::new(Mutex::new(HashSet::new())),
            cancel,
            base_url: config.site.base_url.clone(),
            content_root: config.site.content_root.clone(),
            sessions_per_batch: config.scraper.sessions_per_batch,
            timeout: config.scraper.timeout(),
            settle: config.scraper.settle_delay(),
        })
    }

    /// Reads total pages and total items from the first listing page
    pub async fn discover(&self) -> Result<ListingPage, HarvestError> {
        let context = self.renderer.new_context().await?;
        let result = async {
            let session = context.new_session().await?;
            let html = self.render_listing(session.as_ref(), 1).await;
            close_session(session.as_ref()).await;
            let html = html?
                .ok_or_else(|| RenderError::ElementNotFound(self.content_root.clone()))?;
            Ok::<_, HarvestError>(self.parser.parse(&html))
        }
        .await;
        close_context(context.as_ref()).await;

        let page = result?;
        tracing::info!(
            "Found {} total items across {} pages",
            page.total_items,
            page.total_pages
        );
        Ok(page)
    }

    /// Processes every page of a batch
    ///
    /// The outcome always holds what was persisted. On failure or
    /// cancellation the sink is synced and closed before the batch's render
    /// contexts are released.
    pub async fn process_batch(&self, plan: &BatchPlan) -> BatchOutcome {
        let lane_count = self.sessions_per_batch.min(plan.page_count()).max(1) as usize;
        tracing::info!(
            lanes = lane_count,
            max_concurrent = plan.max_concurrent,
            "Processing {} with {} concurrent sessions",
            plan,
            lane_count
        );

        let mut outcome = BatchOutcome::default();
        let mut contexts = Vec::with_capacity(lane_count);
        for _ in 0..lane_count {
            match self.renderer.new_context().await {
                Ok(context) => contexts.push(context),
                Err(e) => {
                    outcome.fail(e.into());
                    break;
                }
            }
        }

        if outcome.failure.is_none() {
            // Lanes stop on the batch token; a failure cancels it without
            // cancelling the run
            let stop = self.cancel.child_token();
            let batch: Arc<str> = Arc::from(plan.name.as_str());
            let mut lanes = JoinSet::new();
            for (lane, context) in contexts.iter().enumerate() {
                let pages: Vec<u32> = plan.pages().skip(lane).step_by(lane_count).collect();
                let scheduler = Scheduler {
                    cancel: stop.clone(),
                    ..self.clone()
                };
                let context = context.clone();
                let batch = batch.clone();
                lanes.spawn(async move { scheduler.run_lane(context, pages, batch).await });
            }
            outcome.absorb(collect(&mut lanes, &batch, &stop).await);
        }

        if outcome.failure.is_some() || self.cancel.is_cancelled() {
            self.seal_sink();
        }
        close_contexts(&contexts).await;

        match &outcome.failure {
            Some(e) => tracing::error!(
                "{} failed after {} records: {}",
                plan.name,
                outcome.stats.total_processed,
                e
            ),
            None => tracing::info!(
                "{} completed: {} processed, {} successful, {} errors",
                plan.name,
                outcome.stats.total_processed,
                outcome.stats.successful,
                outcome.stats.errors
            ),
        }
        outcome
    }

    /// Processes a lane's pages sequentially
    async fn run_lane(
        self,
        context: Arc<dyn RenderContext>,
        pages: Vec<u32>,
        batch: Arc<str>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for page in pages {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, lane stops before page {}", page);
                break;
            }
            outcome.absorb(self.process_page(&context, page, &batch).await);
            if outcome.failure.is_some() {
                break;
            }
        }
        outcome
    }

    /// Navigates to one listing page and fetches every detail reference on it
    ///
    /// A page that cannot be reached yields no records. A sink failure or a
    /// failed task is recorded in the outcome and stops further admissions;
    /// fetches already admitted are still awaited.
    pub async fn process_page(
        &self,
        context: &Arc<dyn RenderContext>,
        page: u32,
        batch: &str,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        outcome.stats.pages_processed = 1;

        let refs = match self.listing_refs(context.as_ref(), page).await {
            Some(refs) => refs,
            None => return outcome,
        };
        tracing::info!("Page {}: found {} detail references", page, refs.len());

        let mut fetches = JoinSet::new();
        for reference in refs {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, stopping admissions on page {}", page);
                break;
            }

            if !self.claim(&reference) {
                tracing::debug!("Skipping {}: {}", reference, ALREADY_PROCESSED);
                let record = Record::skipped(reference.as_str(), ALREADY_PROCESSED);
                if let Err(e) = self.sink.append_record(&record) {
                    self.cancel.cancel();
                    outcome.fail(e.into());
                    break;
                }
                outcome.push(record);
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = self.gate.clone().acquire_owned() => permit,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    outcome.fail(HarvestError::Batch {
                        batch: batch.to_string(),
                        message: e.to_string(),
                    });
                    break;
                }
            };

            let fetcher = self.fetcher.clone();
            let sink = self.sink.clone();
            let context = context.clone();
            let cancel = self.cancel.clone();
            fetches.spawn(async move {
                let fetched = fetcher
                    .fetch_detail(context.as_ref(), reference.as_str(), &cancel)
                    .await;
                let record = match fetched {
                    Ok(raw) => {
                        tracing::debug!("Extracted {}", reference);
                        Record::from_raw(reference.as_str(), &raw)
                    }
                    Err(failure) => Record::error(reference.as_str(), failure.message),
                };
                let appended = sink.append_record(&record);
                if appended.is_err() {
                    // Stop admissions before the permit is released
                    cancel.cancel();
                }
                drop(permit);
                appended?;
                Ok::<_, HarvestError>(record)
            });
        }

        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(Ok(record)) => outcome.push(record),
                Ok(Err(e)) => outcome.fail(e),
                Err(e) => {
                    self.cancel.cancel();
                    outcome.fail(HarvestError::Batch {
                        batch: batch.to_string(),
                        message: format!("fetch task on page {} failed: {}", page, e),
                    });
                }
            }
        }

        outcome
    }

    /// Final sync and close ahead of releasing render contexts
    fn seal_sink(&self) {
        if let Err(e) = self.sink.force_sync() {
            tracing::error!("Final sync of output file failed: {}", e);
        }
        if let Err(e) = self.sink.close() {
            tracing::error!("Closing output file failed: {}", e);
        }
    }

    /// Marks a reference processed, false when it already was
    fn claim(&self, reference: &Url) -> bool {
        let mut processed = match self.processed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        processed.insert(reference.as_str().to_string())
    }

    /// Detail references on `page`, read in a fresh session
    async fn listing_refs(&self, context: &dyn RenderContext, page: u32) -> Option<Vec<Url>> {
        let session = match context.new_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Could not open a session for page {}: {}", page, e);
                return None;
            }
        };

        let html = self.render_listing(session.as_ref(), page).await;
        close_session(session.as_ref()).await;

        match html {
            Ok(Some(html)) => Some(self.parser.detail_refs(&html)),
            Ok(None) if self.cancel.is_cancelled() => {
                tracing::info!("Page {} abandoned after cancellation", page);
                None
            }
            Ok(None) => {
                tracing::warn!("Skipping page {}: navigation did not reach it", page);
                None
            }
            Err(e) => {
                tracing::warn!("Skipping page {}: {}", page, e);
                None
            }
        }
    }

    /// Opens the listing, walks to `page` and returns the rendered document
    ///
    /// `Ok(None)` means the navigator could not reach the page.
    async fn render_listing(
        &self,
        session: &dyn RenderSession,
        page: u32,
    ) -> Result<Option<String>, RenderError> {
        bounded(self.timeout, &self.base_url, session.goto(&self.base_url)).await?;
        session.wait_for(&self.content_root, self.timeout).await?;

        if page > 1 {
            self.navigator.negotiate_page_size(session).await;
        }
        if !self.navigator.reach_page(session, page, &self.cancel).await {
            return Ok(None);
        }

        tokio::time::sleep(self.settle).await;
        let html = bounded(self.timeout, &self.base_url, session.content()).await?;
        Ok(Some(html))
    }
}

/// Drains lane tasks; a lane failure stops the others through `stop`
async fn collect(
    lanes: &mut JoinSet<BatchOutcome>,
    batch: &str,
    stop: &CancellationToken,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    while let Some(joined) = lanes.join_next().await {
        match joined {
            Ok(lane) => {
                if let Some(e) = &lane.failure {
                    tracing::error!("{} lane failed: {}", batch, e);
                    stop.cancel();
                }
                outcome.absorb(lane);
            }
            Err(e) => {
                tracing::error!("{} lane task failed: {}", batch, e);
                stop.cancel();
                outcome.fail(HarvestError::Batch {
                    batch: batch.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    outcome
}

async fn close_session(session: &dyn RenderSession) {
    if let Err(e) = session.close().await {
        tracing::debug!("Failed to close listing session: {}", e);
    }
}

async fn close_context(context: &dyn RenderContext) {
    if let Err(e) = context.close().await {
        tracing::debug!("Failed to close render context: {}", e);
    }
}

async fn close_contexts(contexts: &[Arc<dyn RenderContext>]) {
    futures::future::join_all(contexts.iter().map(|c| close_context(c.as_ref()))).await;
}
