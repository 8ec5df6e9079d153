//! Run coordinator - top-level harvest orchestration
//!
//! This module drives a whole run, including:
//! - Initializing the record sink
//! - Discovering the listing's page and item totals
//! - Running batches strictly one after another with a cooldown in between
//! - Folding batch outcomes into run-wide state and logging progress
//! - Guaranteed sink cleanup on failure or interruption

use crate::config::Config;
use crate::crawler::planner::{create_batches_with, create_range_batches, BatchPlan};
use crate::crawler::scheduler::Scheduler;
use crate::extract::Extractor;
use crate::output::{log_progress, print_statistics, RunStats, RunSummary};
use crate::render::Renderer;
use crate::state::RunState;
use crate::storage::RecordSink;
use crate::{ConfigError, HarvestError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which kind of run produced the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Sample { start_page: u32, end_page: u32 },
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Sample { .. } => "sample",
        }
    }
}

/// Main run coordinator
pub struct Coordinator {
    config: Arc<Config>,
    sink: Arc<dyn RecordSink>,
    scheduler: Scheduler,
    cancel: CancellationToken,
    state: RunState,
    mode: RunMode,
    started_at: DateTime<Utc>,
    integrity_ok: Option<bool>,
}

impl Coordinator {
    /// Creates a coordinator over the given renderer, sink and extractor
    ///
    /// The cancellation token is shared with whoever handles interrupts;
    /// cancelling it stops the run from admitting new work.
    pub fn new(
        config: Config,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn RecordSink>,
        extractor: Arc<dyn Extractor>,
        cancel: CancellationToken,
    ) -> Result<Self, HarvestError> {
        let scheduler = Scheduler::new(
            &config,
            renderer,
            sink.clone(),
            extractor,
            cancel.clone(),
        )?;

        Ok(Self {
            config: Arc::new(config),
            sink,
            scheduler,
            cancel,
            state: RunState::new(),
            mode: RunMode::Full,
            started_at: Utc::now(),
            integrity_ok: None,
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Harvests every page of the catalog
    pub async fn run_full(&mut self) -> Result<RunStats, HarvestError> {
        self.begin(RunMode::Full);
        let result = self.execute_full().await;
        self.finish(result)
    }

    /// Harvests pages `start_page..=end_page` and checks the output afterwards
    pub async fn run_sample(
        &mut self,
        start_page: u32,
        end_page: u32,
    ) -> Result<RunStats, HarvestError> {
        if start_page == 0 || end_page < start_page {
            return Err(ConfigError::Validation(format!(
                "sample range must satisfy 1 <= start <= end, got {}..={}",
                start_page, end_page
            ))
            .into());
        }

        self.begin(RunMode::Sample {
            start_page,
            end_page,
        });
        let result = self.execute_sample(start_page, end_page).await;
        self.finish(result)
    }

    /// Builds the run-end summary from the current state
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::from_state(
            self.mode.as_str(),
            self.started_at,
            &self.state,
            self.sink.file_info(),
        );
        summary.integrity_ok = self.integrity_ok;
        summary
    }

    fn begin(&mut self, mode: RunMode) {
        self.mode = mode;
        self.started_at = Utc::now();
        self.state = RunState::new();
        self.integrity_ok = None;
    }

    async fn execute_full(&mut self) -> Result<(), HarvestError> {
        let path = self
            .sink
            .initialize(self.config.output.output_file.as_deref())?;
        tracing::info!("Writing records to {}", path.display());

        let listing = self.scheduler.discover().await?;
        let stats = self.state.stats_mut();
        stats.total_pages = u64::from(listing.total_pages);
        stats.total_items = listing.total_items;

        let plans = create_batches_with(
            listing.total_pages,
            self.config.scraper.batch_size,
            self.config.scraper.max_concurrent,
        );
        tracing::info!(
            "Planned {} batches of up to {} pages",
            plans.len(),
            self.config.scraper.batch_size
        );

        self.run_batches(&plans).await
    }

    async fn execute_sample(
        &mut self,
        start_page: u32,
        end_page: u32,
    ) -> Result<(), HarvestError> {
        let path = self
            .sink
            .initialize(self.config.output.output_file.as_deref())?;
        tracing::info!(
            "Sample run over pages {}-{}, writing to {}",
            start_page,
            end_page,
            path.display()
        );

        self.state.stats_mut().total_pages = u64::from(end_page - start_page + 1);

        let plans = create_range_batches(
            start_page,
            end_page,
            self.config.scraper.batch_size,
            self.config.scraper.max_concurrent,
        );
        self.run_batches(&plans).await?;

        self.sink.force_sync()?;
        let intact = self.sink.verify_integrity();
        if !intact {
            tracing::warn!("Integrity check failed for the sample output");
        }
        self.integrity_ok = Some(intact);
        Ok(())
    }

    /// Runs batches in order with a cooldown between consecutive ones
    async fn run_batches(&mut self, plans: &[BatchPlan]) -> Result<(), HarvestError> {
        let cooldown = self.config.scraper.delay_between_batches();

        for (index, plan) in plans.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, not starting {}", plan.name);
                break;
            }

            let outcome = self.scheduler.process_batch(plan).await;
            self.state.absorb_batch(&outcome.stats, outcome.records);
            log_progress(index + 1, plans.len(), self.state.stats());
            if let Some(e) = outcome.failure {
                return Err(e);
            }

            if index + 1 < plans.len() {
                tracing::debug!("Cooling down for {:?} before the next batch", cooldown);
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(cooldown) => {}
                }
            }
        }

        Ok(())
    }

    /// Closes the sink and maps the outcome to the run result
    fn finish(&self, result: Result<(), HarvestError>) -> Result<RunStats, HarvestError> {
        match result {
            Ok(()) if self.cancel.is_cancelled() => {
                tracing::warn!("Run interrupted, persisting what was collected");
                self.cleanup();
                print_statistics(self.state.stats());
                Err(HarvestError::Cancelled)
            }
            Ok(()) => {
                self.sink.close()?;
                tracing::info!(
                    "Run completed: {} records persisted",
                    self.sink.count_persisted_records()
                );
                print_statistics(self.state.stats());
                Ok(*self.state.stats())
            }
            Err(e) => {
                tracing::error!("Run failed: {}", e);
                self.cleanup();
                Err(e)
            }
        }
    }

    /// Last force-sync and close; failures here are logged only
    fn cleanup(&self) {
        if let Err(e) = self.sink.force_sync() {
            tracing::error!("Final sync of output file failed: {}", e);
        }
        if let Err(e) = self.sink.close() {
            tracing::error!("Closing output file failed: {}", e);
        }
    }
}
