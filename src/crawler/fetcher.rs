//! Detail page fetcher
//!
//! This module handles loading one detail reference, including:
//! - Opening a fresh session per attempt and always closing it
//! - Bounded waits on every render call
//! - Retry with capped exponential backoff
//! - The fixed pause after each successful fetch
//! - No further attempts once the run is cancelled

use crate::config::ScraperConfig;
use crate::extract::Extractor;
use crate::record::RawFields;
use crate::render::{RenderContext, RenderError, RenderSession};
use crate::HarvestError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Retry schedule for detail fetches
///
/// `delay_for(n)` is the pause after the n-th failed attempt:
/// `min(base * 2^(n-1), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Backoff after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}

/// A detail reference that could not be fetched within the retry budget
#[derive(Debug, Clone, Error)]
#[error("Fetch of {reference} failed after {attempts} attempts: {message}")]
pub struct FetchFailure {
    pub reference: String,
    pub attempts: u32,
    pub message: String,
}

impl FetchFailure {
    fn new(reference: &str, attempts: u32, message: String) -> Self {
        Self {
            reference: reference.to_string(),
            attempts,
            message,
        }
    }

    fn interrupted(reference: &str, attempts: u32, last: &HarvestError) -> Self {
        tracing::info!("Not retrying {} after cancellation: {}", reference, last);
        Self::new(
            reference,
            attempts,
            format!("{} (retries stopped by cancellation)", last),
        )
    }
}

/// Loads detail references and maps them through an extractor
#[derive(Clone)]
pub struct DetailFetcher {
    extractor: Arc<dyn Extractor>,
    policy: RetryPolicy,
    timeout: Duration,
    settle: Duration,
    delay_between_requests: Duration,
}

impl DetailFetcher {
    pub fn new(extractor: Arc<dyn Extractor>, config: &ScraperConfig) -> Self {
        Self {
            extractor,
            policy: RetryPolicy::from_config(config),
            timeout: config.timeout(),
            settle: config.settle_delay(),
            delay_between_requests: config.delay_between_requests(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches one detail reference with retries
    ///
    /// Cancellation never interrupts an attempt already in flight, but it
    /// cuts short any backoff or pause and no further attempt is made.
    pub async fn fetch_detail(
        &self,
        context: &dyn RenderContext,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<RawFields, FetchFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(context, reference).await {
                Ok(raw) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.delay_between_requests) => {}
                    }
                    return Ok(raw);
                }
                Err(e) if attempt >= self.policy.max_attempts => {
                    tracing::error!(
                        attempts = attempt,
                        "Giving up on {}: {}",
                        reference,
                        e
                    );
                    return Err(FetchFailure::new(reference, attempt, e.to_string()));
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        return Err(FetchFailure::interrupted(reference, attempt, &e));
                    }

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retry attempt {} for detail extraction of {}: {}",
                        attempt,
                        reference,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(FetchFailure::interrupted(reference, attempt, &e));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One attempt in a fresh session; the session is closed whatever happens
    async fn attempt(
        &self,
        context: &dyn RenderContext,
        reference: &str,
    ) -> Result<RawFields, HarvestError> {
        let session = context.new_session().await?;
        let result = self.load_and_extract(session.as_ref(), reference).await;
        if let Err(e) = session.close().await {
            tracing::debug!("Failed to close detail session for {}: {}", reference, e);
        }
        result
    }

    async fn load_and_extract(
        &self,
        session: &dyn RenderSession,
        reference: &str,
    ) -> Result<RawFields, HarvestError> {
        bounded(self.timeout, reference, session.goto(reference)).await?;
        tokio::time::sleep(self.settle).await;
        let html = bounded(self.timeout, reference, session.content()).await?;
        Ok(self.extractor.extract(&html)?)
    }
}

/// Runs a render call under an explicit deadline
pub(crate) async fn bounded<T, F>(timeout: Duration, what: &str, call: F) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, RenderError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::Timeout {
            selector: what.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use crate::render::RenderResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Context whose sessions fail until `failures` attempts have been made
    struct FlakyContext {
        failures: u32,
        opened: Arc<AtomicU32>,
        closed: Arc<AtomicU32>,
    }

    struct FlakySession {
        fail: bool,
        closed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RenderContext for FlakyContext {
        async fn new_session(&self) -> RenderResult<Box<dyn RenderSession>> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlakySession {
                fail: n < self.failures,
                closed: self.closed.clone(),
            }))
        }

        async fn close(&self) -> RenderResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl RenderSession for FlakySession {
        async fn goto(&self, url: &str) -> RenderResult<()> {
            if self.fail {
                Err(RenderError::Http(format!("connection reset: {}", url)))
            } else {
                Ok(())
            }
        }

        async fn wait_for(&self, _selector: &str, _timeout: Duration) -> RenderResult<()> {
            Ok(())
        }

        async fn select_option(&self, _selector: &str, _value: &str) -> RenderResult<()> {
            Ok(())
        }

        async fn click(&self, _selector: &str) -> RenderResult<()> {
            Ok(())
        }

        async fn exists(&self, _selector: &str) -> RenderResult<bool> {
            Ok(false)
        }

        async fn content(&self) -> RenderResult<String> {
            Ok("<h1>EE Teste</h1>".to_string())
        }

        async fn close(&self) -> RenderResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TitleExtractor;

    impl Extractor for TitleExtractor {
        fn extract(&self, document: &str) -> Result<RawFields, ExtractError> {
            let name = document
                .strip_prefix("<h1>")
                .and_then(|s| s.strip_suffix("</h1>"))
                .ok_or_else(|| ExtractError::MissingField("name".to_string()))?;
            let mut raw = RawFields::new();
            raw.set("name", name);
            Ok(raw)
        }
    }

    fn fast_config() -> ScraperConfig {
        ScraperConfig {
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 2,
            delay_between_requests_ms: 0,
            settle_delay_ms: 0,
            timeout_ms: 1000,
            ..ScraperConfig::default()
        }
    }

    fn context(failures: u32) -> FlakyContext {
        FlakyContext {
            failures,
            opened: Arc::new(AtomicU32::new(0)),
            closed: Arc::new(AtomicU32::new(0)),
        }
    }

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let fetcher = DetailFetcher::new(Arc::new(TitleExtractor), &fast_config());
        let ctx = context(2);

        let raw = fetcher
            .fetch_detail(
                &ctx,
                "https://catalog.example.org/d?c=1",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(raw.get("name"), "EE Teste");
        assert_eq!(ctx.opened.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_failure() {
        let fetcher = DetailFetcher::new(Arc::new(TitleExtractor), &fast_config());
        let ctx = context(u32::MAX);

        let failure = fetcher
            .fetch_detail(
                &ctx,
                "https://catalog.example.org/d?c=2",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.reference, "https://catalog.example.org/d?c=2");
        assert!(failure.message.contains("connection reset"));
        assert_eq!(ctx.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let mut config = fast_config();
        config.retry_base_delay_ms = 60_000;
        config.retry_max_delay_ms = 60_000;
        let fetcher = DetailFetcher::new(Arc::new(TitleExtractor), &config);
        let ctx = context(u32::MAX);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let failure = fetcher
            .fetch_detail(&ctx, "https://catalog.example.org/d?c=3", &cancel)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(failure.attempts, 1);
        assert!(failure.message.contains("retries stopped by cancellation"));
        assert_eq!(ctx.opened.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_one_attempt() {
        let fetcher = DetailFetcher::new(Arc::new(TitleExtractor), &fast_config());
        let ctx = context(u32::MAX);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = fetcher
            .fetch_detail(&ctx, "https://catalog.example.org/d?c=4", &cancel)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(ctx.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RenderError>(())
        };
        let err = bounded(Duration::from_millis(10), "https://slow.example", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Timeout { timeout_ms: 10, .. }));
    }
}
