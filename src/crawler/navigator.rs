//! Pagination navigator
//!
//! Drives one rendering session to a target listing page. The catalog's
//! pagination control cannot be addressed by page number, so the navigator
//! clicks the "next" control from page 1 and verifies every step before
//! counting it. Progress is tracked by a `PaginationCursor`.

use crate::config::Config;
use crate::render::RenderSession;
use crate::state::{AdvanceOutcome, NavAction, PaginationCursor};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Walks a session's pagination control
#[derive(Debug, Clone)]
pub struct Navigator {
    content_root: String,
    page_size_select: String,
    page_size: String,
    next_selectors: Vec<String>,
    timeout: Duration,
    settle: Duration,
}

impl Navigator {
    pub fn new(config: &Config) -> Self {
        Self {
            content_root: config.site.content_root.clone(),
            page_size_select: config.site.page_size_select.clone(),
            page_size: config.scraper.page_size.to_string(),
            next_selectors: config.site.next_selectors.clone(),
            timeout: config.scraper.timeout(),
            settle: config.scraper.settle_delay(),
        }
    }

    /// Selects the largest page size on the listing
    ///
    /// Failure is logged and reported as `false`; the page stays usable at
    /// the site's default size.
    pub async fn negotiate_page_size(&self, session: &dyn RenderSession) -> bool {
        let result = async {
            session.wait_for(&self.page_size_select, self.timeout).await?;
            session
                .select_option(&self.page_size_select, &self.page_size)
                .await
        }
        .await;

        match result {
            Ok(()) => {
                tokio::time::sleep(self.settle).await;
                tracing::info!("Set results per page to {}", self.page_size);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to set results per page to {}: {}",
                    self.page_size,
                    e
                );
                false
            }
        }
    }

    /// Moves the session to page `target`
    ///
    /// Returns `false` when the advance control disappears before the target,
    /// the attempt budget runs out or the run is cancelled. Never fails with
    /// an error.
    pub async fn reach_page(
        &self,
        session: &dyn RenderSession,
        target: u32,
        cancel: &CancellationToken,
    ) -> bool {
        if target <= 1 {
            self.negotiate_page_size(session).await;
            return true;
        }

        tracing::info!("Starting sequential navigation to page {}", target);
        tokio::time::sleep(self.settle).await;

        let mut cursor = PaginationCursor::new(target);
        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Navigation to page {} stopped at page {} by cancellation",
                    target,
                    cursor.state().current_page()
                );
                return false;
            }

            match cursor.next_action() {
                NavAction::Done => {
                    tracing::info!("Reached page {}", target);
                    return true;
                }
                NavAction::GiveUp => {
                    tracing::warn!(
                        attempts = cursor.attempts(),
                        state = %cursor.state(),
                        "Failed to reach page {}, reached page {}",
                        target,
                        cursor.state().current_page()
                    );
                    return false;
                }
                NavAction::Advance => {
                    cursor.begin_advance();
                    let outcome = self.advance(session).await;
                    let state = cursor.finish_advance(outcome);
                    tracing::debug!(target_page = target, ?outcome, %state, "Navigation step");
                }
            }
        }
    }

    /// One click on the first enabled advance control, then verification
    async fn advance(&self, session: &dyn RenderSession) -> AdvanceOutcome {
        let Some(selector) = self.find_next_control(session).await else {
            tracing::warn!("No enabled next-page control found");
            return AdvanceOutcome::ControlMissing;
        };

        if let Err(e) = session.click(selector).await {
            tracing::warn!("Error clicking next-page control: {}", e);
            return AdvanceOutcome::ClickFailed;
        }

        tokio::time::sleep(self.settle).await;

        match session.wait_for(&self.content_root, self.timeout).await {
            Ok(()) => AdvanceOutcome::Verified,
            Err(e) => {
                tracing::warn!("Page content not loaded after navigation: {}", e);
                AdvanceOutcome::Unverified
            }
        }
    }

    async fn find_next_control(&self, session: &dyn RenderSession) -> Option<&str> {
        for selector in &self.next_selectors {
            match session.exists(selector).await {
                Ok(true) => return Some(selector.as_str()),
                Ok(false) => {}
                Err(e) => tracing::debug!("Lookup of {} failed: {}", selector, e),
            }
        }
        None
    }
}
