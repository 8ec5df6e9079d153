//! Rendering traits and error types
//!
//! The crawler never talks to a browser directly. It drives a `Renderer`,
//! which hands out isolated `RenderContext`s, which in turn open short-lived
//! `RenderSession`s (one page each).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a rendering session
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Timed out after {timeout_ms}ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Protocol error (status {status}, {error}): {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Session closed")]
    SessionClosed,
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Http(err.to_string())
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Factory for isolated rendering contexts
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn new_context(&self) -> RenderResult<Arc<dyn RenderContext>>;
}

/// An isolated group of sessions (separate cookies and storage)
#[async_trait]
pub trait RenderContext: Send + Sync {
    async fn new_session(&self) -> RenderResult<Box<dyn RenderSession>>;

    /// Closes every session still open in this context
    async fn close(&self) -> RenderResult<()>;
}

/// One navigable page
#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn goto(&self, url: &str) -> RenderResult<()>;

    /// Waits until `selector` matches, or fails with `RenderError::Timeout`
    async fn wait_for(&self, selector: &str, timeout: Duration) -> RenderResult<()>;

    /// Chooses `value` in the `<select>` matched by `selector`
    async fn select_option(&self, selector: &str, value: &str) -> RenderResult<()>;

    async fn click(&self, selector: &str) -> RenderResult<()>;

    async fn exists(&self, selector: &str) -> RenderResult<bool>;

    /// Current document source
    async fn content(&self) -> RenderResult<String>;

    async fn close(&self) -> RenderResult<()>;
}
