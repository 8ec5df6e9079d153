//! Catalog-Harvest: a resilient paginated-catalog harvester
//!
//! This crate walks a server-rendered catalog whose pages are only reachable
//! through a stateful pagination control, extracts one record per detail page,
//! and appends every record to a crash-safe CSV file as soon as it is produced.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod record;
pub mod render;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] render::RenderError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Batch {batch} failed: {message}")]
    Batch { batch: String, message: String },

    #[error("Run cancelled by operator")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{create_batches, BatchPlan, Coordinator};
pub use output::RunStats;
pub use record::{Classification, RawFields, Record, RecordStatus};
pub use state::{NavState, RunState};
pub use crate::url::normalize_detail_ref;
