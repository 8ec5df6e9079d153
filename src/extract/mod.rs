//! Detail-page extraction
//!
//! An `Extractor` maps one rendered detail document onto the flat
//! `RawFields` mapping that `Record::from_raw` consumes.

mod school;

pub use school::SchoolDetailExtractor;

use crate::record::RawFields;
use thiserror::Error;

/// Errors that can occur while extracting fields from a document
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Missing section: {0}")]
    MissingSection(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Maps a rendered document onto named fields
///
/// Extraction is synchronous and must not hold parsed documents across
/// await points.
pub trait Extractor: Send + Sync {
    fn extract(&self, document: &str) -> Result<RawFields, ExtractError>;
}
