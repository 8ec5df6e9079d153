/// Record lifecycle status definitions
///
/// Every attempted detail reference ends in exactly one of these states.
use std::fmt;

/// Outcome of processing one detail reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    /// The detail page was loaded and mapped into a record
    Success,

    /// The detail page could not be loaded or parsed after all retries
    Error,

    /// The reference was deliberately not processed
    Skipped,
}

impl RecordStatus {
    /// Converts the status to the string written to the output file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Parses a status from its output file representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Self::Success),
            "ERROR" => Some(Self::Error),
            "SKIPPED" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
