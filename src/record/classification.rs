//! Open-ended record classification
//!
//! The catalog tags each record with a classification. Two values are known
//! and canonicalized; everything else the site prints is kept verbatim rather
//! than being forced into a closed set.

use std::fmt;
use std::hash::{Hash, Hasher};

/// The classifications the harvester knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownClassification {
    /// Programa Ensino Integral
    Pei,
    /// Escola Estadual
    Ee,
}

impl KnownClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pei => "PEI",
            Self::Ee => "EE",
        }
    }
}

/// A classification value that behaves like an enum for known values but
/// passes arbitrary text through unchanged
#[derive(Debug, Clone)]
pub enum Classification {
    Known(KnownClassification),
    Other(String),
    Unknown,
}

impl Classification {
    pub const UNKNOWN: &'static str = "UNKNOWN";

    /// Parses a classification from the text found on a detail page
    ///
    /// Surrounding whitespace is ignored. `PEI` and `EE` match case-insensitively;
    /// empty text is `Unknown`; any other text is preserved as written.
    pub fn parse(text: Option<&str>) -> Self {
        let trimmed = match text.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Self::Unknown,
        };

        if trimmed.eq_ignore_ascii_case("PEI") {
            Self::Known(KnownClassification::Pei)
        } else if trimmed.eq_ignore_ascii_case("EE") {
            Self::Known(KnownClassification::Ee)
        } else if trimmed == Self::UNKNOWN {
            Self::Unknown
        } else {
            Self::Other(trimmed.to_string())
        }
    }

    /// The string carried by this classification
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(known) => known.as_str(),
            Self::Other(text) => text,
            Self::Unknown => Self::UNKNOWN,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::Unknown
    }
}

// Equality and hashing go through the carried string so that
// `Other("PEI")` can never disagree with `Known(Pei)`.
impl PartialEq for Classification {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Classification {}

impl Hash for Classification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
