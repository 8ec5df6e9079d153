//! Record module: the unit of output
//!
//! # Components
//!
//! - `RawFields`: the flat field mapping produced by an extractor
//! - `Record`: one output row, built from raw fields or from a fetch failure
//! - `Classification`: open-ended classification value
//! - `RecordStatus`: SUCCESS / ERROR / SKIPPED lifecycle status

mod classification;
mod status;

pub use classification::{Classification, KnownClassification};
pub use status::RecordStatus;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Names of the data fields an extractor may fill, in output order
pub const DATA_FIELDS: [&str; 22] = [
    "teaching_directorate",
    "neighborhood",
    "municipality",
    "phone",
    "email",
    "ideb_score_final_years",
    "idesp_score_final_years",
    "ideb_score_high_school",
    "idesp_score_high_school",
    "total_students",
    "age_06_10_final_years",
    "age_11_14_final_years",
    "age_15_17_final_years",
    "age_18_plus_final_years",
    "age_06_10_high_school",
    "age_11_14_high_school",
    "age_15_17_high_school",
    "age_18_plus_high_school",
    "total_classes",
    "classes_final_years",
    "classes_high_school",
    "total_classrooms",
];

/// Raw field name for the record's display name
pub const NAME_FIELD: &str = "name";

/// Raw field name for the classification tag text
pub const CLASSIFICATION_FIELD: &str = "classification";

/// Flat mapping of named string fields produced by an extractor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    fields: HashMap<String, String>,
}

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any earlier value
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Sets a field only if it is currently missing or empty
    pub fn set_if_empty(&mut self, name: &str, value: impl Into<String>) {
        if self.get(name).is_empty() {
            self.set(name, value);
        }
    }

    /// Returns the field value, or an empty string when missing
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Returns the field value if present
    pub fn get_opt(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawFields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub classification: Classification,
    pub detail_url: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub status: RecordStatus,
    /// Data fields in `DATA_FIELDS` order
    pub data: Vec<String>,
    pub error_message: Option<String>,
}

impl Record {
    /// Output column names, in order
    pub const COLUMNS: [&'static str; 28] = [
        "school_name",
        "classification",
        "detail_url",
        "extraction_timestamp",
        "status",
        "teaching_directorate",
        "neighborhood",
        "municipality",
        "phone",
        "email",
        "ideb_score_final_years",
        "idesp_score_final_years",
        "ideb_score_high_school",
        "idesp_score_high_school",
        "total_students",
        "age_06_10_final_years",
        "age_11_14_final_years",
        "age_15_17_final_years",
        "age_18_plus_final_years",
        "age_06_10_high_school",
        "age_11_14_high_school",
        "age_15_17_high_school",
        "age_18_plus_high_school",
        "total_classes",
        "classes_final_years",
        "classes_high_school",
        "total_classrooms",
        "error_message",
    ];

    /// Builds a SUCCESS record from extracted fields
    pub fn from_raw(detail_url: &str, raw: &RawFields) -> Self {
        Self {
            name: raw.get(NAME_FIELD).to_string(),
            classification: Classification::parse(raw.get_opt(CLASSIFICATION_FIELD)),
            detail_url: detail_url.to_string(),
            extraction_timestamp: Utc::now(),
            status: RecordStatus::Success,
            data: DATA_FIELDS
                .iter()
                .map(|field| raw.get(field).to_string())
                .collect(),
            error_message: None,
        }
    }

    /// Builds an ERROR record for a reference that could not be fetched
    pub fn error(detail_url: &str, message: impl Into<String>) -> Self {
        Self::empty(detail_url, RecordStatus::Error, Some(message.into()))
    }

    /// Builds a SKIPPED record for a reference that was deliberately not fetched
    pub fn skipped(detail_url: &str, reason: impl Into<String>) -> Self {
        Self::empty(detail_url, RecordStatus::Skipped, Some(reason.into()))
    }

    fn empty(detail_url: &str, status: RecordStatus, error_message: Option<String>) -> Self {
        Self {
            name: String::new(),
            classification: Classification::Unknown,
            detail_url: detail_url.to_string(),
            extraction_timestamp: Utc::now(),
            status,
            data: vec![String::new(); DATA_FIELDS.len()],
            error_message,
        }
    }

    /// Returns a data field by name, or None for an unknown field name
    pub fn field(&self, name: &str) -> Option<&str> {
        DATA_FIELDS
            .iter()
            .position(|f| *f == name)
            .and_then(|idx| self.data.get(idx))
            .map(String::as_str)
    }

    /// Serializes the record into one row matching `Record::COLUMNS`
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(Self::COLUMNS.len());
        row.push(self.name.clone());
        row.push(self.classification.as_str().to_string());
        row.push(self.detail_url.clone());
        row.push(self.extraction_timestamp.to_rfc3339());
        row.push(self.status.as_str().to_string());
        row.extend(self.data.iter().cloned());
        row.push(self.error_message.clone().unwrap_or_default());
        row
    }
}
