//! Typed rows produced by the translator and written by the committer

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable identifier assigned by the store when a record is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One measurement observation (maps to the `records` table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Free-form category identifier, e.g. `HKQuantityTypeIdentifierStepCount`
    pub record_type: String,
    pub unit: Option<String>,
    /// Kept verbatim; consumers cast as needed
    pub value: Option<String>,
    pub source_name: Option<String>,
    pub source_version: Option<String>,
    pub device: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub start_date: DateTime<FixedOffset>,
    pub end_date: Option<DateTime<FixedOffset>>,
}

/// Key/value annotation read from a `MetadataEntry` child, before its
/// parent record has an identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub value: String,
}

impl Annotation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bind the annotation to the record that now owns it
    pub fn attach(self, record_id: RecordId) -> MetadataEntry {
        MetadataEntry {
            record_id,
            key: self.key,
            value: self.value,
        }
    }
}

/// Annotation row (maps to the `record_metadata` table)
///
/// Only built through [`Annotation::attach`], so every row references a
/// record the store has already assigned a [`RecordId`] to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    record_id: RecordId,
    key: String,
    value: String,
}

impl MetadataEntry {
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Output of a successful translation: the record and its annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedEntry {
    pub record: Record,
    pub annotations: Vec<Annotation>,
}
