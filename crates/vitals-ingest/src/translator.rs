//! Entry translator
//!
//! Turns one [`RawEntry`] into a typed [`Record`] plus its annotations, or
//! into a [`SkipReason`]. Pure and stateless; nothing here touches the store.

use chrono::{DateTime, FixedOffset};
use std::fmt;
use tracing::debug;

use crate::decoder::RawEntry;
use crate::model::{Annotation, Record, TranslatedEntry};

/// Timestamp layout used throughout health exports, e.g. `2024-01-01 10:00:00 +0200`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Child element carrying one key/value annotation
pub const METADATA_TAG: &str = "MetadataEntry";

// Attribute names on a `Record`
const ATTR_TYPE: &str = "type";
const ATTR_UNIT: &str = "unit";
const ATTR_VALUE: &str = "value";
const ATTR_SOURCE_NAME: &str = "sourceName";
const ATTR_SOURCE_VERSION: &str = "sourceVersion";
const ATTR_DEVICE: &str = "device";
const ATTR_CREATION_DATE: &str = "creationDate";
const ATTR_START_DATE: &str = "startDate";
const ATTR_END_DATE: &str = "endDate";

/// Why an entry was left out of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingStartDate,
    InvalidStartDate { raw: String },
    MissingType,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingStartDate => f.write_str("missing startDate"),
            SkipReason::InvalidStartDate { raw } => write!(f, "unparsable startDate '{raw}'"),
            SkipReason::MissingType => f.write_str("missing type"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Accepted(TranslatedEntry),
    Skipped(SkipReason),
}

/// Parse an export timestamp, keeping its UTC offset
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// Translate one decoded entry.
///
/// A missing or unparsable `startDate` and a missing `type` skip the entry.
/// Bad `endDate`/`creationDate` values are stored as absent instead.
pub fn translate(entry: &RawEntry) -> Translation {
    let start_date = match entry.attribute(ATTR_START_DATE) {
        None => return Translation::Skipped(SkipReason::MissingStartDate),
        Some(raw) => match parse_timestamp(raw) {
            Some(ts) => ts,
            None => {
                return Translation::Skipped(SkipReason::InvalidStartDate {
                    raw: raw.to_string(),
                })
            },
        },
    };

    let record_type = match entry.attribute(ATTR_TYPE).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => return Translation::Skipped(SkipReason::MissingType),
    };

    let record = Record {
        record_type,
        unit: owned(entry.attribute(ATTR_UNIT)),
        value: owned(entry.attribute(ATTR_VALUE)),
        source_name: owned(entry.attribute(ATTR_SOURCE_NAME)),
        source_version: owned(entry.attribute(ATTR_SOURCE_VERSION)),
        device: owned(entry.attribute(ATTR_DEVICE)),
        creation_date: optional_timestamp(entry, ATTR_CREATION_DATE),
        start_date,
        end_date: optional_timestamp(entry, ATTR_END_DATE),
    };

    let annotations = entry
        .children
        .iter()
        .filter(|child| child.name == METADATA_TAG)
        .filter_map(|child| match (child.attribute("key"), child.attribute("value")) {
            (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
                Some(Annotation::new(key, value))
            },
            _ => None,
        })
        .collect();

    Translation::Accepted(TranslatedEntry {
        record,
        annotations,
    })
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn optional_timestamp(entry: &RawEntry, name: &str) -> Option<DateTime<FixedOffset>> {
    let raw = entry.attribute(name)?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        debug!(
            position = entry.position,
            attribute = name,
            raw,
            "ignoring unparsable optional timestamp"
        );
    }
    parsed
}
