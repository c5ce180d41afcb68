//! Replication progress markers.
//!
//! A watermark is the `(modified, name)` pair of the last row that was
//! replicated for an entity. The timestamp alone is too coarse to be a
//! position: many rows can share one `modified` value, so the natural key
//! breaks ties.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical text form for stored and logged timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a source or stored timestamp string.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let trimmed = s.trim().trim_end_matches('Z');
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| Error::InvalidTimestamp(s.to_string()))
}

/// Format a timestamp in the canonical form.
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Position in one entity's change stream.
///
/// Ordering is lexicographic on `(time, key)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    time: NaiveDateTime,
    key: String,
}

impl Watermark {
    pub fn new(time: NaiveDateTime, key: impl Into<String>) -> Self {
        Self {
            time,
            key: key.into(),
        }
    }

    /// The "beginning of time" position: 1970-01-01 00:00:00 with an empty key.
    /// Every real row sorts after it.
    pub fn sentinel() -> Self {
        // NaiveDateTime's default is the Unix epoch.
        Self {
            time: NaiveDateTime::default(),
            key: String::new(),
        }
    }

    /// Rebuild a watermark from its two stored strings.
    pub fn from_stored(time: Option<&str>, key: Option<&str>) -> Result<Self> {
        let time = match time {
            Some(t) if !t.trim().is_empty() => parse_timestamp(t)?,
            _ => NaiveDateTime::default(),
        };
        Ok(Self {
            time,
            key: key.unwrap_or_default().to_string(),
        })
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }

    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn time_string(&self) -> String {
        format_timestamp(&self.time)
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {:?})", self.time_string(), self.key)
    }
}
