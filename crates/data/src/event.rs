//! The immutable historical event record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One historical occurrence: features known beforehand plus realized outcomes.
///
/// Missing feature values are stored as `NaN` and lower the event's
/// completeness; outcomes are always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
    /// Realized outcomes, one per configured outcome dimension.
    pub outcomes: Vec<f64>,
}

impl Event {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        features: Vec<f64>,
        outcomes: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            features,
            outcomes,
        }
    }

    /// Share of feature values that are present (finite), in [0, 1].
    ///
    /// An event with no features is considered complete.
    #[must_use]
    pub fn completeness(&self) -> f64 {
        if self.features.is_empty() {
            return 1.0;
        }
        let present = self.features.iter().filter(|v| v.is_finite()).count();
        present as f64 / self.features.len() as f64
    }
}

/// Parses a calendar date or timestamp.
///
/// Accepts RFC 3339 (`2024-01-15T19:30:00Z`), `YYYY-MM-DD HH:MM:SS`, and bare
/// `YYYY-MM-DD` (midnight UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
