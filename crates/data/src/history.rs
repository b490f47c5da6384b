//! Immutable, chronologically ordered event history.
//!
//! The store is constructed once and passed by reference to every component
//! that reads history. Input order is never trusted: events are re-sorted by
//! timestamp on construction (stable, so same-timestamp events keep their
//! input order).

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::info;
use walkline_core::{DataIntegrityError, DataSettings};

use crate::csv_storage::CsvStorage;
use crate::event::Event;

#[derive(Debug, Clone)]
pub struct EventHistoryStore {
    events: Vec<Event>,
    feature_names: Vec<String>,
    outcome_names: Vec<String>,
}

impl EventHistoryStore {
    /// Validates and orders a set of events.
    ///
    /// # Errors
    /// Returns `DataIntegrityError` if the set is empty, ids repeat, widths
    /// disagree with the declared names, or an outcome is missing.
    pub fn from_events(
        mut events: Vec<Event>,
        feature_names: Vec<String>,
        outcome_names: Vec<String>,
    ) -> Result<Self, DataIntegrityError> {
        if events.is_empty() {
            return Err(DataIntegrityError::Empty);
        }

        let mut seen = HashSet::with_capacity(events.len());
        for event in &events {
            if !seen.insert(event.id.as_str()) {
                return Err(DataIntegrityError::DuplicateId(event.id.clone()));
            }
            if event.features.len() != feature_names.len() {
                return Err(DataIntegrityError::WidthMismatch {
                    event_id: event.id.clone(),
                    what: "features",
                    expected: feature_names.len(),
                    found: event.features.len(),
                });
            }
            if event.outcomes.len() != outcome_names.len() {
                return Err(DataIntegrityError::WidthMismatch {
                    event_id: event.id.clone(),
                    what: "outcomes",
                    expected: outcome_names.len(),
                    found: event.outcomes.len(),
                });
            }
            if let Some(pos) = event.outcomes.iter().position(|v| !v.is_finite()) {
                return Err(DataIntegrityError::MissingOutcome {
                    event_id: event.id.clone(),
                    outcome: outcome_names[pos].clone(),
                });
            }
        }

        events.sort_by_key(|e| e.timestamp);

        Ok(Self {
            events,
            feature_names,
            outcome_names,
        })
    }

    /// Loads events from a CSV file.
    ///
    /// # Errors
    /// Returns `DataIntegrityError` for unreadable files, malformed rows, or
    /// any violation listed on [`Self::from_events`].
    pub fn load(
        path: &Path,
        settings: &DataSettings,
        outcome_names: &[String],
    ) -> Result<Self, DataIntegrityError> {
        let file = std::fs::File::open(path).map_err(|e| DataIntegrityError::Malformed {
            row: 0,
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        let store = Self::load_reader(file, settings, outcome_names)?;
        if let Some((first, last)) = store.date_range() {
            info!(
                path = %path.display(),
                events = store.len(),
                features = store.feature_names.len(),
                from = %first.format("%Y-%m-%d"),
                to = %last.format("%Y-%m-%d"),
                "event history loaded"
            );
        }
        Ok(store)
    }

    /// Loads events from any CSV reader.
    ///
    /// # Errors
    /// See [`Self::load`].
    pub fn load_reader<R: Read>(
        reader: R,
        settings: &DataSettings,
        outcome_names: &[String],
    ) -> Result<Self, DataIntegrityError> {
        let table = CsvStorage::read_events(reader, settings, outcome_names)?;
        Self::from_events(table.events, table.feature_names, outcome_names.to_vec())
    }

    /// All events, in non-decreasing timestamp order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Every event with timestamp strictly less than `timestamp`.
    ///
    /// Because the store is sorted this is always a prefix.
    #[must_use]
    pub fn slice_before(&self, timestamp: DateTime<Utc>) -> &[Event] {
        let end = self.events.partition_point(|e| e.timestamp < timestamp);
        &self.events[..end]
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn outcome_names(&self) -> &[String] {
        &self.outcome_names
    }

    /// First and last timestamps.
    #[must_use]
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.events.first()?.timestamp, self.events.last()?.timestamp))
    }
}
