//! Event history storage for walk-forward backtests.
//!
//! This crate provides:
//! - The immutable `Event` record
//! - `EventHistoryStore`, a validated, time-ordered event set
//! - CSV ingestion and generic CSV row persistence

pub mod csv_storage;
pub mod event;
pub mod history;

pub use csv_storage::{CsvStorage, EventTable};
pub use event::{parse_timestamp, Event};
pub use history::EventHistoryStore;
