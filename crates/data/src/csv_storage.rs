use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use walkline_core::{DataIntegrityError, DataSettings};

use crate::event::{parse_timestamp, Event};

/// Events parsed from a CSV table, in file order.
#[derive(Debug, Clone)]
pub struct EventTable {
    pub events: Vec<Event>,
    pub feature_names: Vec<String>,
}

pub struct CsvStorage;

impl CsvStorage {
    /// Reads an event table.
    ///
    /// Format: one header row, then one row per event. The id and timestamp
    /// columns are named by `settings`; every name in `outcome_names` must be a
    /// column. Feature columns are `settings.feature_columns`, or every
    /// remaining column when unset. Empty, `NA` and `NaN` cells are missing
    /// values.
    ///
    /// # Errors
    /// Returns `DataIntegrityError` if a required column is absent or a cell
    /// cannot be parsed.
    pub fn read_events<R: Read>(
        reader: R,
        settings: &DataSettings,
        outcome_names: &[String],
    ) -> Result<EventTable, DataIntegrityError> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| DataIntegrityError::Malformed {
                row: 0,
                message: e.to_string(),
            })?
            .clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DataIntegrityError::MissingColumn(name.to_string()))
        };

        let id_col = column(&settings.id_column)?;
        let ts_col = column(&settings.timestamp_column)?;
        let outcome_cols = outcome_names
            .iter()
            .map(|name| column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let feature_names: Vec<String> = match &settings.feature_columns {
            Some(explicit) => {
                if let Some(reserved) = explicit.iter().find(|name| {
                    **name == settings.id_column
                        || **name == settings.timestamp_column
                        || outcome_names.contains(*name)
                }) {
                    return Err(DataIntegrityError::ReservedFeatureColumn(reserved.clone()));
                }
                explicit.clone()
            }
            None => headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != id_col && *i != ts_col && !outcome_cols.contains(i))
                .map(|(_, h)| h.to_string())
                .collect(),
        };
        let feature_cols = feature_names
            .iter()
            .map(|name| column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut events = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let row = i + 1;
            let record = record.map_err(|e| DataIntegrityError::Malformed {
                row,
                message: e.to_string(),
            })?;

            let id = field(&record, id_col, row)?;
            if id.is_empty() {
                return Err(DataIntegrityError::Malformed {
                    row,
                    message: "empty event id".to_string(),
                });
            }
            let raw_ts = field(&record, ts_col, row)?;
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| DataIntegrityError::Malformed {
                row,
                message: format!("unparseable timestamp '{raw_ts}'"),
            })?;

            let features = feature_cols
                .iter()
                .map(|&c| parse_value(field(&record, c, row)?, row, &headers[c]))
                .collect::<Result<Vec<_>, _>>()?;
            let outcomes = outcome_cols
                .iter()
                .map(|&c| parse_value(field(&record, c, row)?, row, &headers[c]))
                .collect::<Result<Vec<_>, _>>()?;

            events.push(Event::new(id, timestamp, features, outcomes));
        }

        Ok(EventTable {
            events,
            feature_names,
        })
    }

    /// Writes serializable rows to a CSV file with a header row.
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("Failed to write row to {}", path.display()))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads rows previously written by [`Self::write_rows`].
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a row does not deserialize.
    pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(file);
        reader
            .deserialize()
            .enumerate()
            .map(|(i, row)| row.with_context(|| format!("{}: bad row {}", path.display(), i + 1)))
            .collect()
    }
}

fn field(record: &StringRecord, col: usize, row: usize) -> Result<&str, DataIntegrityError> {
    record.get(col).ok_or_else(|| DataIntegrityError::Malformed {
        row,
        message: format!("row has {} cells, expected more than {col}", record.len()),
    })
}

fn parse_value(raw: &str, row: usize, column: &str) -> Result<f64, DataIntegrityError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| DataIntegrityError::Malformed {
        row,
        message: format!("column '{column}': cannot parse '{raw}' as a number"),
    })
}
