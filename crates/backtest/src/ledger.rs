//! Append-only bankroll ledger.
//!
//! The ledger is the single owner of bankroll truth. Every append is checked
//! against the previous state; a rejected entry leaves the ledger untouched.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use walkline_core::LedgerIntegrityError;
use walkline_data::CsvStorage;

use crate::outcome::{BetOutcome, Side};

/// One settled bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollEntry {
    /// 1-based, gapless.
    pub sequence: u64,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// Outcome dimension wagered on, e.g. "margin".
    pub bet_type: String,
    pub side: Side,
    pub prediction: f64,
    pub line: f64,
    pub realized: f64,
    pub edge: f64,
    pub win_probability: f64,
    pub confidence: f64,
    pub stake: Decimal,
    pub outcome: BetOutcome,
    pub profit: Decimal,
    pub bankroll_before: Decimal,
    pub bankroll_after: Decimal,
}

impl BankrollEntry {
    /// Return on this bet's stake.
    #[must_use]
    pub fn return_on_stake(&self) -> f64 {
        if self.stake <= Decimal::ZERO {
            return 0.0;
        }
        decimal_to_f64(self.profit / self.stake)
    }
}

/// Where the next entry must start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCursor {
    pub next_sequence: u64,
    pub bankroll: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollLedger {
    starting_bankroll: Decimal,
    entries: Vec<BankrollEntry>,
}

impl BankrollLedger {
    #[must_use]
    pub fn new(starting_bankroll: Decimal) -> Self {
        Self {
            starting_bankroll,
            entries: Vec::new(),
        }
    }

    /// Rebuilds a ledger by appending `entries` in order.
    ///
    /// # Errors
    /// Returns the first `LedgerIntegrityError` encountered.
    pub fn from_entries(
        starting_bankroll: Decimal,
        entries: impl IntoIterator<Item = BankrollEntry>,
    ) -> Result<Self, LedgerIntegrityError> {
        let mut ledger = Self::new(starting_bankroll);
        for entry in entries {
            ledger.append(entry)?;
        }
        Ok(ledger)
    }

    /// Appends an entry after checking it continues the ledger exactly.
    ///
    /// Checks: sequence = previous + 1; bankroll_before = previous
    /// bankroll_after (or the starting bankroll); 0 < stake ≤ bankroll_before;
    /// profit consistent with the outcome; bankroll_after = before + profit.
    ///
    /// # Errors
    /// Returns `LedgerIntegrityError` and leaves the ledger unchanged.
    pub fn append(&mut self, entry: BankrollEntry) -> Result<&BankrollEntry, LedgerIntegrityError> {
        if let Err(e) = self.check(&entry) {
            error!(sequence = entry.sequence, event_id = %entry.event_id, error = %e, "ledger rejected entry");
            return Err(e);
        }
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    fn check(&self, entry: &BankrollEntry) -> Result<(), LedgerIntegrityError> {
        let cursor = self.cursor();
        let sequence = entry.sequence;

        if sequence != cursor.next_sequence {
            return Err(LedgerIntegrityError::SequenceGap {
                expected: cursor.next_sequence,
                found: sequence,
            });
        }
        if entry.bankroll_before != cursor.bankroll {
            return Err(LedgerIntegrityError::Discontinuity {
                sequence,
                expected: cursor.bankroll,
                found: entry.bankroll_before,
            });
        }
        if entry.stake <= Decimal::ZERO || entry.stake > entry.bankroll_before {
            return Err(LedgerIntegrityError::InvalidStake {
                sequence,
                stake: entry.stake,
                bankroll: entry.bankroll_before,
            });
        }
        let consistent = match entry.outcome {
            BetOutcome::Win => entry.profit > Decimal::ZERO,
            BetOutcome::Loss => entry.profit == -entry.stake,
            BetOutcome::Push => entry.profit.is_zero(),
        };
        if !consistent {
            return Err(LedgerIntegrityError::OutcomeMismatch {
                sequence,
                outcome: entry.outcome.to_string(),
                profit: entry.profit,
            });
        }
        if entry.bankroll_before + entry.profit != entry.bankroll_after {
            return Err(LedgerIntegrityError::Arithmetic {
                sequence,
                before: entry.bankroll_before,
                profit: entry.profit,
                after: entry.bankroll_after,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn cursor(&self) -> LedgerCursor {
        LedgerCursor {
            next_sequence: self.entries.last().map_or(1, |e| e.sequence + 1),
            bankroll: self.final_bankroll(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[BankrollEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn starting_bankroll(&self) -> Decimal {
        self.starting_bankroll
    }

    #[must_use]
    pub fn final_bankroll(&self) -> Decimal {
        self.entries
            .last()
            .map_or(self.starting_bankroll, |e| e.bankroll_after)
    }

    /// Writes the ledger as CSV, one row per entry.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        CsvStorage::write_rows(path, &self.entries)
    }

    /// Reads and re-validates a ledger written by [`Self::write_csv`].
    ///
    /// The starting bankroll is the first entry's `bankroll_before`, or
    /// `default_start` for an empty file.
    ///
    /// # Errors
    /// Returns error if the file cannot be parsed or fails integrity checks.
    pub fn read_csv(path: &Path, default_start: Decimal) -> Result<Self> {
        let entries: Vec<BankrollEntry> = CsvStorage::read_rows(path)?;
        let start = entries.first().map_or(default_start, |e| e.bankroll_before);
        Self::from_entries(start, entries)
            .with_context(|| format!("ledger {} failed integrity checks", path.display()))
    }
}

pub(crate) fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn entry(sequence: u64, before: Decimal, stake: Decimal, outcome: BetOutcome) -> BankrollEntry {
        let profit = outcome.profit(stake, dec!(100) / dec!(110));
        BankrollEntry {
            sequence,
            event_id: format!("g{sequence}"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            bet_type: "margin".to_string(),
            side: Side::Home,
            prediction: 5.0,
            line: 2.0,
            realized: 4.0,
            edge: 3.0,
            win_probability: 0.53,
            confidence: 0.3,
            stake,
            outcome,
            profit,
            bankroll_before: before,
            bankroll_after: before + profit,
        }
    }

    // ============================================
    // Append Tests
    // ============================================

    #[test]
    fn appends_continuous_entries() {
        let mut ledger = BankrollLedger::new(dec!(1000));
        let first = entry(1, dec!(1000), dec!(50), BetOutcome::Win);
        let after = first.bankroll_after;
        ledger.append(first).unwrap();
        ledger.append(entry(2, after, dec!(20), BetOutcome::Loss)).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.final_bankroll(), after - dec!(20));
        assert_eq!(ledger.cursor().next_sequence, 3);
    }

    #[test]
    fn rejects_sequence_gap() {
        let mut ledger = BankrollLedger::new(dec!(1000));
        let err = ledger
            .append(entry(2, dec!(1000), dec!(10), BetOutcome::Win))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerIntegrityError::SequenceGap {
                expected: 1,
                found: 2
            }
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn rejects_discontinuity() {
        let mut ledger = BankrollLedger::new(dec!(1000));
        let err = ledger
            .append(entry(1, dec!(999), dec!(10), BetOutcome::Win))
            .unwrap_err();
        assert!(matches!(err, LedgerIntegrityError::Discontinuity { .. }));
    }

    #[test]
    fn recomputes_bankroll_after() {
        let mut ledger = BankrollLedger::new(dec!(1000));
        let mut bad = entry(1, dec!(1000), dec!(10), BetOutcome::Win);
        bad.bankroll_after += dec!(0.01);
        let err = ledger.append(bad).unwrap_err();
        assert!(matches!(err, LedgerIntegrityError::Arithmetic { .. }));
        assert_eq!(ledger.final_bankroll(), dec!(1000));
    }

    #[test]
    fn rejects_stake_above_bankroll() {
        let mut ledger = BankrollLedger::new(dec!(100));
        let err = ledger
            .append(entry(1, dec!(100), dec!(100.01), BetOutcome::Loss))
            .unwrap_err();
        assert!(matches!(err, LedgerIntegrityError::InvalidStake { .. }));
    }

    #[test]
    fn rejects_zero_stake() {
        let mut ledger = BankrollLedger::new(dec!(100));
        let err = ledger
            .append(entry(1, dec!(100), dec!(0), BetOutcome::Push))
            .unwrap_err();
        assert!(matches!(err, LedgerIntegrityError::InvalidStake { .. }));
    }

    #[test]
    fn rejects_loss_not_equal_to_stake() {
        let mut ledger = BankrollLedger::new(dec!(100));
        let mut bad = entry(1, dec!(100), dec!(10), BetOutcome::Loss);
        bad.profit = dec!(-9);
        bad.bankroll_after = dec!(91);
        let err = ledger.append(bad).unwrap_err();
        assert!(matches!(err, LedgerIntegrityError::OutcomeMismatch { .. }));
    }

    #[test]
    fn push_keeps_bankroll() {
        let mut ledger = BankrollLedger::new(dec!(100));
        ledger
            .append(entry(1, dec!(100), dec!(10), BetOutcome::Push))
            .unwrap();
        assert_eq!(ledger.final_bankroll(), dec!(100));
    }

    // ============================================
    // Persistence Tests
    // ============================================

    #[test]
    fn csv_round_trip_revalidates() {
        let mut ledger = BankrollLedger::new(dec!(1000));
        let first = entry(1, dec!(1000), dec!(50), BetOutcome::Win);
        let after = first.bankroll_after;
        ledger.append(first).unwrap();
        ledger.append(entry(2, after, dec!(20), BetOutcome::Loss)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        ledger.write_csv(&path).unwrap();
        let back = BankrollLedger::read_csv(&path, dec!(1)).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn return_on_stake() {
        let e = entry(1, dec!(1000), dec!(110), BetOutcome::Win);
        assert!((e.return_on_stake() - 100.0 / 110.0).abs() < 1e-4);
        let e = entry(1, dec!(1000), dec!(110), BetOutcome::Loss);
        assert!((e.return_on_stake() + 1.0).abs() < f64::EPSILON);
    }
}
