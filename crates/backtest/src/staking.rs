//! Turns prediction edges into sized, settled bets.
//!
//! For each outcome dimension the engine compares the prediction to the
//! market line, filters small edges, maps the edge to a calibrated win
//! probability, sizes the stake with fractional Kelly under a bankroll cap,
//! and settles against the realized outcome.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkline_core::{
    BacktestError, BetReason, DimensionSettings, KellySizer, LedgerIntegrityError, StakingSettings,
};

use crate::ledger::{BankrollEntry, BankrollLedger, LedgerCursor};
use crate::market::MarketQuote;
use crate::outcome::{BetOpportunity, BetOutcome};
use crate::walk_forward::PredictionRecord;

/// Why a dimension was not bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Prediction, line, or realized value missing or not finite.
    MissingValue,
    /// Edge below the dimension's minimum.
    BelowThreshold,
    /// Calibrated probability does not beat the price.
    NoPositiveKelly,
    /// Stake rounded below the minimum unit.
    BelowMinimumStake,
    /// Nothing left to stake.
    Bankrupt,
}

/// Outcome of evaluating one dimension of one event.
#[derive(Debug, Clone, PartialEq)]
pub enum StakeDecision {
    Bet(BankrollEntry),
    Skip {
        dimension: usize,
        reason: SkipReason,
    },
}

/// Counters over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingSummary {
    pub considered: usize,
    pub placed: usize,
    pub missing_value: usize,
    pub below_threshold: usize,
    pub no_positive_kelly: usize,
    pub below_minimum_stake: usize,
    pub bankrupt: usize,
}

impl StakingSummary {
    pub fn record(&mut self, decision: &StakeDecision) {
        self.considered += 1;
        match decision {
            StakeDecision::Bet(_) => self.placed += 1,
            StakeDecision::Skip { reason, .. } => match reason {
                SkipReason::MissingValue => self.missing_value += 1,
                SkipReason::BelowThreshold => self.below_threshold += 1,
                SkipReason::NoPositiveKelly => self.no_positive_kelly += 1,
                SkipReason::BelowMinimumStake => self.below_minimum_stake += 1,
                SkipReason::Bankrupt => self.bankrupt += 1,
            },
        }
    }
}

pub struct StakingEngine {
    settings: StakingSettings,
    dimensions: Vec<DimensionSettings>,
    sizer: KellySizer,
    net_odds: Decimal,
}

impl StakingEngine {
    /// # Errors
    /// Returns `BacktestError::InvalidConfig` if the configured price is not a
    /// valid American quote.
    pub fn new(
        settings: &StakingSettings,
        dimensions: &[DimensionSettings],
    ) -> Result<Self, BacktestError> {
        let net_odds = settings.odds.net_odds().ok_or_else(|| {
            BacktestError::InvalidConfig(format!("invalid American odds {}", settings.odds.0))
        })?;
        Ok(Self {
            settings: settings.clone(),
            dimensions: dimensions.to_vec(),
            sizer: KellySizer::new(
                settings.kelly_multiplier,
                settings.stake_cap_fraction,
                settings.min_stake,
            ),
            net_odds,
        })
    }

    #[must_use]
    pub fn net_odds(&self) -> Decimal {
        self.net_odds
    }

    #[must_use]
    pub fn dimensions(&self) -> &[DimensionSettings] {
        &self.dimensions
    }

    /// Minimum edge for a dimension: `min_edge × edge_multiplier`.
    #[must_use]
    pub fn threshold(&self, dimension: usize) -> f64 {
        self.dimensions
            .get(dimension)
            .map_or(self.settings.min_edge, |d| self.settings.min_edge * d.edge_multiplier)
    }

    /// Candidate wager for one dimension, before any threshold is applied.
    #[must_use]
    pub fn opportunity(
        &self,
        record: &PredictionRecord,
        quote: &MarketQuote,
        dimension: usize,
    ) -> Option<BetOpportunity> {
        let dim = self.dimensions.get(dimension)?;
        let prediction = *record.predicted.get(dimension)?;
        let line = quote.line(dimension)?;
        if !prediction.is_finite() || !line.is_finite() {
            return None;
        }
        let edge = (prediction - line).abs();
        let confidence =
            (edge / self.settings.confidence_saturation).min(1.0) * record.completeness;
        Some(BetOpportunity::new(
            &record.event_id,
            &dim.name,
            dim.kind,
            prediction,
            line,
            confidence,
        ))
    }

    /// Evaluates one dimension against the ledger position in `cursor`.
    #[must_use]
    pub fn assess(
        &self,
        record: &PredictionRecord,
        quote: &MarketQuote,
        dimension: usize,
        cursor: LedgerCursor,
    ) -> StakeDecision {
        let skip = |reason| StakeDecision::Skip { dimension, reason };

        let Some(opp) = self.opportunity(record, quote, dimension) else {
            return skip(SkipReason::MissingValue);
        };
        let Some(realized) = record.realized.get(dimension).copied().filter(|r| r.is_finite())
        else {
            return skip(SkipReason::MissingValue);
        };
        if opp.edge < self.threshold(dimension) {
            return skip(SkipReason::BelowThreshold);
        }
        if cursor.bankroll <= Decimal::ZERO {
            return skip(SkipReason::Bankrupt);
        }

        let multiplier = self.dimensions[dimension].edge_multiplier;
        let win_probability = self.settings.calibration.win_probability(opp.edge, multiplier);
        let Some(p) = Decimal::from_f64(win_probability) else {
            return skip(SkipReason::MissingValue);
        };

        let sizing = self.sizer.size(p, self.net_odds, cursor.bankroll);
        if !sizing.should_bet {
            let reason = match sizing.reason {
                BetReason::BelowMinimumStake => SkipReason::BelowMinimumStake,
                _ => SkipReason::NoPositiveKelly,
            };
            return skip(reason);
        }

        let stake = sizing.stake;
        let outcome = BetOutcome::resolve(opp.side, opp.line, realized);
        let profit = outcome.profit(stake, self.net_odds);

        StakeDecision::Bet(BankrollEntry {
            sequence: cursor.next_sequence,
            event_id: record.event_id.clone(),
            timestamp: record.timestamp,
            bet_type: opp.dimension,
            side: opp.side,
            prediction: opp.prediction,
            line: opp.line,
            realized,
            edge: opp.edge,
            win_probability,
            confidence: opp.confidence,
            stake,
            outcome,
            profit,
            bankroll_before: cursor.bankroll,
            bankroll_after: cursor.bankroll + profit,
        })
    }

    /// The entry to append for one dimension, if a bet is placed.
    #[must_use]
    pub fn decide(
        &self,
        record: &PredictionRecord,
        quote: &MarketQuote,
        dimension: usize,
        cursor: LedgerCursor,
    ) -> Option<BankrollEntry> {
        match self.assess(record, quote, dimension, cursor) {
            StakeDecision::Bet(entry) => Some(entry),
            StakeDecision::Skip { .. } => None,
        }
    }

    /// Stakes every dimension of one event in configured order, appending
    /// each placed bet before sizing the next.
    ///
    /// # Errors
    /// Returns `LedgerIntegrityError` if the ledger rejects an entry.
    pub fn stake_event(
        &self,
        record: &PredictionRecord,
        quote: &MarketQuote,
        ledger: &mut BankrollLedger,
    ) -> Result<Vec<StakeDecision>, LedgerIntegrityError> {
        let mut decisions = Vec::with_capacity(self.dimensions.len());
        for dimension in 0..self.dimensions.len() {
            let decision = self.assess(record, quote, dimension, ledger.cursor());
            if let StakeDecision::Bet(entry) = &decision {
                ledger.append(entry.clone())?;
                debug!(
                    event_id = %entry.event_id,
                    bet_type = %entry.bet_type,
                    side = %entry.side,
                    stake = %entry.stake,
                    outcome = %entry.outcome,
                    bankroll = %entry.bankroll_after,
                    "bet settled"
                );
            }
            decisions.push(decision);
        }
        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rust_decimal_macros::dec;
    use walkline_core::{AmericanOdds, MarketKind};

    fn margin_only() -> Vec<DimensionSettings> {
        vec![DimensionSettings::spread("margin")]
    }

    fn settings(min_edge: f64) -> StakingSettings {
        StakingSettings {
            min_edge,
            ..StakingSettings::default()
        }
    }

    fn record(predicted: f64, realized: f64) -> PredictionRecord {
        PredictionRecord {
            event_index: 0,
            event_id: "g1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            predicted: vec![predicted],
            realized: vec![realized],
            training_size: 10,
            completeness: 1.0,
            fit_warning: None,
        }
    }

    fn quote(line: f64) -> MarketQuote {
        MarketQuote::observed("g1", vec![line])
    }

    fn cursor(bankroll: Decimal) -> LedgerCursor {
        LedgerCursor {
            next_sequence: 1,
            bankroll,
        }
    }

    // ============================================
    // Threshold Tests
    // ============================================

    #[test]
    fn edge_below_threshold_is_skipped() {
        let engine = StakingEngine::new(&settings(2.5), &margin_only()).unwrap();
        let decision = engine.assess(&record(-3.0, 0.0), &quote(-1.0), 0, cursor(dec!(10000)));
        assert_eq!(
            decision,
            StakeDecision::Skip {
                dimension: 0,
                reason: SkipReason::BelowThreshold
            }
        );
    }

    #[test]
    fn total_threshold_scaled_by_multiplier() {
        let dims = vec![DimensionSettings::total("total")];
        let engine = StakingEngine::new(&settings(2.0), &dims).unwrap();
        assert!((engine.threshold(0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_boundary_property() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..500 {
            let threshold: f64 = rng.gen_range(2.5..8.0);
            let line: f64 = rng.gen_range(-12.0..12.0);
            let delta: f64 = rng.gen_range(1e-6..0.05);
            let engine = StakingEngine::new(&settings(threshold), &margin_only()).unwrap();

            let below = record(line + threshold - delta, line + 20.0);
            assert!(engine
                .decide(&below, &quote(line), 0, cursor(dec!(10000)))
                .is_none());

            let above = record(line + threshold + delta, line + 20.0);
            let entry = engine
                .decide(&above, &quote(line), 0, cursor(dec!(10000)))
                .expect("edge just above threshold should bet");
            assert!(entry.edge >= threshold);
        }
    }

    // ============================================
    // Sizing Tests
    // ============================================

    #[test]
    fn stake_never_exceeds_cap() {
        let engine = StakingEngine::new(&settings(1.0), &margin_only()).unwrap();
        for edge in [2.0, 5.0, 10.0, 30.0, 100.0] {
            if let Some(entry) = engine.decide(&record(edge, 50.0), &quote(0.0), 0, cursor(dec!(10000))) {
                assert!(entry.stake > Decimal::ZERO);
                assert!(entry.stake <= dec!(500), "stake {} at edge {edge}", entry.stake);
            }
        }
    }

    #[test]
    fn huge_edge_hits_cap_exactly() {
        let mut s = settings(1.0);
        s.kelly_multiplier = dec!(1);
        let engine = StakingEngine::new(&s, &margin_only()).unwrap();
        let entry = engine
            .decide(&record(100.0, 101.0), &quote(0.0), 0, cursor(dec!(10000)))
            .unwrap();
        assert_eq!(entry.stake, dec!(500));
    }

    #[test]
    fn edge_without_positive_kelly_is_skipped() {
        // edge 1.5 maps to p = 0.515, below the 52.4% break-even at -110
        let engine = StakingEngine::new(&settings(1.0), &margin_only()).unwrap();
        let decision = engine.assess(&record(1.5, 10.0), &quote(0.0), 0, cursor(dec!(10000)));
        assert_eq!(
            decision,
            StakeDecision::Skip {
                dimension: 0,
                reason: SkipReason::NoPositiveKelly
            }
        );
    }

    #[test]
    fn tiny_bankroll_below_minimum_stake() {
        let engine = StakingEngine::new(&settings(1.0), &margin_only()).unwrap();
        let decision = engine.assess(&record(3.0, 10.0), &quote(0.0), 0, cursor(dec!(0.50)));
        assert_eq!(
            decision,
            StakeDecision::Skip {
                dimension: 0,
                reason: SkipReason::BelowMinimumStake
            }
        );
    }

    #[test]
    fn empty_bankroll_is_bankrupt() {
        let engine = StakingEngine::new(&settings(1.0), &margin_only()).unwrap();
        let decision = engine.assess(&record(10.0, 20.0), &quote(0.0), 0, cursor(Decimal::ZERO));
        assert_eq!(
            decision,
            StakeDecision::Skip {
                dimension: 0,
                reason: SkipReason::Bankrupt
            }
        );
    }

    // ============================================
    // Settlement Tests
    // ============================================

    #[test]
    fn forced_loss_costs_exact_stake() {
        let engine = StakingEngine::new(&settings(1.0), &margin_only()).unwrap();
        // bet home at line 0, realized -7
        let entry = engine
            .decide(&record(6.0, -7.0), &quote(0.0), 0, cursor(dec!(10000)))
            .unwrap();
        assert_eq!(entry.outcome, BetOutcome::Loss);
        assert_eq!(entry.profit, -entry.stake);
        assert_eq!(entry.bankroll_after, dec!(10000) - entry.stake);
    }

    #[test]
    fn push_on_the_line() {
        let engine = StakingEngine::new(&settings(1.0), &margin_only()).unwrap();
        let entry = engine
            .decide(&record(6.0, 2.0), &quote(2.0), 0, cursor(dec!(10000)))
            .unwrap();
        assert_eq!(entry.outcome, BetOutcome::Push);
        assert_eq!(entry.bankroll_after, dec!(10000));
    }

    #[test]
    fn low_side_bet_on_total() {
        let dims = vec![DimensionSettings::total("total")];
        let engine = StakingEngine::new(&settings(1.0), &dims).unwrap();
        let entry = engine
            .decide(&record(200.0, 195.0), &quote(210.5), 0, cursor(dec!(10000)))
            .unwrap();
        assert_eq!(entry.side, crate::outcome::Side::Under);
        assert_eq!(entry.outcome, BetOutcome::Win);
        assert!(entry.profit > Decimal::ZERO);
        assert_eq!(engine.dimensions()[0].kind, MarketKind::Total);
    }

    // ============================================
    // Non-standard Price Tests
    // ============================================

    fn priced(odds: i32) -> StakingSettings {
        StakingSettings {
            min_edge: 1.0,
            odds: AmericanOdds(odds),
            ..StakingSettings::default()
        }
    }

    #[test]
    fn plus_money_win_pays_full_multiple() {
        // +150: b = 1.5, p = 0.55 gives f* = 0.25, quarter Kelly hits the 5% cap
        let engine = StakingEngine::new(&priced(150), &margin_only()).unwrap();
        let mut ledger = BankrollLedger::new(dec!(10000));
        engine
            .stake_event(&record(5.0, 3.0), &quote(0.0), &mut ledger)
            .unwrap();

        let entry = &ledger.entries()[0];
        assert_eq!(entry.stake, dec!(500));
        assert_eq!(entry.outcome, BetOutcome::Win);
        assert_eq!(entry.profit, dec!(750));
        assert_eq!(ledger.final_bankroll(), dec!(10750));
    }

    #[test]
    fn short_price_win_and_loss_chain() {
        // -300: b = 1/3, p = 0.9 gives f* = 0.6, quarter Kelly capped at 5%
        let engine = StakingEngine::new(&priced(-300), &margin_only()).unwrap();
        let mut ledger = BankrollLedger::new(dec!(10000));
        engine
            .stake_event(&record(40.0, 4.0), &quote(0.0), &mut ledger)
            .unwrap();
        engine
            .stake_event(&record(40.0, -4.0), &quote(0.0), &mut ledger)
            .unwrap();

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stake, dec!(500));
        assert_eq!(entries[0].profit, dec!(166.67));
        assert_eq!(entries[1].bankroll_before, dec!(10166.67));
        assert_eq!(entries[1].outcome, BetOutcome::Loss);
        assert_eq!(entries[1].profit, -entries[1].stake);
        for e in entries {
            assert_eq!(e.bankroll_after, e.bankroll_before + e.profit);
        }
    }

    #[test]
    fn short_price_skips_win_worth_less_than_a_cent() {
        // -200 with 0.20 left: a 0.01 stake would win 0.005, which settles to 0.00
        let engine = StakingEngine::new(&priced(-200), &margin_only()).unwrap();
        let decision = engine.assess(&record(48.0, 50.0), &quote(0.0), 0, cursor(dec!(0.20)));
        assert_eq!(
            decision,
            StakeDecision::Skip {
                dimension: 0,
                reason: SkipReason::BelowMinimumStake
            }
        );

        let mut ledger = BankrollLedger::new(dec!(0.20));
        let decisions = engine
            .stake_event(&record(48.0, 50.0), &quote(0.0), &mut ledger)
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn short_price_small_bankrolls_never_break_the_ledger() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        for _ in 0..2000 {
            let odds = [-150, -200, -300, -500][rng.gen_range(0..4)];
            let engine = StakingEngine::new(&priced(odds), &margin_only()).unwrap();
            let bankroll = Decimal::new(rng.gen_range(1..300), 2);
            let edge = rng.gen_range(20.0..60.0);
            let realized = if rng.gen_bool(0.5) { edge + 1.0 } else { -1.0 };

            let mut ledger = BankrollLedger::new(bankroll);
            engine
                .stake_event(&record(edge, realized), &quote(0.0), &mut ledger)
                .unwrap();
            for e in ledger.entries() {
                assert!(e.stake > Decimal::ZERO);
                match e.outcome {
                    BetOutcome::Win => assert!(e.profit > Decimal::ZERO),
                    BetOutcome::Loss => assert_eq!(e.profit, -e.stake),
                    BetOutcome::Push => assert_eq!(e.profit, Decimal::ZERO),
                }
            }
        }
    }

    // ============================================
    // stake_event Tests
    // ============================================

    #[test]
    fn stake_event_chains_bankroll_across_dimensions() {
        let dims = vec![
            DimensionSettings::spread("margin"),
            DimensionSettings::total("total"),
        ];
        let engine = StakingEngine::new(&settings(1.0), &dims).unwrap();
        let mut rec = record(8.0, 10.0);
        rec.predicted.push(230.0);
        rec.realized.push(190.0);
        let q = MarketQuote::observed("g1", vec![0.0, 210.0]);

        let mut ledger = BankrollLedger::new(dec!(10000));
        let decisions = engine.stake_event(&rec, &q, &mut ledger).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(ledger.len(), 2);
        let entries = ledger.entries();
        assert_eq!(entries[1].bankroll_before, entries[0].bankroll_after);
        assert_eq!(entries[1].sequence, 2);
        assert_eq!(entries[1].outcome, BetOutcome::Loss);
    }

    #[test]
    fn summary_counts_decisions() {
        let mut summary = StakingSummary::default();
        summary.record(&StakeDecision::Skip {
            dimension: 0,
            reason: SkipReason::BelowThreshold,
        });
        summary.record(&StakeDecision::Skip {
            dimension: 1,
            reason: SkipReason::NoPositiveKelly,
        });
        assert_eq!(summary.considered, 2);
        assert_eq!(summary.below_threshold, 1);
        assert_eq!(summary.no_positive_kelly, 1);
        assert_eq!(summary.placed, 0);
    }
}
