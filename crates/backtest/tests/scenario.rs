//! End-to-end runs over small hand-built histories.

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use walkline_backtest::{
    write_artifacts, BacktestRunner, BankrollLedger, BetOutcome, MarketLineSimulator,
    ObservedQuotes, PerformanceAnalyzer, Predictor, RidgeRegressor, Side, TrainingWindow,
};
use walkline_core::{AmericanOdds, DimensionSettings, ModelFitError, RunConfig};
use walkline_data::{Event, EventHistoryStore};

/// Predicts feature 0 as the margin.
#[derive(Debug, Clone, Default)]
struct Echo;

impl Predictor for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn fit(&mut self, window: &TrainingWindow<'_>) -> Result<(), ModelFitError> {
        if window.is_empty() {
            return Err(ModelFitError::EmptyWindow);
        }
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, ModelFitError> {
        Ok(vec![features[0]])
    }
}

fn margin_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.market.dimensions = vec![DimensionSettings::spread("margin")];
    config.market.seed = Some(5);
    config.staking.min_edge = 2.5;
    config.staking.kelly_multiplier = dec!(0.25);
    config.staking.stake_cap_fraction = dec!(0.05);
    config.staking.starting_bankroll = dec!(10000);
    config.walk_forward.train_window = 2;
    config.walk_forward.retrain_every = 1;
    config
}

/// Two warm-up events followed by `(prediction, realized)` pairs.
fn margin_store(games: &[(f64, f64)]) -> EventHistoryStore {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 19, 0, 0).unwrap();
    let mut events = vec![
        Event::new("w1", start, vec![0.0], vec![1.0]),
        Event::new("w2", start + Duration::days(1), vec![0.0], vec![-1.0]),
    ];
    for (i, &(prediction, realized)) in games.iter().enumerate() {
        events.push(Event::new(
            format!("g{}", i + 3),
            start + Duration::days(i as i64 + 2),
            vec![prediction],
            vec![realized],
        ));
    }
    EventHistoryStore::from_events(events, vec!["pred".into()], vec!["margin".into()]).unwrap()
}

fn observed(config: &RunConfig, lines: &[(&str, f64)]) -> ObservedQuotes {
    let fallback = MarketLineSimulator::new(&config.market.dimensions, Some(17)).unwrap();
    let quotes: HashMap<String, Vec<f64>> = lines
        .iter()
        .map(|&(id, line)| (id.to_string(), vec![line]))
        .collect();
    ObservedQuotes::new(quotes, fallback)
}

// ============================================
// Hand-checked scenario
// ============================================

#[test]
fn bets_only_where_edge_clears_threshold() {
    let config = margin_config();
    let store = margin_store(&[(5.0, 6.0), (-3.0, 0.0), (8.0, 1.0)]);
    let mut quotes = observed(&config, &[("g3", 2.0), ("g4", -1.0), ("g5", 3.0)]);

    let results = BacktestRunner::new(config, Echo)
        .run_with_quotes(&store, &mut quotes)
        .unwrap();

    let entries = results.ledger.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(results.predictions.len(), 3);
    assert_eq!(results.staking.below_threshold, 1);

    let first = &entries[0];
    assert_eq!(first.event_id, "g3");
    assert_eq!(first.side, Side::Home);
    assert_eq!(first.outcome, BetOutcome::Win);
    assert!((first.edge - 3.0).abs() < 1e-9);

    let second = &entries[1];
    assert_eq!(second.event_id, "g5");
    assert_eq!(second.outcome, BetOutcome::Loss);
    assert_eq!(second.profit, -second.stake);
    assert_eq!(second.bankroll_after, second.bankroll_before - second.stake);

    for e in entries {
        assert!(e.stake > Decimal::ZERO);
        assert!(e.stake <= dec!(500));
    }
    assert_eq!(
        results.ledger.final_bankroll(),
        dec!(10000) + first.profit + second.profit
    );
}

#[test]
fn quarter_kelly_stake_at_three_points_of_edge() {
    // p = 0.53 at -110: full Kelly 1.3%, quarter Kelly 0.325% of 10000
    let config = margin_config();
    let store = margin_store(&[(5.0, 6.0)]);
    let mut quotes = observed(&config, &[("g3", 2.0)]);

    let results = BacktestRunner::new(config, Echo)
        .run_with_quotes(&store, &mut quotes)
        .unwrap();

    let entry = &results.ledger.entries()[0];
    assert!((entry.win_probability - 0.53).abs() < 1e-9);
    assert!(entry.stake >= dec!(32.49) && entry.stake <= dec!(32.50));
    assert_eq!(entry.profit, (entry.stake * dec!(100) / dec!(110)).round_dp(2));
}

#[test]
fn single_win_leaves_ratios_undefined() {
    let config = margin_config();
    let store = margin_store(&[(5.0, 6.0)]);
    let mut quotes = observed(&config, &[("g3", 2.0)]);

    let results = BacktestRunner::new(config, Echo)
        .run_with_quotes(&store, &mut quotes)
        .unwrap();

    let risk = &results.performance.risk;
    assert_eq!(results.performance.basic.total_bets, 1);
    assert!(risk.sharpe.is_undefined());
    assert!(risk.sortino.is_undefined());
    assert!(risk.calmar.is_undefined());
    assert_eq!(risk.max_drawdown, Decimal::ZERO);
}

#[test]
fn short_price_with_a_few_cents_left_completes() {
    let mut config = margin_config();
    config.staking.odds = AmericanOdds(-200);
    config.staking.starting_bankroll = dec!(0.20);
    let store = margin_store(&[(48.0, 50.0)]);
    let mut quotes = observed(&config, &[("g3", 0.0)]);

    let results = BacktestRunner::new(config, Echo)
        .run_with_quotes(&store, &mut quotes)
        .unwrap();

    assert!(results.ledger.is_empty());
    assert_eq!(results.staking.below_minimum_stake, 1);
    assert_eq!(results.ledger.final_bankroll(), dec!(0.20));
}

// ============================================
// Seeded ridge run
// ============================================

fn synthetic_store(seed: u64, n: usize) -> EventHistoryStore {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let start = Utc.with_ymd_and_hms(2023, 10, 24, 0, 0, 0).unwrap();
    let events = (0..n)
        .map(|i| {
            let pace: f64 = rng.gen_range(-2.0..2.0);
            let rating: f64 = rng.gen_range(-5.0..5.0);
            let margin = 1.5 * rating - 0.5 * pace + rng.gen_range(-6.0..6.0);
            let total = 215.0 + 8.0 * pace + rng.gen_range(-10.0..10.0);
            Event::new(
                format!("g{i}"),
                start + Duration::hours(i as i64 * 20),
                vec![pace, rating],
                vec![margin, total],
            )
        })
        .collect();
    EventHistoryStore::from_events(
        events,
        vec!["pace".into(), "rating".into()],
        vec!["margin".into(), "total".into()],
    )
    .unwrap()
}

fn ridge_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.walk_forward.train_window = 60;
    config.walk_forward.retrain_every = 15;
    config.market.seed = Some(2024);
    config
}

#[test]
fn ledger_chains_and_respects_stake_cap() {
    let store = synthetic_store(11, 240);
    let config = ridge_config();
    let cap = config.staking.stake_cap_fraction;
    let results = BacktestRunner::new(config, RidgeRegressor::default())
        .run(&store)
        .unwrap();

    let ledger = &results.ledger;
    assert!(!ledger.is_empty());
    let mut before = ledger.starting_bankroll();
    for (i, e) in ledger.entries().iter().enumerate() {
        assert_eq!(e.sequence, i as u64 + 1);
        assert_eq!(e.bankroll_before, before);
        assert_eq!(e.bankroll_after, e.bankroll_before + e.profit);
        assert!(e.stake > Decimal::ZERO);
        assert!(e.stake <= e.bankroll_before * cap);
        match e.outcome {
            BetOutcome::Loss => assert_eq!(e.profit, -e.stake),
            BetOutcome::Push => assert_eq!(e.profit, Decimal::ZERO),
            BetOutcome::Win => assert!(e.profit > Decimal::ZERO),
        }
        before = e.bankroll_after;
    }
    assert_eq!(ledger.final_bankroll(), before);
}

#[test]
fn analysis_is_repeatable_on_the_same_ledger() {
    let store = synthetic_store(3, 200);
    let config = ridge_config();
    let analyzer = PerformanceAnalyzer::new(&config.analysis).unwrap();
    let results = BacktestRunner::new(config, RidgeRegressor::default())
        .run(&store)
        .unwrap();

    let again = analyzer.analyze(&results.ledger);
    assert_eq!(again, results.performance);
    assert_eq!(analyzer.analyze(&results.ledger), again);
}

#[test]
fn written_ledger_reads_back_identical() {
    let store = synthetic_store(8, 180);
    let results = BacktestRunner::new(ridge_config(), RidgeRegressor::default())
        .run(&store)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = write_artifacts(&results, dir.path()).unwrap();
    assert!(paths.report_json.exists());
    assert!(paths.report_text.exists());
    assert!(paths.predictions.exists());

    let back = BankrollLedger::read_csv(&paths.ledger, dec!(10000)).unwrap();
    assert_eq!(back, results.ledger);
}
