//! Market quotes: observed lines, or synthetic lines simulated from the
//! realized outcome plus Gaussian pricing error.
//!
//! A synthetic quote never sees the model's prediction, so "what we bet
//! against" stays independent of "what we predicted".

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rand::distributions::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use tracing::{debug, info};
use walkline_core::{BacktestError, DimensionSettings};
use walkline_data::Event;

/// Reference line per outcome dimension for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub event_id: String,
    /// One line per outcome dimension, in configured order.
    pub lines: Vec<f64>,
    /// True when the lines were synthesized rather than observed.
    pub simulated: bool,
}

impl MarketQuote {
    #[must_use]
    pub fn observed(event_id: impl Into<String>, lines: Vec<f64>) -> Self {
        Self {
            event_id: event_id.into(),
            lines,
            simulated: false,
        }
    }

    #[must_use]
    pub fn line(&self, dimension: usize) -> Option<f64> {
        self.lines.get(dimension).copied()
    }
}

/// Anything that can price an event.
pub trait QuoteSource {
    fn quote(&mut self, event: &Event) -> MarketQuote;
}

/// Rounds to the nearest multiple of `increment`.
#[must_use]
pub fn round_to_increment(value: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return value;
    }
    (value / increment).round() * increment
}

/// Returns `seed`, or draws one from OS entropy and logs it.
#[must_use]
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(s) => s,
        None => {
            let drawn: u64 = rand::rngs::OsRng.gen();
            info!(seed = drawn, "drew market simulator seed");
            drawn
        }
    }
}

struct DimensionNoise {
    /// `None` when the configured std-dev is zero.
    normal: Option<Normal>,
    increment: f64,
}

/// Simulates market lines as `round(realized + N(0, σ_dim), increment)`.
pub struct MarketLineSimulator {
    rng: ChaCha8Rng,
    dimensions: Vec<DimensionNoise>,
}

impl MarketLineSimulator {
    /// Creates a simulator. A seed makes runs reproducible; without one the
    /// generator is seeded from OS entropy.
    ///
    /// # Errors
    /// Returns `BacktestError::InvalidConfig` if a noise std-dev is negative
    /// or not finite.
    pub fn new(dimensions: &[DimensionSettings], seed: Option<u64>) -> Result<Self, BacktestError> {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        let dimensions = dimensions
            .iter()
            .map(|d| {
                let normal = if d.noise_std == 0.0 {
                    None
                } else {
                    Some(Normal::new(0.0, d.noise_std).map_err(|e| {
                        BacktestError::InvalidConfig(format!(
                            "market.dimensions[{}].noise_std: {e}",
                            d.name
                        ))
                    })?)
                };
                Ok(DimensionNoise {
                    normal,
                    increment: d.increment,
                })
            })
            .collect::<Result<Vec<_>, BacktestError>>()?;
        debug!(seeded = seed.is_some(), dimensions = dimensions.len(), "market line simulator ready");
        Ok(Self { rng, dimensions })
    }
}

impl QuoteSource for MarketLineSimulator {
    fn quote(&mut self, event: &Event) -> MarketQuote {
        let Self { rng, dimensions } = self;
        let lines = dimensions
            .iter()
            .zip(&event.outcomes)
            .map(|(dim, &realized)| {
                let noise = dim.normal.as_ref().map_or(0.0, |n| n.sample(&mut *rng));
                round_to_increment(realized + noise, dim.increment)
            })
            .collect();
        MarketQuote {
            event_id: event.id.clone(),
            lines,
            simulated: true,
        }
    }
}

/// Observed lines keyed by event id, falling back to simulation for events
/// without an observed line.
pub struct ObservedQuotes {
    quotes: HashMap<String, Vec<f64>>,
    fallback: MarketLineSimulator,
}

impl ObservedQuotes {
    #[must_use]
    pub fn new(quotes: HashMap<String, Vec<f64>>, fallback: MarketLineSimulator) -> Self {
        Self { quotes, fallback }
    }

    /// Reads observed lines from a CSV with an `id_column` plus one column
    /// per dimension name. Rows with an empty cell are skipped (and will be
    /// simulated).
    ///
    /// # Errors
    /// Returns error if the file cannot be read, a column is missing, or a
    /// cell is not numeric.
    pub fn load_csv(
        path: &Path,
        id_column: &str,
        dimension_names: &[String],
        fallback: MarketLineSimulator,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open quotes file: {}", path.display()))?;
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .with_context(|| format!("quotes file missing column '{name}'"))
        };
        let id_col = position(id_column)?;
        let cols = dimension_names
            .iter()
            .map(|n| position(n))
            .collect::<Result<Vec<_>>>()?;

        let mut quotes = HashMap::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("quotes row {}", i + 1))?;
            let id = record.get(id_col).unwrap_or_default().to_string();
            let cells: Vec<&str> = cols.iter().map(|&c| record.get(c).unwrap_or_default()).collect();
            if id.is_empty() || cells.iter().any(|c| c.is_empty()) {
                continue;
            }
            let lines = cells
                .iter()
                .map(|c| {
                    c.parse::<f64>()
                        .with_context(|| format!("quotes row {}: bad line '{c}'", i + 1))
                })
                .collect::<Result<Vec<_>>>()?;
            quotes.insert(id, lines);
        }
        debug!(path = %path.display(), quotes = quotes.len(), "observed quotes loaded");
        Ok(Self::new(quotes, fallback))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl QuoteSource for ObservedQuotes {
    fn quote(&mut self, event: &Event) -> MarketQuote {
        match self.quotes.get(&event.id) {
            Some(lines) => MarketQuote::observed(event.id.clone(), lines.clone()),
            None => self.fallback.quote(event),
        }
    }
}
