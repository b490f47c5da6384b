//! Statistical helpers for judging whether a win rate clears the vig.
//!
//! A betting record only shows skill if its win rate is reliably above the
//! break-even rate implied by the price, not merely above 50%.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Significance of an observed win rate against a break-even rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinRateSignificance {
    /// Observed win rate (wins / decided bets).
    pub win_rate: f64,
    /// Wilson score 95% CI lower bound.
    pub wilson_ci_lower: f64,
    /// Wilson score 95% CI upper bound.
    pub wilson_ci_upper: f64,
    /// Rate tested against (H0).
    pub null_rate: f64,
    /// Two-tailed p-value under H0.
    pub p_value: f64,
    /// Decided bets (pushes excluded).
    pub sample_size: usize,
    /// p < 0.05.
    pub is_significant: bool,
}

impl WinRateSignificance {
    /// Builds the significance summary from win/decided counts.
    #[must_use]
    pub fn from_counts(wins: usize, decided: usize, null_rate: f64) -> Self {
        let win_rate = if decided == 0 {
            0.0
        } else {
            wins as f64 / decided as f64
        };
        let (wilson_ci_lower, wilson_ci_upper) = wilson_ci(wins, decided, 1.96);
        let p_value = binomial_test(wins, decided, null_rate);

        Self {
            win_rate,
            wilson_ci_lower,
            wilson_ci_upper,
            null_rate,
            p_value,
            sample_size: decided,
            is_significant: p_value < 0.05,
        }
    }

    /// True when the whole confidence interval sits above the null rate.
    #[must_use]
    pub fn clears_null_rate(&self) -> bool {
        self.sample_size > 0 && self.wilson_ci_lower > self.null_rate
    }
}

/// Wilson score confidence interval for a proportion.
///
/// ```text
/// CI = (p + z²/2n ± z·sqrt(p(1−p)/n + z²/4n²)) / (1 + z²/n)
/// ```
///
/// # Examples
/// ```
/// use walkline_core::validation::wilson_ci;
///
/// let (lower, upper) = wilson_ci(50, 100, 1.96);
/// assert!(lower > 0.39 && lower < 0.41);
/// assert!(upper > 0.59 && upper < 0.61);
/// ```
#[must_use]
pub fn wilson_ci(wins: usize, n: usize, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }

    let n_f = n as f64;
    let p = wins as f64 / n_f;
    let z_sq = z * z;

    let denominator = 1.0 + z_sq / n_f;
    let center = p + z_sq / (2.0 * n_f);
    let spread = z * (p * (1.0 - p) / n_f + z_sq / (4.0 * n_f * n_f)).sqrt();

    let lower = (center - spread) / denominator;
    let upper = (center + spread) / denominator;

    (lower.max(0.0), upper.min(1.0))
}

/// Two-tailed binomial test using the normal approximation with continuity
/// correction.
///
/// # Examples
/// ```
/// use walkline_core::validation::binomial_test;
///
/// assert!(binomial_test(55, 100, 0.5) > 0.05);
/// assert!(binomial_test(65, 100, 0.5) < 0.05);
/// ```
#[must_use]
pub fn binomial_test(successes: usize, n: usize, p0: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }

    let n_f = n as f64;
    let expected = n_f * p0;
    let std_dev = (n_f * p0 * (1.0 - p0)).sqrt();

    if std_dev < f64::EPSILON {
        let degenerate_match = (p0 < f64::EPSILON && successes == 0)
            || (p0 > 1.0 - f64::EPSILON && successes == n);
        return if degenerate_match { 1.0 } else { 0.0 };
    }

    let z = (successes as f64 - expected).abs() - 0.5;
    if z <= 0.0 {
        return 1.0;
    }

    let Ok(standard) = Normal::new(0.0, 1.0) else {
        return 1.0;
    };
    (2.0 * (1.0 - standard.cdf(z / std_dev))).clamp(0.0, 1.0)
}

/// Pearson correlation; 0.0 when undefined (length mismatch, n < 2, or zero
/// variance).
#[must_use]
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return 0.0;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator < f64::EPSILON {
        return 0.0;
    }
    cov / denominator
}
