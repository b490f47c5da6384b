pub mod config;
pub mod config_loader;
pub mod error;
pub mod kelly;
pub mod validation;

pub use config::{
    AnalysisSettings, CalibrationCurve, DataSettings, DimensionSettings, MarketKind,
    MarketSettings, RunConfig, StakingSettings, WalkForwardSettings,
};
pub use config_loader::ConfigLoader;
pub use error::{
    BacktestError, DataIntegrityError, InsufficientDataError, LedgerIntegrityError,
    ModelFitError, RunFailure,
};
pub use kelly::{break_even_probability, full_kelly, AmericanOdds, BetDecision, BetReason, KellySizer};
pub use validation::{binomial_test, pearson_correlation, wilson_ci, WinRateSignificance};
