use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use tracing::debug;

use crate::config::RunConfig;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "walkline.toml";

/// Environment variable prefix; `__` separates nested keys
/// (e.g. `WALKLINE_STAKING__MIN_EDGE=2.5`).
pub const ENV_PREFIX: &str = "WALKLINE_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the run configuration by layering defaults, `walkline.toml`, and
    /// `WALKLINE_` environment variables, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load() -> Result<RunConfig> {
        Self::extract(Self::figment(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// Loads the run configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or the
    /// merged configuration fails validation.
    pub fn load_from(path: &Path) -> Result<RunConfig> {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        Self::extract(Self::figment(path))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RunConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<RunConfig> {
        let config: RunConfig = figment
            .extract()
            .context("failed to read run configuration")?;
        config.validate()?;
        debug!(
            train_window = config.walk_forward.train_window,
            retrain_every = config.walk_forward.retrain_every,
            min_edge = config.staking.min_edge,
            "configuration loaded"
        );
        Ok(config)
    }
}
