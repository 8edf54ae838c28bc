use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::normative::Sex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("minimum delay {min}ms exceeds maximum delay {max}ms")]
    DelayRange { min: u64, max: u64 },
    #[error("a test needs at least one round")]
    ZeroRounds,
    #[error("a round needs at least one stimulus")]
    ZeroStimuli,
    #[error("at least one click per stimulus must be allowed")]
    ZeroClickCeiling,
}

/// Options for a single test run. Immutable once an engine is built from it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestConfig {
    pub round_count: u32,
    pub stimuli_per_round: u32,
    pub exposure_duration_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Anything faster than this is treated as anticipation, not a reaction
    pub min_valid_reaction_time_ms: u64,
    pub max_allowed_clicks_per_stimulus: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            round_count: 3,
            stimuli_per_round: 10,
            exposure_duration_ms: 700,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            min_valid_reaction_time_ms: 100,
            max_allowed_clicks_per_stimulus: 3,
        }
    }
}

impl TestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::DelayRange {
                min: self.min_delay_ms,
                max: self.max_delay_ms,
            });
        }
        if self.round_count == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.stimuli_per_round == 0 {
            return Err(ConfigError::ZeroStimuli);
        }
        if self.max_allowed_clicks_per_stimulus == 0 {
            return Err(ConfigError::ZeroClickCeiling);
        }
        Ok(())
    }
}

/// Persisted front-end settings: the last test options and subject details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub test: TestConfig,
    pub age: Option<i32>,
    pub sex: Sex,
    pub rest_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            test: TestConfig::default(),
            age: None,
            sex: Sex::Unspecified,
            rest_secs: 15,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "reflex") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("reflex_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!(path = %self.path.display(), "no config file, using defaults");
                return Config::default();
            }
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) if cfg.test.validate().is_ok() => cfg,
            Ok(_) => {
                warn!(path = %self.path.display(), "stored test options are invalid, using defaults");
                Config::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable config, using defaults");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
