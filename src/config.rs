//! Layered configuration loading using figment.
//!
//! Sources, highest priority last:
//! 1. Built-in defaults
//! 2. User-level `~/.config/cadence/config.toml`
//! 3. Project-level `./cadence.toml`
//! 4. An explicit `--config` file, when given
//! 5. Environment variables (`CADENCE_*` prefix, `__` as section separator)
//!
//! `CADENCE_SCHEDULER__BASE_THRESHOLD=13` maps to `scheduler.base_threshold`.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engagement::stats::DEFAULT_STREAK_HORIZON_DAYS;
use crate::schedule::coefficient::{DEFAULT_BASE_THRESHOLD, DEFAULT_ELIMINATION_THRESHOLD};
use crate::schedule::CoefficientModel;

const DEFAULT_DB_NAME: &str = "cadence.db";
const LOCAL_CONFIG_FILE: &str = "cadence.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_elimination")]
    pub elimination_threshold: f64,
    #[serde(default = "default_base")]
    pub base_threshold: f64,
}

const fn default_elimination() -> f64 {
    DEFAULT_ELIMINATION_THRESHOLD
}

const fn default_base() -> f64 {
    DEFAULT_BASE_THRESHOLD
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            elimination_threshold: default_elimination(),
            base_threshold: default_base(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Maximum number of days the streak walk looks back.
    #[serde(default = "default_horizon")]
    pub streak_horizon_days: u32,
}

const fn default_horizon() -> u32 {
    DEFAULT_STREAK_HORIZON_DAYS
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            streak_horizon_days: default_horizon(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl CadenceConfig {
    /// Load and validate configuration from every default source.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Same as [`CadenceConfig::load`], with `extra` merged above the TOML
    /// files but below the environment.
    pub fn load_from(extra: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(extra).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(extra: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        if let Some(path) = extra {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed("CADENCE_").split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.try_coefficient_model()?;
        if self.stats.streak_horizon_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stats.streak_horizon_days".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    fn try_coefficient_model(&self) -> Result<CoefficientModel, ConfigError> {
        let SchedulerConfig {
            elimination_threshold,
            base_threshold,
        } = self.scheduler;
        CoefficientModel::new(elimination_threshold, base_threshold).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "scheduler".into(),
                reason: format!(
                    "thresholds must satisfy 0 < elimination < base < 20, got {elimination_threshold} and {base_threshold}"
                ),
            }
        })
    }

    /// Coefficient model for the configured thresholds, or the default model
    /// if they are invalid (callers that went through `load` never see that).
    pub fn coefficient_model(&self) -> CoefficientModel {
        self.try_coefficient_model().unwrap_or_default()
    }

    /// Configured path, else `CADENCE_DB`, else the per-user config directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }
        if let Ok(path) = std::env::var("CADENCE_DB") {
            return PathBuf::from(path);
        }

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence");
        std::fs::create_dir_all(&config_dir).ok();
        config_dir.join(DEFAULT_DB_NAME)
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cadence").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    mod defaults_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn defaults_are_correct() {
            let config = CadenceConfig::default();
            assert_eq!(config.scheduler.elimination_threshold, 9.0);
            assert_eq!(config.scheduler.base_threshold, 12.0);
            assert_eq!(config.stats.streak_horizon_days, 1000);
            assert!(config.database.path.is_none());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn default_model_matches_constants() {
            let model = CadenceConfig::default().coefficient_model();
            assert_eq!(model, CoefficientModel::default());
        }
    }

    mod layering_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn local_file_overrides_defaults() {
            Jail::expect_with(|jail| {
                jail.create_file(
                    "cadence.toml",
                    r#"
                    [scheduler]
                    base_threshold = 14.0

                    [stats]
                    streak_horizon_days = 30
                    "#,
                )?;

                let config = CadenceConfig::load().expect("config loads");
                assert_eq!(config.scheduler.elimination_threshold, 9.0);
                assert_eq!(config.scheduler.base_threshold, 14.0);
                assert_eq!(config.stats.streak_horizon_days, 30);
                Ok(())
            });
        }

        #[test]
        fn env_beats_files() {
            Jail::expect_with(|jail| {
                jail.create_file("cadence.toml", "[scheduler]\nbase_threshold = 14.0\n")?;
                jail.set_env("CADENCE_SCHEDULER__BASE_THRESHOLD", "15.0");

                let config = CadenceConfig::load().expect("config loads");
                assert_eq!(config.scheduler.base_threshold, 15.0);
                Ok(())
            });
        }

        #[test]
        fn explicit_file_beats_local_file() {
            Jail::expect_with(|jail| {
                jail.create_file("cadence.toml", "[stats]\nstreak_horizon_days = 30\n")?;
                jail.create_file("custom.toml", "[stats]\nstreak_horizon_days = 60\n")?;

                let config =
                    CadenceConfig::load_from(Some(Path::new("custom.toml"))).expect("config loads");
                assert_eq!(config.stats.streak_horizon_days, 60);
                Ok(())
            });
        }

        #[test]
        fn database_path_from_config() {
            Jail::expect_with(|jail| {
                jail.create_file("cadence.toml", "[database]\npath = \"/tmp/study.db\"\n")?;

                let config = CadenceConfig::load().expect("config loads");
                assert_eq!(config.database_path(), PathBuf::from("/tmp/study.db"));
                Ok(())
            });
        }

        #[test]
        fn database_path_from_env_var() {
            Jail::expect_with(|jail| {
                jail.set_env("CADENCE_DB", "/tmp/env.db");
                let config = CadenceConfig::default();
                assert_eq!(config.database_path(), PathBuf::from("/tmp/env.db"));
                Ok(())
            });
        }
    }

    mod validation_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn inverted_thresholds_rejected() {
            Jail::expect_with(|jail| {
                jail.create_file(
                    "cadence.toml",
                    "[scheduler]\nelimination_threshold = 12.0\nbase_threshold = 9.0\n",
                )?;

                let err = CadenceConfig::load().unwrap_err();
                assert!(matches!(err, ConfigError::InvalidValue { .. }));
                assert!(err.to_string().contains("scheduler"));
                Ok(())
            });
        }

        #[test]
        fn zero_horizon_rejected() {
            let mut config = CadenceConfig::default();
            config.stats.streak_horizon_days = 0;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { field, .. }) if field == "stats.streak_horizon_days"
            ));
        }

        #[test]
        fn base_threshold_at_max_grade_rejected() {
            let mut config = CadenceConfig::default();
            config.scheduler.base_threshold = 20.0;
            assert!(config.validate().is_err());
            assert_eq!(config.coefficient_model(), CoefficientModel::default());
        }

        #[test]
        fn wrong_type_is_figment_error() {
            Jail::expect_with(|jail| {
                jail.create_file("cadence.toml", "[stats]\nstreak_horizon_days = \"lots\"\n")?;
                assert!(matches!(
                    CadenceConfig::load(),
                    Err(ConfigError::Figment(_))
                ));
                Ok(())
            });
        }
    }
}
