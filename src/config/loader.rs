//! Configuration Loader
//!
//! Environment-aware layered loading: `scheduler.yaml`, then
//! `scheduler.{environment}.yaml`, then `TASKER_SCHEDULER__*` environment
//! variables. Every layer is optional.

use super::error::{ConfigResult, ConfigurationError};
use super::SchedulerConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix for environment overrides, e.g.
/// `TASKER_SCHEDULER__EXECUTION__MAX_CONCURRENT_TASKS=8`
pub const ENV_PREFIX: &str = "TASKER_SCHEDULER";
const ENV_SEPARATOR: &str = "__";
const BASE_FILE_NAME: &str = "scheduler";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: SchedulerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(config_dir, environment, None)
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: SchedulerConfig, environment: &str) -> ConfigResult<ConfigManager> {
        config.validate()?;
        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        })
    }

    /// `env_overrides` replaces the process environment as the variable
    /// source when given
    fn load_layers(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_overrides: Option<config::Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base_file = Self::base_config_file(&config_directory);
        let environment_file = Self::environment_config_file(&config_directory, environment);

        let merged = Config::builder()
            .add_source(
                File::from(base_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                File::from(environment_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env_overrides),
            )
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(config_directory.display().to_string(), e)
            })?;

        let config: SchedulerConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::deserialization_error)?;

        // Validate the loaded configuration
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            max_concurrent_tasks = config.execution.max_concurrent_tasks,
            max_attempts = config.backoff.max_attempts,
            dry_run_high_risk = config.risk.dry_run_high_risk,
            "⚙️ CONFIG: Scheduler configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Configuration as JSON for debugging/logging
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    /// TASKER_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("TASKER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }

    /// Base file shared by every environment
    pub fn base_config_file(config_dir: &Path) -> PathBuf {
        config_dir.join(format!("{BASE_FILE_NAME}.yaml"))
    }

    /// Per-environment override file
    pub fn environment_config_file(config_dir: &Path, environment: &str) -> PathBuf {
        config_dir.join(format!("{BASE_FILE_NAME}.{environment}.yaml"))
    }
}
