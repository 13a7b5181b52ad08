//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery,
//! environment detection, and layering with the `config` crate.

use super::error::ConfigResult;
use super::PipelineConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "PIPELINE";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration together with the context it was loaded in
#[derive(Debug)]
pub struct ConfigManager {
    config: PipelineConfig,
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

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_layers(&config_directory, environment)?;
        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&config.sanitized())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = environment,
            base_url = %config.orchestrator_base_url,
            max_attempts = config.retry.max_attempts,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: PipelineConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    fn load_layers(config_directory: &Path, environment: &str) -> ConfigResult<PipelineConfig> {
        let base = config_directory.join("pipeline");
        let overrides = config_directory.join(format!("pipeline.{environment}"));

        let merged = config::Config::builder()
            .add_source(config::Config::try_from(&PipelineConfig::default())?)
            .add_source(config::File::with_name(&base.to_string_lossy()).required(false))
            .add_source(config::File::with_name(&overrides.to_string_lossy()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        Ok(merged.try_deserialize::<PipelineConfig>()?)
    }

    /// Detect the runtime environment from well-known variables
    pub fn detect_environment() -> String {
        env::var("PIPELINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("PIPELINE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}
