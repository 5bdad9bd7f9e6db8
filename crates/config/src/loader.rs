//! Layered configuration loading: files first, environment last, validated
//! before the result reaches the engine.

use crate::{EngineConfig, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use std::path::Path;

/// Default prefix for environment overrides. Key segments are separated by
/// `__` because the setting names themselves contain underscores, e.g.
/// `CROSSFLOW__EXECUTION__SIGNATURE_TIMEOUT_SECS=120` or
/// `CROSSFLOW__CHAINS__1__EXPLORER_URL=https://etherscan.io`.
pub const ENV_PREFIX: &str = "CROSSFLOW";

/// Builds an [`EngineConfig`] from layered sources. Later sources override
/// earlier ones key by key, so a deployment file can carry the chain table
/// while the environment tunes individual timeouts.
pub struct ConfigLoader {
    builder: ConfigBuilder<DefaultState>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// One config file plus the default environment overlay
    pub fn load_file(path: &Path) -> Result<EngineConfig> {
        Self::new().file(path).env(ENV_PREFIX).load()
    }

    /// Add a required file source; the format is inferred from the extension
    /// (TOML, YAML or JSON).
    pub fn file(mut self, path: &Path) -> Self {
        self.builder = self.builder.add_source(File::from(path));
        self
    }

    /// Add an optional file source, skipped when the file is absent
    pub fn file_if_exists(mut self, path: &Path) -> Self {
        self.builder = self.builder.add_source(File::from(path).required(false));
        self
    }

    /// Add an environment overlay with the given prefix
    pub fn env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    /// Merge all sources, deserialize and validate
    pub fn load(self) -> Result<EngineConfig> {
        let config: EngineConfig = self.builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse an embedded TOML document, validated like any other source
    pub fn from_toml(content: &str) -> Result<EngineConfig> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<EngineConfig> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<EngineConfig> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
