//! Configuration for the Crossflow route execution engine

pub mod config;
pub mod loader;

pub use config::*;
pub use loader::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    // `::` disambiguates the extern crate from the local `config` module.
    #[error("config source error: {0}")]
    Source(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
