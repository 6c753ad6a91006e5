//! Configuration module for the Parley runtime.
//!
//! Layered loading (defaults, files, environment, overrides) through
//! `figment`, followed by validation of logging and bot settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ParleyConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
