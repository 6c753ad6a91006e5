//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LogOutput, LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bot_config(&config.bot)?;
    Ok(())
}

/// Validates logging configuration.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter target: {module:?}"
        )));
    }

    Ok(())
}

/// Validates bot configuration.
fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.max_concurrent_dispatches == 0 {
        return Err(ConfigError::validation(
            "bot.max_concurrent_dispatches must be greater than 0",
        ));
    }

    if bot.fallback_message.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.fallback_message"));
    }

    let mut seen = HashSet::new();
    for &admin in &bot.admins {
        if admin <= 0 {
            return Err(ConfigError::validation(format!(
                "Administrator ids must be positive, got {admin}"
            )));
        }
        if !seen.insert(admin) {
            return Err(ConfigError::DuplicateAdmin(admin));
        }
    }

    Ok(())
}
