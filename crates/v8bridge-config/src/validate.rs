use crate::config::Config;
use crate::error::ConfigError;

/// Smallest non-zero request deadline.
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Validate a [`Config`], returning all detected violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.connection.host.trim().is_empty() {
        errors.push(violation("connection.host", "must not be empty".into()));
    }

    if config.connection.port == 0 {
        errors.push(violation("connection.port", "must be non-zero".into()));
    }

    // 0 disables the deadline
    let timeout = config.connection.request_timeout_ms;
    if timeout > 0 && timeout < MIN_REQUEST_TIMEOUT_MS {
        errors.push(violation(
            "connection.request_timeout_ms",
            format!("must be 0 (disabled) or \u{2265} {MIN_REQUEST_TIMEOUT_MS}, got {timeout}"),
        ));
    }

    if let Some(i) = config
        .scripts
        .excluded_prefixes
        .iter()
        .position(|p| p.is_empty())
    {
        errors.push(violation(
            "scripts.excluded_prefixes",
            format!("entry {i} must not be empty"),
        ));
    }

    if config.log.max_files == 0 {
        errors.push(violation("log.max_files", "must be at least 1".into()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn violation(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}
