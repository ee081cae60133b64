use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory holding a project-local config overlay.
pub const PROJECT_CONFIG_DIR: &str = ".v8bridge";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# v8bridge configuration
# Uncomment and edit settings below to override defaults.

# [connection]
# host = "127.0.0.1"
# port = 5858
# request_timeout_ms = 10000

# [scripts]
# excluded_prefixes = ["chrome-extension://"]

# [output]
# format = "xml"

# [log]
# level = "info"
# file = "/path/to/v8bridge.log"
"#;

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`.
///    If the file does not exist it is created with commented-out
///    defaults.
/// 2. Optionally reads a project config from
///    `project_dir/.v8bridge/config.toml` (walks upward).
/// 3. Merges: `Config::default() <- global <- project`.
/// 4. Validates the merged result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("Created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(proj) = project_dir {
        if let Some(project_path) = find_project_config(proj) {
            tracing::debug!("Applying project config {}", project_path.display());
            let project_content = std::fs::read_to_string(&project_path)?;
            config = merge_configs(&config, &project_content)?;
        }
    }

    validate(&config).map_err(first_error)?;
    Ok(config)
}

/// Load a single config file without creating or overlaying anything.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] when `path` does not exist.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = merge_configs(&Config::default(), &content)?;
    validate(&config).map_err(first_error)?;
    Ok(config)
}

fn first_error(errors: Vec<ConfigError>) -> ConfigError {
    errors
        .into_iter()
        .next()
        .unwrap_or_else(|| ConfigError::Validation {
            field: "unknown".to_string(),
            message: "validation failed".to_string(),
        })
}

/// Walk from `start` upward looking for `.v8bridge/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(PROJECT_CONFIG_DIR).join("config.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Returns `true` when the content has at least one
/// non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config).map_err(first_error)?;
    Ok(config)
}
