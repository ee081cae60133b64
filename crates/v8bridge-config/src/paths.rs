use std::path::PathBuf;

use crate::error::ConfigError;
use crate::logging::LOG_FILE_NAME;

const APP_DIR: &str = "v8bridge";

/// Standard directories for v8bridge, rooted at the user's home.
#[derive(Debug, Clone)]
pub struct AppPaths {
    home: PathBuf,
}

impl AppPaths {
    /// Resolve the home directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHome`] if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or(ConfigError::NoHome)?;
        Ok(Self { home })
    }

    /// Paths rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `~/.config/v8bridge`
    pub fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_DIR)
    }

    /// `~/.local/share/v8bridge`
    pub fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_DIR)
    }

    /// `<data_dir>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Default log file inside [`log_dir`](Self::log_dir).
    pub fn default_log_file(&self) -> PathBuf {
        self.log_dir().join(LOG_FILE_NAME)
    }
}
