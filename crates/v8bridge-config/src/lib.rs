pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod merge;
pub mod paths;
pub mod validate;

pub use config::{
    Config, ConnectionConfig, LogConfig, LogLevel, OutputConfig, OutputFormatSetting,
    ScriptsConfig,
};
pub use error::ConfigError;
pub use load::{load_config, load_from_str};
pub use paths::AppPaths;
