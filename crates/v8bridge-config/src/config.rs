use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scripts whose names start with this are hidden by default.
pub const DEFAULT_EXCLUDED_PREFIX: &str = "chrome-extension://";

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Serialization format for printed documents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormatSetting {
    /// XML fragments (default).
    #[default]
    Xml,
    /// JSON documents.
    Json,
}

/// Where the debuggee listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Debugger host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Debugger port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request deadline in milliseconds (0 = wait forever, minimum 100).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5858
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl ConnectionConfig {
    /// The request deadline, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Script list filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Name prefixes of scripts to hide.
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
}

fn default_excluded_prefixes() -> Vec<String> {
    vec![DEFAULT_EXCLUDED_PREFIX.to_string()]
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: default_excluded_prefixes(),
        }
    }
}

/// Output settings.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Document format.
    #[serde(default)]
    pub format: OutputFormatSetting,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
    /// Rotate once the log file reaches this size.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    /// Rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,
}

fn default_max_size_bytes() -> u64 {
    crate::logging::DEFAULT_MAX_LOG_SIZE
}

fn default_max_files() -> u32 {
    crate::logging::DEFAULT_MAX_LOG_FILES
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            max_size_bytes: default_max_size_bytes(),
            max_files: default_max_files(),
        }
    }
}

/// Top-level v8bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Debuggee connection.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Script filtering.
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Output format.
    #[serde(default)]
    pub output: OutputConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.connection.host, "127.0.0.1");
        assert_eq!(cfg.connection.port, 5858);
        assert_eq!(cfg.connection.request_timeout_ms, 10_000);
        assert_eq!(
            cfg.scripts.excluded_prefixes,
            vec!["chrome-extension://".to_string()]
        );
        assert_eq!(cfg.output.format, OutputFormatSetting::Xml);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
        assert_eq!(cfg.log.max_files, 5);
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let cfg = Config {
            connection: ConnectionConfig {
                host: "10.0.0.2".into(),
                port: 9222,
                request_timeout_ms: 0,
            },
            scripts: ScriptsConfig {
                excluded_prefixes: vec!["node:".into()],
            },
            output: OutputConfig {
                format: OutputFormatSetting::Json,
            },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/v8bridge.log")),
                max_size_bytes: 1024,
                max_files: 2,
            },
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn parse_partial_sections_keeps_defaults() {
        let input = r#"
[connection]
port = 9229

[output]
format = "json"
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.connection.port, 9229);
        assert_eq!(cfg.connection.host, "127.0.0.1");
        assert_eq!(cfg.output.format, OutputFormatSetting::Json);
        assert_eq!(cfg.scripts, ScriptsConfig::default());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn request_timeout_zero_disables_deadline() {
        let mut conn = ConnectionConfig::default();
        assert_eq!(conn.request_timeout(), Some(Duration::from_secs(10)));
        conn.request_timeout_ms = 0;
        assert_eq!(conn.request_timeout(), None);
    }

    #[test]
    fn log_level_filters() {
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::default().as_filter(), "info");
    }
}
