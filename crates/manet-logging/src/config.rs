//! Configuration types for the logging system

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level (can be overridden by RUST_LOG)
    pub default_level: String,

    /// Console output configuration
    pub console: ConsoleConfig,

    /// File output configuration
    pub file: Option<FileConfig>,

    /// JSON output configuration
    pub json: JsonConfig,

    /// Per-target level overrides, e.g. `manet_dsr::engine` -> `trace`
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            json: JsonConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Create a config for development (verbose, human-readable console)
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
                ansi: true,
            },
            ..Default::default()
        }
    }

    /// Create a config for long simulation runs (JSON lines to a file)
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig {
                enabled: false,
                pretty: false,
                ansi: false,
            },
            file: Some(FileConfig {
                directory: log_dir,
                ..FileConfig::default()
            }),
            ..Default::default()
        }
    }

    /// Create a config for testing (minimal output)
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
                ansi: false,
            },
            ..Default::default()
        }
    }

    /// Filter directives: the default level followed by per-target overrides
    pub fn directives(&self) -> String {
        std::iter::once(self.default_level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Console output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Enable console output
    pub enabled: bool,
    /// Use pretty (human-readable) format instead of JSON lines
    pub pretty: bool,
    /// Include ANSI colors
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
            ansi: false,
        }
    }
}

/// File output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Directory for log files
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Rotation strategy
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "manet".to_string(),
            rotation: RotationStrategy::Never,
        }
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RotationStrategy {
    /// Rotate daily
    Daily,
    /// Rotate hourly
    Hourly,
    /// Never rotate (single file, truncated at startup)
    #[default]
    Never,
}

/// JSON lines formatting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonConfig {
    /// Flatten event fields to root level
    pub flatten_events: bool,
    /// Include the list of entered spans in events
    pub include_spans: bool,
    /// Include file/line information
    pub include_location: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}
