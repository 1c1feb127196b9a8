//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (and their environment variable fallbacks)
//! 2. TOML configuration file
//! 3. Built-in defaults
//!
//! A missing TOML file is not fatal: a warning is logged and defaults apply.
//! A TOML file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default pause between clips in sequence mode
pub const DEFAULT_SEQUENCE_PAUSE_MS: u64 = 100;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Clip catalog document (JSON): file path or http(s) URL
    #[serde(default)]
    pub catalog: Option<String>,

    /// Folder that clip files are read from
    #[serde(default)]
    pub audio_root: Option<PathBuf>,

    /// Base URL that clip files are fetched from; takes precedence over `audio_root`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Grace interval between clips in sequence mode
    #[serde(default = "default_sequence_pause_ms")]
    pub sequence_pause_ms: u64,

    /// Decode every catalog file at startup
    #[serde(default = "default_preload")]
    pub preload: bool,

    /// Initial file filter ("all" or a file name)
    #[serde(default)]
    pub initial_filter: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_sequence_pause_ms() -> u64 {
    DEFAULT_SEQUENCE_PAUSE_MS
}

fn default_preload() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Tracing filter directive covering the soundbite crates
    pub fn filter_directive(&self) -> String {
        format!(
            "soundbite={level},soundbite_player={level},soundbite_common={level}",
            level = self.level
        )
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            audio_root: None,
            base_url: None,
            sequence_pause_ms: default_sequence_pause_ms(),
            preload: default_preload(),
            initial_filter: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Toml(inner) => {
                Error::Config(format!("{}: {}", path.display(), inner))
            }
            other => other,
        })
    }

    /// Load configuration, falling back to defaults when the file does not exist
    ///
    /// With no explicit path the platform default location is tried
    /// (see [`default_config_path`]).
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let Some(candidate) = candidate else {
            return Ok(Self::default());
        };

        match Self::load(&candidate) {
            Ok(config) => {
                info!("Loaded configuration from {}", candidate.display());
                Ok(config)
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                if path.is_some() {
                    warn!(
                        "Configuration file {} not found, using defaults",
                        candidate.display()
                    );
                }
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Check field values that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}' (expected one of {})",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "base_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// Platform configuration file location (`<config dir>/soundbite/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("soundbite").join("config.toml"))
}
