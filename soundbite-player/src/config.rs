//! Runtime configuration for the soundbite player
//!
//! Merges command-line overrides over the bootstrap TOML file
//! ([`soundbite_common::config::TomlConfig`]) over built-in defaults.

use crate::audio::fetch::{FsFetcher, HttpFetcher, SourceFetcher};
use crate::catalog::FileFilter;
use crate::error::{Error, Result};
use soundbite_common::config::TomlConfig;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Catalog document used when neither the command line nor the TOML names one
pub const DEFAULT_CATALOG: &str = "clips.json";

/// Audio folder used when no source is configured
pub const DEFAULT_AUDIO_ROOT: &str = "audio";

/// Where clip files are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Directory(PathBuf),
    Http(String),
}

impl AudioSource {
    /// Fetcher reading from this source
    pub fn fetcher(&self) -> Arc<dyn SourceFetcher> {
        match self {
            AudioSource::Directory(root) => Arc::new(FsFetcher::new(root.clone())),
            AudioSource::Http(base_url) => Arc::new(HttpFetcher::new(base_url.clone())),
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Directory(root) => write!(f, "{}", root.display()),
            AudioSource::Http(base_url) => write!(f, "{}", base_url),
        }
    }
}

/// Values given on the command line (or their environment fallbacks)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub catalog: Option<String>,
    pub audio_root: Option<PathBuf>,
    pub base_url: Option<String>,
    pub filter: Option<String>,
    pub sequence_pause_ms: Option<u64>,
    pub no_preload: bool,
}

/// Fully resolved player settings
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub catalog: String,
    pub source: AudioSource,
    pub sequence_pause: Duration,
    pub preload: bool,
    pub initial_filter: FileFilter,
}

impl PlayerConfig {
    /// Resolve settings: overrides, then TOML, then defaults
    ///
    /// Within one layer a base URL wins over an audio folder.
    pub fn resolve(overrides: ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let source = match (overrides.base_url, overrides.audio_root) {
            (Some(url), _) => AudioSource::Http(validate_base_url(url)?),
            (None, Some(root)) => AudioSource::Directory(root),
            (None, None) => match (&toml.base_url, &toml.audio_root) {
                (Some(url), _) => AudioSource::Http(url.clone()),
                (None, Some(root)) => AudioSource::Directory(root.clone()),
                (None, None) => AudioSource::Directory(PathBuf::from(DEFAULT_AUDIO_ROOT)),
            },
        };

        let catalog = overrides
            .catalog
            .or_else(|| toml.catalog.clone())
            .unwrap_or_else(|| DEFAULT_CATALOG.to_string());

        let initial_filter = overrides
            .filter
            .or_else(|| toml.initial_filter.clone())
            .map(|f| FileFilter::parse(&f))
            .unwrap_or_default();

        Ok(Self {
            catalog,
            source,
            sequence_pause: Duration::from_millis(
                overrides.sequence_pause_ms.unwrap_or(toml.sequence_pause_ms),
            ),
            preload: toml.preload && !overrides.no_preload,
            initial_filter,
        })
    }
}

fn validate_base_url(url: String) -> Result<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(Error::Config(format!(
            "base URL must be an http(s) URL, got '{}'",
            url
        )))
    }
}
