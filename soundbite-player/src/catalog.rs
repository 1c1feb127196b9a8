//! Clip catalog
//!
//! Maps clip names to the ordered segments that can stand in for them. The
//! catalog is parsed once at startup and read-only afterwards.
//!
//! Document format (JSON):
//!
//! ```json
//! {
//!   "Alice": [ { "file": "a.mp3", "start": 2.0, "duration": 3.0 } ],
//!   "Bob":   [ { "file": "x.mp3", "start": 0.5, "duration": 1.25 } ]
//! }
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A playable excerpt of a source file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Segment {
    /// Source file name, resolved by the buffer store's fetcher
    pub file: String,
    /// Offset into the file, in seconds
    pub start: f64,
    /// Length of the excerpt, in seconds
    pub duration: f64,
}

impl Segment {
    /// Offset into the source file
    pub fn start_offset(&self) -> Duration {
        Duration::from_secs_f64(self.start)
    }

    /// Length of the excerpt
    pub fn length(&self) -> Duration {
        Duration::from_secs_f64(self.duration)
    }

    fn validate(&self, clip: &str) -> Result<()> {
        if self.file.trim().is_empty() {
            return Err(Error::Config(format!("Clip '{}' has a segment with no file", clip)));
        }
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(Error::Config(format!(
                "Clip '{}' segment of '{}' has invalid start {}",
                clip, self.file, self.start
            )));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(Error::Config(format!(
                "Clip '{}' segment of '{}' has invalid duration {}",
                clip, self.file, self.duration
            )));
        }

        // Both ends must fit in a Duration
        let end = Duration::try_from_secs_f64(self.start)
            .ok()
            .zip(Duration::try_from_secs_f64(self.duration).ok())
            .and_then(|(start, length)| start.checked_add(length));
        if end.is_none() {
            return Err(Error::Config(format!(
                "Clip '{}' segment of '{}' is out of range (start {}, duration {})",
                clip, self.file, self.start, self.duration
            )));
        }
        Ok(())
    }
}

/// Active file filter: everything, or only segments of one file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FileFilter {
    #[default]
    All,
    File(String),
}

impl FileFilter {
    /// Parse a filter value; empty or `"all"` selects everything
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            FileFilter::All
        } else {
            FileFilter::File(value.to_string())
        }
    }

    /// Whether a segment of `file` passes this filter
    pub fn matches(&self, file: &str) -> bool {
        match self {
            FileFilter::All => true,
            FileFilter::File(selected) => selected == file,
        }
    }
}

impl FromStr for FileFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(FileFilter::parse(s))
    }
}

impl fmt::Display for FileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFilter::All => write!(f, "all"),
            FileFilter::File(file) => write!(f, "{}", file),
        }
    }
}

/// Clip name → ordered, non-empty list of segments
#[derive(Debug, Clone, Default)]
pub struct ClipCatalog {
    clips: BTreeMap<String, Vec<Segment>>,
}

impl ClipCatalog {
    /// Catalog with no clips; what callers fall back to when loading fails
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a catalog from already-parsed clips, validating every segment
    pub fn from_clips(clips: BTreeMap<String, Vec<Segment>>) -> Result<Self> {
        for (name, segments) in &clips {
            if segments.is_empty() {
                return Err(Error::Config(format!("Clip '{}' has no segments", name)));
            }
            for segment in segments {
                segment.validate(name)?;
            }
        }
        Ok(Self { clips })
    }

    /// Parse a JSON catalog document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let clips: BTreeMap<String, Vec<Segment>> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Malformed clip catalog: {}", e)))?;
        Self::from_clips(clips)
    }

    /// Load a catalog from a file path or an http(s) URL
    pub async fn load(source: &str) -> Result<Self> {
        let json = if source.starts_with("http://") || source.starts_with("https://") {
            debug!("Fetching clip catalog from {}", source);
            let response = reqwest::get(source)
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::Config(format!("Catalog {} unreachable: {}", source, e)))?;
            response
                .text()
                .await
                .map_err(|e| Error::Config(format!("Catalog {} unreadable: {}", source, e)))?
        } else {
            debug!("Reading clip catalog from {}", source);
            tokio::fs::read_to_string(Path::new(source))
                .await
                .map_err(|e| Error::Config(format!("Catalog {} unreachable: {}", source, e)))?
        };

        let catalog = Self::from_json_str(&json)?;
        info!(
            "Loaded {} clips referencing {} files",
            catalog.len(),
            catalog.all_files().len()
        );
        Ok(catalog)
    }

    /// Load a catalog, degrading to an empty one on any failure
    pub async fn load_or_empty(source: &str) -> Self {
        match Self::load(source).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("{}; no clips available", e);
                Self::empty()
            }
        }
    }

    /// Segments of `name` that pass `filter`, in catalog order
    ///
    /// Unknown names and fully filtered-out clips both yield an empty list.
    pub fn segments_for(&self, name: &str, filter: &FileFilter) -> Vec<Segment> {
        self.clips
            .get(name)
            .map(|segments| {
                segments
                    .iter()
                    .filter(|s| filter.matches(&s.file))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct file names referenced by any segment, ascending
    pub fn all_files(&self) -> Vec<String> {
        self.clips
            .values()
            .flatten()
            .map(|s| s.file.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Clip names with at least one segment passing `filter`, ascending
    pub fn names(&self, filter: &FileFilter) -> Vec<String> {
        self.clips
            .iter()
            .filter(|(_, segments)| segments.iter().any(|s| filter.matches(&s.file)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
