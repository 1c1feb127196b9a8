//! Raw audio byte sources
//!
//! The buffer store asks a [`SourceFetcher`] for the bytes of a clip file by
//! name. Two sources exist: a folder on disk and an HTTP base URL.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Fetches the raw (still encoded) bytes of a source file
pub trait SourceFetcher: Send + Sync {
    fn fetch<'a>(&'a self, file: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Reads files relative to a root folder
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `file` under the root; absolute paths and `..` are refused
    fn resolve(&self, file: &str) -> Result<PathBuf> {
        let relative = Path::new(file);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || file.is_empty() {
            return Err(Error::load(file, "path escapes the audio root"));
        }
        Ok(self.root.join(relative))
    }
}

impl SourceFetcher for FsFetcher {
    fn fetch<'a>(&'a self, file: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let path = self.resolve(file)?;
            debug!("Reading {}", path.display());
            tokio::fs::read(&path)
                .await
                .map_err(|e| Error::load(file, format!("{}: {}", path.display(), e)))
        })
    }
}

/// Downloads files relative to a base URL
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url, client }
    }

    pub fn url_for(&self, file: &str) -> String {
        format!("{}{}", self.base_url, file.trim_start_matches('/'))
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, file: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let url = self.url_for(file);
            debug!("Fetching {}", url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::load(file, e))?;
            let bytes = response.bytes().await.map_err(|e| Error::load(file, e))?;
            Ok(bytes.to_vec())
        })
    }
}
