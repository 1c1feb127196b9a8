//! Buffer Store
//!
//! Fetches, decodes and memoizes one [`DecodedBuffer`] per source file.
//!
//! Each file gets a `tokio::sync::OnceCell`, so concurrent requests for an
//! uncached file share a single in-flight fetch/decode. A failed load leaves
//! the cell empty and the next request starts over. If the caller driving a
//! load is dropped mid-way, a waiting caller restarts it; that restart is the
//! only duplicate work the store ever does. Entries are never evicted.

use crate::audio::decoder::AudioDecoder;
use crate::audio::fetch::SourceFetcher;
use crate::audio::types::DecodedBuffer;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace, warn};

type BufferCell = Arc<OnceCell<Arc<DecodedBuffer>>>;

/// Outcome of [`BufferStore::preload_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadSummary {
    pub loaded: usize,
    pub failed: Vec<String>,
}

/// Cache of decoded source files
pub struct BufferStore {
    fetcher: Arc<dyn SourceFetcher>,
    decoder: Arc<dyn AudioDecoder>,
    cells: Mutex<HashMap<String, BufferCell>>,
}

impl BufferStore {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            fetcher,
            decoder,
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn lock_cells(&self) -> MutexGuard<'_, HashMap<String, BufferCell>> {
        self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cell(&self, file: &str) -> BufferCell {
        Arc::clone(self.lock_cells().entry(file.to_string()).or_default())
    }

    /// Decoded buffer for `file`, loading it on first use
    ///
    /// # Errors
    /// - `Error::Load` if the bytes could not be fetched
    /// - `Error::Decode` if they are not playable audio
    pub async fn get(&self, file: &str) -> Result<Arc<DecodedBuffer>> {
        let cell = self.cell(file);
        if let Some(buffer) = cell.get() {
            trace!("Buffer cache hit: {}", file);
            return Ok(Arc::clone(buffer));
        }

        let buffer = cell.get_or_try_init(|| self.load(file)).await?;
        Ok(Arc::clone(buffer))
    }

    /// Buffer for `file` if it is already decoded
    pub fn cached(&self, file: &str) -> Option<Arc<DecodedBuffer>> {
        self.lock_cells()
            .get(file)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of decoded files held
    pub fn cached_count(&self) -> usize {
        self.lock_cells()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Load every file in turn; failures are logged and skipped
    pub async fn preload_all<I, S>(&self, files: I) -> PreloadSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = PreloadSummary::default();

        for file in files {
            let file = file.as_ref();
            match self.get(file).await {
                Ok(_) => summary.loaded += 1,
                Err(e) => {
                    warn!("Preload skipped {}: {}", file, e);
                    summary.failed.push(file.to_string());
                }
            }
        }

        info!(
            "Preloaded {} files ({} failed)",
            summary.loaded,
            summary.failed.len()
        );
        summary
    }

    async fn load(&self, file: &str) -> Result<Arc<DecodedBuffer>> {
        let started = Instant::now();
        debug!("Loading {}", file);

        let bytes = self.fetcher.fetch(file).await?;

        let decoder = Arc::clone(&self.decoder);
        let name = file.to_string();
        let buffer = tokio::task::spawn_blocking(move || decoder.decode(&name, bytes))
            .await
            .map_err(|e| Error::Decode(format!("{}: decode task failed: {}", file, e)))??;

        info!(
            "Loaded {} ({:.2}s of audio in {}ms)",
            file,
            buffer.duration().as_secs_f64(),
            started.elapsed().as_millis()
        );
        Ok(Arc::new(buffer))
    }
}
