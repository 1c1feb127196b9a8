//! Active file filter
//!
//! The adapter writes the filter; the controller and sequence loop read it on
//! every request, so a change applies from the next pick onwards.

use crate::catalog::FileFilter;
use std::sync::{Arc, RwLock};

/// Source of the filter to apply to the next request
pub trait FilterProvider: Send + Sync {
    fn current(&self) -> FileFilter;
}

impl<F> FilterProvider for F
where
    F: Fn() -> FileFilter + Send + Sync,
{
    fn current(&self) -> FileFilter {
        self()
    }
}

/// Filter shared between the adapter and the playback core
#[derive(Debug, Clone, Default)]
pub struct SharedFilter {
    inner: Arc<RwLock<FileFilter>>,
}

impl SharedFilter {
    pub fn new(filter: FileFilter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(filter)),
        }
    }

    pub fn get(&self) -> FileFilter {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, filter: FileFilter) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = filter;
    }
}

impl FilterProvider for SharedFilter {
    fn current(&self) -> FileFilter {
        self.get()
    }
}
