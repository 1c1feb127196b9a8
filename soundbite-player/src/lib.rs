//! # Soundbite Player Library
//!
//! Plays short named clips on demand. Each clip name maps to one or more
//! segments (file, start, duration) of longer source recordings; a request
//! picks one segment at random, decodes its source file once, and plays it
//! on a single output slot.
//!
//! **Architecture:** symphonia decode + rubato resample into a per-file
//! buffer cache, rendered through a single cpal output stream. Overlapping
//! requests are resolved by epoch-based supersession: the newest request
//! wins and older ones abandon at their next suspension point.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
pub mod playback;

pub use catalog::{ClipCatalog, FileFilter, Segment};
pub use error::{Error, Result};
pub use playback::{PlayOutcome, PlaybackController, SequencePlayer, SharedFilter};
