//! Playback coordination
//!
//! - [`buffer_store`]: decoded-buffer cache with single-flight loading
//! - [`controller`]: request handling, supersession and the output slot
//! - [`sequence`]: continuous random playback
//! - [`filter`]: the active file filter

pub mod buffer_store;
pub mod controller;
pub mod filter;
pub mod sequence;
mod slot;

pub use buffer_store::{BufferStore, PreloadSummary};
pub use controller::{PlayOutcome, PlaybackController};
pub use filter::{FilterProvider, SharedFilter};
pub use sequence::{Completion, SequenceExit, SequencePlayer};
