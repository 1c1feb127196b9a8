//! Audio output abstraction
//!
//! The playback controller depends only on these traits. Production uses
//! [`CpalDevice`](crate::audio::output::CpalDevice); tests substitute a
//! recording fake.
//!
//! Contract for implementations:
//! - the completion callback passed to [`AudioDevice::create_handle`] fires at
//!   most once, only when the segment plays out naturally;
//! - it is never invoked synchronously from `create_handle`, `begin`, `stop`
//!   or `release` (the controller holds its output lock around those calls);
//! - once a handle is stopped or released its callback is dropped unfired.

use crate::audio::types::DecodedBuffer;
use crate::error::Result;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Invoked when a handle's segment finishes playing on its own
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// An output device that renders one segment at a time
pub trait AudioDevice: Send + Sync {
    /// Rate that decoded buffers must be delivered at
    fn sample_rate(&self) -> u32;

    /// Start the output pathway if it is still suspended
    fn resume_if_suspended(&self) -> BoxFuture<'_, Result<()>>;

    /// Prepare a handle rendering `duration` of `buffer` from `start`
    fn create_handle(
        &self,
        buffer: Arc<DecodedBuffer>,
        start: Duration,
        duration: Duration,
        on_complete: CompletionCallback,
    ) -> Result<Box<dyn PlaybackHandle>>;
}

/// One prepared segment playback
pub trait PlaybackHandle: Send {
    /// Begin producing sound
    fn begin(&mut self) -> Result<()>;

    /// Stop producing sound immediately
    fn stop(&mut self);

    /// Stop and free everything attached to the handle
    fn release(&mut self);
}
