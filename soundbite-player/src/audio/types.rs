//! Core audio data types

use std::ops::Range;
use std::time::Duration;

/// Channel count of every decoded buffer (interleaved stereo)
pub const CHANNELS: usize = 2;

/// Fully decoded audio for one source file, ready to play
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Stereo interleaved: [L, R, L, R, ...]
/// - Sample rate matches the output device
///
/// Buffers are created once per file by the buffer store and shared as
/// `Arc<DecodedBuffer>`; they are never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Wrap interleaved stereo samples; a trailing half frame is dropped
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        let whole = samples.len() - samples.len() % CHANNELS;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
        }
    }

    /// Interleaved stereo samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Frame index nearest to `offset`
    pub fn frame_at(&self, offset: Duration) -> usize {
        (offset.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Frames covered by `[start, start + length)`, clamped to the buffer
    ///
    /// Returns `None` when `start` lies at or beyond the end of the buffer,
    /// or when `start + length` is not a representable duration.
    pub fn frame_range(&self, start: Duration, length: Duration) -> Option<Range<usize>> {
        let end = start.checked_add(length)?;
        let first = self.frame_at(start);
        if first >= self.frames() {
            return None;
        }
        let last = self.frame_at(end).min(self.frames());
        Some(first..last.max(first))
    }

    /// Interleaved samples of a frame range
    pub fn frame_samples(&self, frames: Range<usize>) -> &[f32] {
        let start = (frames.start * CHANNELS).min(self.samples.len());
        let end = (frames.end * CHANNELS).min(self.samples.len()).max(start);
        &self.samples[start..end]
    }
}
