//! Audio decoder using symphonia
//!
//! Decodes whole files held in memory (MP3, FLAC, AAC, Vorbis, WAV) to
//! interleaved stereo f32 at the output sample rate.

use crate::audio::resampler::Resampler;
use crate::audio::types::{DecodedBuffer, CHANNELS};
use crate::error::{Error, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Turns raw file bytes into a playable buffer
///
/// Implementations are called from a blocking thread.
pub trait AudioDecoder: Send + Sync {
    /// Decode `bytes`; `file` is the source name, used as a format hint
    fn decode(&self, file: &str, bytes: Vec<u8>) -> Result<DecodedBuffer>;
}

/// Symphonia-backed decoder producing buffers at a fixed output rate
#[derive(Debug, Clone)]
pub struct SymphoniaDecoder {
    output_rate: u32,
}

impl SymphoniaDecoder {
    pub fn new(output_rate: u32) -> Self {
        Self { output_rate }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Decode every packet of the first audio track.
    ///
    /// # Returns
    /// - interleaved stereo f32 samples (mono duplicated, extra channels dropped)
    /// - source sample rate
    fn decode_to_stereo(file: &str, bytes: Vec<u8>) -> Result<(Vec<f32>, u32)> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = Path::new(file).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("{}: failed to probe format: {}", file, e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("{}: no audio track found", file)))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode(format!("{}: sample rate not found", file)))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("{}: failed to create decoder: {}", file, e)))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    return Err(Error::Decode(format!("{}: error reading packet: {}", file, e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    interleaved.copy_interleaved_ref(decoded);
                    push_stereo(interleaved.samples(), spec.channels.count(), &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("{}: decode error (skipping packet): {}", file, e);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("{}: decode failed: {}", file, e)));
                }
            }
        }

        if samples.is_empty() {
            return Err(Error::Decode(format!("{}: no audio decoded", file)));
        }

        Ok((samples, sample_rate))
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, file: &str, bytes: Vec<u8>) -> Result<DecodedBuffer> {
        debug!("Decoding {} ({} bytes)", file, bytes.len());

        let (samples, source_rate) = Self::decode_to_stereo(file, bytes)?;
        let samples = Resampler::resample(&samples, source_rate, self.output_rate, CHANNELS as u16)?;
        let buffer = DecodedBuffer::new(samples, self.output_rate);

        debug!(
            "Decoded {}: {} frames at {}Hz ({:.2}s)",
            file,
            buffer.frames(),
            buffer.sample_rate(),
            buffer.duration().as_secs_f64()
        );
        Ok(buffer)
    }
}

/// Append interleaved frames of `channels` channels to `output` as stereo
fn push_stereo(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            output.reserve(interleaved.len() * 2);
            for &sample in interleaved {
                output.push(sample);
                output.push(sample);
            }
        }
        _ => {
            output.reserve(interleaved.len() / channels * 2);
            for frame in interleaved.chunks_exact(channels) {
                output.push(frame[0]);
                output.push(frame[1]);
            }
        }
    }
}
