//! Audio I/O: byte sources, decoding, resampling and device output

pub mod decoder;
pub mod device;
pub mod fetch;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::{AudioDecoder, SymphoniaDecoder};
pub use device::{AudioDevice, CompletionCallback, PlaybackHandle};
pub use fetch::{FsFetcher, HttpFetcher, SourceFetcher};
pub use output::{open_output, CpalDevice, UnavailableDevice};
pub use types::DecodedBuffer;
