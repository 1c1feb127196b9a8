//! # Soundbite Common Library
//!
//! Shared code for the soundbite crates:
//! - Error types
//! - Bootstrap configuration (TOML) and logging settings
//! - Playback notification types consumed by front ends

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::PlaybackEvent;
