//! Error types for ostinato-core.

use crate::track::TrackId;
use thiserror::Error;

/// Error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown track: {0}")]
    TrackNotFound(TrackId),

    #[error("Track already registered: {0}")]
    DuplicateTrack(TrackId),

    #[error("Source has {got} channels but output is {output}-channel (mono or matching only)")]
    UnsupportedChannelCount { got: u16, output: u16 },

    #[error("Output failed to start after {attempts} attempts")]
    StartRetriesExhausted { attempts: u32 },

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Engine command queue is closed")]
    EngineClosed,

    #[cfg(feature = "cpal")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "cpal")]
    #[error("Failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
