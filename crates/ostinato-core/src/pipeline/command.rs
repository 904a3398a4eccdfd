//! Commands sent to the engine sequencer.
//!
//! Every public operation funnels through this enum and one FIFO queue;
//! that queue is the serialization mechanism that makes the pipeline
//! transition table race-free under concurrent callers.

use crate::source::PcmSource;
use crate::track::TrackId;
use crate::Result;
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::Arc;

/// Command sent to the sequencer thread.
pub(crate) enum EngineCommand {
    /// Register a track. Fails on duplicate id or unsupported channel
    /// layout; the reply is delivered synchronously.
    AddTrack {
        id: TrackId,
        source: Arc<dyn PcmSource>,
        looped: bool,
        volume: f32,
        reply: Sender<Result<()>>,
    },
    /// Unregister a track; memory is reclaimed once no snapshot holds it.
    DisposeTrack { id: TrackId },

    /// Start a track, bringing the output unit up if the pipeline is
    /// idle. Start failures are reported through the reply.
    Play {
        id: TrackId,
        reply: Sender<Result<()>>,
    },
    /// Stop a track; the pipeline winds down when nothing stays active.
    Stop { id: TrackId },
    Pause { id: TrackId },
    Resume { id: TrackId },

    SetVolume { id: TrackId, volume: f32 },
    Seek { id: TrackId, position_ms: i64 },
    /// Ramp a track's volume over a duration instead of stepping it.
    FadeTo {
        id: TrackId,
        volume: f32,
        duration_ms: u64,
    },

    SetMasterVolume { volume: f32 },

    /// Stop hardware, drain and exit the sequencer thread.
    Shutdown,
}

impl fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::AddTrack {
                id, looped, volume, ..
            } => f
                .debug_struct("AddTrack")
                .field("id", id)
                .field("looped", looped)
                .field("volume", volume)
                .finish(),
            EngineCommand::DisposeTrack { id } => {
                f.debug_struct("DisposeTrack").field("id", id).finish()
            }
            EngineCommand::Play { id, .. } => f.debug_struct("Play").field("id", id).finish(),
            EngineCommand::Stop { id } => f.debug_struct("Stop").field("id", id).finish(),
            EngineCommand::Pause { id } => f.debug_struct("Pause").field("id", id).finish(),
            EngineCommand::Resume { id } => f.debug_struct("Resume").field("id", id).finish(),
            EngineCommand::SetVolume { id, volume } => f
                .debug_struct("SetVolume")
                .field("id", id)
                .field("volume", volume)
                .finish(),
            EngineCommand::Seek { id, position_ms } => f
                .debug_struct("Seek")
                .field("id", id)
                .field("position_ms", position_ms)
                .finish(),
            EngineCommand::FadeTo {
                id,
                volume,
                duration_ms,
            } => f
                .debug_struct("FadeTo")
                .field("id", id)
                .field("volume", volume)
                .field("duration_ms", duration_ms)
                .finish(),
            EngineCommand::SetMasterVolume { volume } => f
                .debug_struct("SetMasterVolume")
                .field("volume", volume)
                .finish(),
            EngineCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
