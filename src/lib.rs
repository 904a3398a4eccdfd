//! # Ostinato - Real-time Multi-track Playback Engine
//!
//! Mixes file-backed PCM tracks (per-track looping, volume, seek,
//! pause/resume) into a low-latency hardware output callback.
//!
//! ## Architecture
//!
//! - **ostinato-core** - Engine kernel: track registry, render snapshot
//!   handoff, additive mixer, pipeline state machine, output backends
//!
//! All control calls (play/pause/stop/seek/volume) are serialized onto a
//! single sequencer thread; the render callback reads an immutable,
//! atomically-published snapshot and never blocks on the control plane.
//! Decoding is not part of the engine: anything implementing
//! [`PcmSource`] can be registered as a track.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ostinato::prelude::*;
//! use std::sync::Arc;
//!
//! let engine = Engine::builder().build()?;
//!
//! let source = Arc::new(MemorySource::new(samples, 44_100, 2));
//! engine.add_track(TrackId(1), source, /*looped:*/ true, /*volume:*/ 0.8)?;
//!
//! engine.play(TrackId(1))?;
//! engine.seek(TrackId(1), 2_000)?;
//! engine.fade_to(TrackId(1), 0.0, 500)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - CPAL hardware output
//! - `cpal` - CPAL output backend; disable for headless/offline hosts

/// Re-export of ostinato-core for direct access
pub use ostinato_core as core;

pub use ostinato_core::{
    // Errors
    Error,
    Result,

    // Engine
    Engine,
    EngineBuilder,
    EngineConfig,

    // Tracks and sources
    MemorySource,
    PcmSource,
    TrackId,
    TrackState,

    // Pipeline lifecycle
    PipelineState,

    // Gain
    gain,
    GainRamp,

    // Observability
    RenderStatsSnapshot,

    // Backends
    ManualOutput,
    ManualOutputController,
    OutputBackend,
};

#[cfg(feature = "cpal")]
pub use ostinato_core::CpalOutput;

/// Common imports for hosts.
pub mod prelude {
    pub use crate::{
        Engine, EngineBuilder, EngineConfig, Error, MemorySource, PcmSource, PipelineState,
        Result, TrackId, TrackState,
    };
}
