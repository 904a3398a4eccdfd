//! Playback engine kernel: track registry, render snapshot, mixer,
//! pipeline state machine, output backends.
//!
//! # Primary API
//!
//! - [`Engine`] / [`EngineBuilder`]: main entry point
//! - [`PcmSource`]: the decode-side seam (the engine never decodes)
//! - [`ManualOutput`]: backend for tests and offline rendering
//! - [`RenderStatsSnapshot`]: realtime-path observability
//!
//! # Threading model
//!
//! All control calls are serialized onto one sequencer thread, the sole
//! writer of track and pipeline state. The render callback reads an
//! immutable snapshot through a single wait-free pointer load and shares
//! nothing else with the control plane but atomics.
//!
//! # Example
//!
//! ```ignore
//! use ostinato_core::{Engine, MemorySource, TrackId};
//! use std::sync::Arc;
//!
//! let engine = Engine::builder().build()?;
//! let source = Arc::new(MemorySource::new(samples, 44_100, 2));
//! engine.add_track(TrackId(1), source, true, 0.8)?;
//! engine.play(TrackId(1))?;
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::EngineConfig;

mod engine;
pub use engine::{Engine, EngineBuilder};

pub mod gain;

mod fade;
pub use fade::GainRamp;

mod source;
pub use source::{frames_to_millis, millis_to_frames, MemorySource, PcmSource};

mod track;
pub use track::{AdvanceResult, Track, TrackId, TrackState};

mod registry;
pub use registry::{RenderSnapshot, TrackRegistry};

mod mixer;
pub use mixer::Mixer;

mod callback;
pub use callback::RenderHandle;

mod stats;
pub use stats::{RenderStats, RenderStatsSnapshot};

mod output;
pub use output::{ManualOutput, ManualOutputController, OutputBackend};

#[cfg(feature = "cpal")]
pub use output::CpalOutput;

pub(crate) mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

mod pipeline;
pub use pipeline::{PipelineEvent, PipelineFsm, PipelineState, Transition};
