//! Public engine facade.
//!
//! The `Engine` value is owned by the host application and handed around
//! by reference; there is no process-wide singleton. Every call funnels
//! into the sequencer's FIFO, so concurrent callers see a consistent
//! command order.

use crate::config::EngineConfig;
use crate::lockfree::AtomicFloat;
use crate::output::OutputBackend;
use crate::pipeline::{self, EngineCommand, PipelineState, SequencerHandles};
use crate::source::PcmSource;
use crate::stats::{RenderStats, RenderStatsSnapshot};
use crate::track::{Track, TrackId, TrackState};
use crate::{Error, Result};
use crossbeam_channel::{bounded, Sender};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;

/// Handle to a running playback engine.
///
/// Dropping the engine shuts the pipeline down and joins the sequencer.
pub struct Engine {
    tx: Sender<EngineCommand>,
    join: Option<JoinHandle<()>>,
    index: Arc<DashMap<TrackId, Arc<Track>>>,
    pipeline_state: Arc<AtomicU8>,
    stats: Arc<RenderStats>,
    master_volume: Arc<AtomicFloat>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a track. The id is caller-assigned and must be unique
    /// among live tracks; the source must be mono or match the output
    /// channel count.
    pub fn add_track(
        &self,
        id: TrackId,
        source: Arc<dyn PcmSource>,
        looped: bool,
        volume: f32,
    ) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.send(EngineCommand::AddTrack {
            id,
            source,
            looped,
            volume,
            reply,
        })?;
        rx.recv().map_err(|_| Error::EngineClosed)?
    }

    /// Unregister a track. Safe at any time: backing memory is reclaimed
    /// only after the render thread can no longer reach it.
    pub fn dispose_track(&self, id: TrackId) -> Result<()> {
        self.send(EngineCommand::DisposeTrack { id })
    }

    /// Start a track, bringing the output pipeline up if it is idle.
    /// Returns once the track is playing or the start definitively
    /// failed (bounded retries exhausted).
    pub fn play(&self, id: TrackId) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.send(EngineCommand::Play { id, reply })?;
        rx.recv().map_err(|_| Error::EngineClosed)?
    }

    /// Stop a track and reset its position. The pipeline winds down to
    /// idle when no track remains playing or paused.
    pub fn stop(&self, id: TrackId) -> Result<()> {
        self.send(EngineCommand::Stop { id })
    }

    /// Pause a track in place. The pipeline keeps running.
    pub fn pause(&self, id: TrackId) -> Result<()> {
        self.send(EngineCommand::Pause { id })
    }

    /// Resume a paused track at its pause position, with a short ramp to
    /// avoid a click.
    pub fn resume(&self, id: TrackId) -> Result<()> {
        self.send(EngineCommand::Resume { id })
    }

    /// Set a track's linear volume in `[0, 1]`; effective on the next
    /// mix block, no fade.
    pub fn set_volume(&self, id: TrackId, volume: f32) -> Result<()> {
        self.send(EngineCommand::SetVolume { id, volume })
    }

    /// Seek a track to a position in milliseconds. Out-of-range targets
    /// reset to 0; a paused track stays paused at the new position.
    pub fn seek(&self, id: TrackId, position_ms: i64) -> Result<()> {
        self.send(EngineCommand::Seek { id, position_ms })
    }

    /// Ramp a track's volume to `volume` over `duration_ms`.
    pub fn fade_to(&self, id: TrackId, volume: f32, duration_ms: u64) -> Result<()> {
        self.send(EngineCommand::FadeTo {
            id,
            volume,
            duration_ms,
        })
    }

    /// Current position of a track in milliseconds; 0 if the track is
    /// unknown or stopped. Wait-free.
    pub fn position_ms(&self, id: TrackId) -> u64 {
        self.index
            .get(&id)
            .map(|entry| entry.value().position_ms())
            .unwrap_or(0)
    }

    /// Playback state of a track, if it is registered.
    pub fn track_state(&self, id: TrackId) -> Option<TrackState> {
        self.index.get(&id).map(|entry| entry.value().state())
    }

    /// Current linear volume of a track, if it is registered. During a
    /// fade this is already the fade target; the audible gain walks
    /// there on the render clock.
    pub fn track_volume(&self, id: TrackId) -> Option<f32> {
        self.index.get(&id).map(|entry| entry.value().volume())
    }

    /// Current pipeline lifecycle state.
    pub fn pipeline_state(&self) -> PipelineState {
        PipelineState::from_u8(self.pipeline_state.load(Ordering::Acquire))
    }

    /// True while the render callback is being serviced.
    pub fn is_running(&self) -> bool {
        self.pipeline_state() == PipelineState::Running
    }

    /// Poll the render-path counters.
    pub fn render_stats(&self) -> RenderStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.get()
    }

    /// Set the post-mix master volume in `[0, 1]`. Ordered with the
    /// other commands.
    pub fn set_master_volume(&self, volume: f32) -> Result<()> {
        self.send(EngineCommand::SetMasterVolume { volume })
    }

    /// Stop the pipeline and join the sequencer. Called implicitly on
    /// drop; explicit shutdown surfaces join ordering to the host.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::EngineClosed)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    backend: Option<Box<dyn OutputBackend>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            backend: None,
        }
    }
}

impl EngineBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.config.channels = channels;
        self
    }

    /// Use a custom output backend instead of the default CPAL device.
    pub fn backend(mut self, backend: Box<dyn OutputBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Validate the configuration and spawn the sequencer. The output
    /// unit itself stays down until the first `play`.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => Self::default_backend()?,
        };

        let config = self.config;
        let SequencerHandles {
            tx,
            join,
            index,
            pipeline_state,
            stats,
            master_volume,
        } = pipeline::spawn(config.clone(), backend);

        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "engine ready"
        );

        Ok(Engine {
            tx,
            join: Some(join),
            index,
            pipeline_state,
            stats,
            master_volume,
            config,
        })
    }

    #[cfg(feature = "cpal")]
    fn default_backend() -> Result<Box<dyn OutputBackend>> {
        Ok(Box::new(crate::output::CpalOutput::new()))
    }

    #[cfg(not(feature = "cpal"))]
    fn default_backend() -> Result<Box<dyn OutputBackend>> {
        Err(Error::InvalidConfig(
            "no output backend: enable the `cpal` feature or provide one with .backend()".into(),
        ))
    }
}
