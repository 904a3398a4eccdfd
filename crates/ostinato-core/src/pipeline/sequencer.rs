//! Engine command sequencer.
//!
//! A single worker thread consumes every control-plane command in FIFO
//! order. It is the sole writer of the track registry and the pipeline
//! state machine, which is what makes the transition table race-free:
//! a `play` immediately followed by a `stop` nets out to stopped, and a
//! second `play` arriving while a start is in flight queues behind it
//! instead of spawning a second start attempt.
//!
//! Hardware start/stop runs synchronously on this thread, including the
//! bounded retry backoff; the render thread never waits on any of it.

use crate::callback::RenderHandle;
use crate::config::EngineConfig;
use crate::lockfree::AtomicFloat;
use crate::mixer::Mixer;
use crate::output::OutputBackend;
use crate::pipeline::command::EngineCommand;
use crate::pipeline::fsm::{PipelineEvent, PipelineFsm, PipelineState};
use crate::registry::TrackRegistry;
use crate::source::millis_to_frames;
use crate::stats::RenderStats;
use crate::track::{Track, TrackId};
use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thread_priority::ThreadPriority;
use tracing::{debug, info, warn};

/// Finished-track sweep and snapshot reclamation cadence while idle.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(50);

/// Everything the engine facade keeps after spawning the sequencer.
pub(crate) struct SequencerHandles {
    pub tx: Sender<EngineCommand>,
    pub join: JoinHandle<()>,
    pub index: Arc<DashMap<TrackId, Arc<Track>>>,
    pub pipeline_state: Arc<AtomicU8>,
    pub stats: Arc<RenderStats>,
    pub master_volume: Arc<AtomicFloat>,
}

/// Spawn the sequencer thread.
pub(crate) fn spawn(config: EngineConfig, backend: Box<dyn OutputBackend>) -> SequencerHandles {
    let (tx, rx) = bounded(config.command_queue_capacity);
    let sequencer = Sequencer::new(config, backend, rx);

    let index = sequencer.registry.index_handle();
    let pipeline_state = Arc::clone(&sequencer.pipeline_state);
    let stats = Arc::clone(&sequencer.stats);
    let master_volume = Arc::clone(&sequencer.master_volume);

    let join = thread::Builder::new()
        .name("ostinato-sequencer".into())
        .spawn(move || {
            let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
            sequencer.run();
        })
        .expect("Failed to spawn sequencer thread");

    SequencerHandles {
        tx,
        join,
        index,
        pipeline_state,
        stats,
        master_volume,
    }
}

pub(crate) struct Sequencer {
    config: EngineConfig,
    registry: TrackRegistry,
    fsm: PipelineFsm,
    /// Mirror of the FSM state for wait-free reads from other threads.
    pipeline_state: Arc<AtomicU8>,
    backend: Box<dyn OutputBackend>,
    stats: Arc<RenderStats>,
    master_volume: Arc<AtomicFloat>,
    rx: Receiver<EngineCommand>,
}

impl Sequencer {
    pub(crate) fn new(
        config: EngineConfig,
        backend: Box<dyn OutputBackend>,
        rx: Receiver<EngineCommand>,
    ) -> Self {
        Self {
            config,
            registry: TrackRegistry::new(),
            fsm: PipelineFsm::new(),
            pipeline_state: Arc::new(AtomicU8::new(PipelineState::Idle.to_u8())),
            backend,
            stats: Arc::new(RenderStats::new()),
            master_volume: Arc::new(AtomicFloat::new(1.0)),
            rx,
        }
    }

    pub(crate) fn run(mut self) {
        info!("sequencer started");
        loop {
            match self.rx.recv_timeout(HOUSEKEEPING_INTERVAL) {
                Ok(EngineCommand::Shutdown) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => self.housekeep(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.wind_down();
        info!("sequencer stopped");
    }

    pub(crate) fn handle(&mut self, command: EngineCommand) {
        debug!(?command, "applying");
        match command {
            EngineCommand::AddTrack {
                id,
                source,
                looped,
                volume,
                reply,
            } => {
                let _ = reply.send(self.add_track(id, source, looped, volume));
            }
            EngineCommand::DisposeTrack { id } => {
                if self.registry.remove(id).is_none() {
                    debug!(%id, "dispose for unknown track ignored");
                }
                self.maybe_wind_down();
            }
            EngineCommand::Play { id, reply } => {
                let _ = reply.send(self.play(id));
            }
            EngineCommand::Stop { id } => {
                if let Some(track) = self.registry.get(id) {
                    track.stop();
                }
                self.maybe_wind_down();
            }
            EngineCommand::Pause { id } => {
                if let Some(track) = self.registry.get(id) {
                    track.pause();
                }
            }
            EngineCommand::Resume { id } => {
                if let Some(track) = self.registry.get(id) {
                    track.resume(self.config.resume_ramp_frames, self.config.fade_steps);
                }
            }
            EngineCommand::SetVolume { id, volume } => {
                if let Some(track) = self.registry.get(id) {
                    track.set_volume(volume);
                }
            }
            EngineCommand::Seek { id, position_ms } => {
                if let Some(track) = self.registry.get(id) {
                    let millis = position_ms.max(0) as u64;
                    let frames = millis_to_frames(millis, track.source().sample_rate());
                    track.seek_frames(frames);
                }
            }
            EngineCommand::FadeTo {
                id,
                volume,
                duration_ms,
            } => {
                if let Some(track) = self.registry.get(id) {
                    let frames = millis_to_frames(duration_ms, track.source().sample_rate());
                    track.fade_to(volume, frames, self.config.fade_steps);
                }
            }
            EngineCommand::SetMasterVolume { volume } => {
                self.master_volume.set(volume.clamp(0.0, 1.0));
            }
            EngineCommand::Shutdown => unreachable!("handled by run loop"),
        }
    }

    fn add_track(
        &mut self,
        id: TrackId,
        source: Arc<dyn crate::source::PcmSource>,
        looped: bool,
        volume: f32,
    ) -> Result<()> {
        let channels = source.channels();
        if channels != 1 && channels != self.config.channels {
            return Err(Error::UnsupportedChannelCount {
                got: channels,
                output: self.config.channels,
            });
        }
        if source.sample_rate() != self.config.sample_rate {
            // Resampling is decode-side; admitted, but the host should know
            warn!(
                %id,
                source_rate = source.sample_rate(),
                engine_rate = self.config.sample_rate,
                "sample rate mismatch, track will play at engine rate"
            );
        }

        self.registry
            .insert(Arc::new(Track::new(id, source, looped, volume)))
    }

    fn play(&mut self, id: TrackId) -> Result<()> {
        let Some(track) = self.registry.get(id) else {
            return Err(Error::TrackNotFound(id));
        };

        // Registry state changes before any hardware start is requested
        track.mark_playing();

        if self.fsm.state() == PipelineState::Idle {
            if let Err(err) = self.start_pipeline() {
                track.stop();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Bring the output unit up with bounded retries. Runs entirely on
    /// this thread; the backoff sleeps nobody else.
    fn start_pipeline(&mut self) -> Result<()> {
        self.apply(PipelineEvent::StartRequested);

        // A stale unit from an earlier run is torn down first
        if self.backend.is_running() {
            warn!("stale output unit found, tearing down before start");
            self.backend.stop();
        }

        let attempts = self.config.start_retry_attempts;
        for attempt in 1..=attempts {
            match self.backend.start(self.make_render_handle()) {
                Ok(()) => {
                    self.apply(PipelineEvent::StartSucceeded);
                    info!(attempt, "output unit running");
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, attempts, %err, "output unit start failed");
                    if attempt < attempts {
                        thread::sleep(self.config.start_retry_backoff);
                    }
                }
            }
        }

        self.apply(PipelineEvent::StartFailed);
        Err(Error::StartRetriesExhausted { attempts })
    }

    fn stop_pipeline(&mut self) {
        self.apply(PipelineEvent::StopRequested);
        self.backend.stop();
        self.apply(PipelineEvent::StopCompleted);
        info!("output unit stopped");
    }

    /// Wind the pipeline down once nothing is Playing or Paused.
    fn maybe_wind_down(&mut self) {
        if self.fsm.state() == PipelineState::Running && !self.registry.any_active() {
            self.stop_pipeline();
        }
    }

    /// Periodic work: sweep tracks whose non-looping source ran out on
    /// the render thread, reclaim superseded snapshots, and idle the
    /// pipeline if the sweep emptied it.
    fn housekeep(&mut self) {
        for id in self.registry.finished_ids() {
            if let Some(track) = self.registry.get(id) {
                debug!(%id, "track finished");
                track.stop();
            }
        }
        self.registry.reclaim();
        self.maybe_wind_down();
    }

    fn wind_down(&mut self) {
        if self.fsm.state() == PipelineState::Running {
            self.stop_pipeline();
        } else if self.backend.is_running() {
            self.backend.stop();
        }
    }

    fn make_render_handle(&self) -> RenderHandle {
        RenderHandle::new(
            self.registry.snapshot_handle(),
            Mixer::new(self.config.max_frames_per_callback, self.config.channels),
            Arc::clone(&self.stats),
            Arc::clone(&self.master_volume),
        )
    }

    fn apply(&mut self, event: PipelineEvent) {
        self.fsm.transition(event);
        self.pipeline_state
            .store(self.fsm.state().to_u8(), Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn pipeline_state(&self) -> PipelineState {
        self.fsm.state()
    }
}
