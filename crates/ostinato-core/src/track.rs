//! Per-track playback state.
//!
//! A `Track` pairs an immutable PCM source with the mutable cursor/state
//! the engine needs to play it. Tracks are shared between the sequencer
//! (sole writer of control state) and the render thread (reader, plus
//! cursor advancement), so every mutable field is an atomic scalar.
//! Structural changes never happen here; those go through the registry.

use crate::fade::GainRamp;
use crate::gain;
use crate::lockfree::{AtomicFlag, AtomicFloat};
use crate::source::{frames_to_millis, PcmSource};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Opaque track identifier, assigned by the caller at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state of a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TrackState {
    fn to_u8(self) -> u8 {
        match self {
            TrackState::Stopped => 0,
            TrackState::Playing => 1,
            TrackState::Paused => 2,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => TrackState::Playing,
            2 => TrackState::Paused,
            _ => TrackState::Stopped,
        }
    }
}

/// Result of advancing a track's cursor by one render block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    /// Frames actually read into the destination.
    pub frames_read: usize,
    /// The track just ran off the end of a non-looping source.
    pub newly_stopped: bool,
}

/// State the render thread keeps per track between callbacks.
struct RenderCell {
    ramp: GainRamp,
}

/// One file-backed audio track.
pub struct Track {
    id: TrackId,
    source: Arc<dyn PcmSource>,
    looped: bool,

    state: AtomicU8,
    /// Frame offset into the source; always within `[0, frames)`.
    cursor: AtomicU64,
    /// Cursor saved at pause time; cleared on resume and stop.
    pause_frame: AtomicU64,

    volume: AtomicFloat,
    gain_db: AtomicFloat,

    /// Set by the render thread when a non-looping source runs out.
    /// The sequencer reads it; the render path never mutates the
    /// registry structurally.
    finished: AtomicFlag,

    // Fade mailbox: the sequencer posts a request here, the render
    // thread consumes it on its next block.
    fade_pending: AtomicFlag,
    fade_from_silence: AtomicFlag,
    fade_target_db: AtomicFloat,
    fade_frames: AtomicU64,
    fade_steps: AtomicU32,

    /// Ramp state owned by the render thread. Only accessed from the
    /// audio callback via [`Track::advance_gain`].
    render: UnsafeCell<RenderCell>,
}

// SAFETY: all shared fields are atomics; `render` is an UnsafeCell that
// is only ever touched from the render thread (one thread at a time, by
// construction of the output backend).
unsafe impl Send for Track {}
unsafe impl Sync for Track {}

impl Track {
    pub fn new(id: TrackId, source: Arc<dyn PcmSource>, looped: bool, volume: f32) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        let gain_db = gain::db_from_volume(volume);
        Self {
            id,
            source,
            looped,
            state: AtomicU8::new(TrackState::Stopped.to_u8()),
            cursor: AtomicU64::new(0),
            pause_frame: AtomicU64::new(0),
            volume: AtomicFloat::new(volume),
            gain_db: AtomicFloat::new(gain_db),
            finished: AtomicFlag::new(false),
            fade_pending: AtomicFlag::new(false),
            fade_from_silence: AtomicFlag::new(false),
            fade_target_db: AtomicFloat::new(gain_db),
            fade_frames: AtomicU64::new(0),
            fade_steps: AtomicU32::new(0),
            render: UnsafeCell::new(RenderCell {
                ramp: GainRamp::new(gain_db),
            }),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn looped(&self) -> bool {
        self.looped
    }

    pub fn source(&self) -> &Arc<dyn PcmSource> {
        &self.source
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        TrackState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Playing or Paused; such tracks keep the pipeline running.
    #[inline]
    pub fn is_active(&self) -> bool {
        !matches!(self.state(), TrackState::Stopped)
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db.get()
    }

    /// True once a non-looping source has played to its end.
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Current position in milliseconds of the track's own timeline.
    /// Reports the pause point while paused and 0 when stopped.
    pub fn position_ms(&self) -> u64 {
        match self.state() {
            TrackState::Playing => {
                frames_to_millis(self.cursor.load(Ordering::Acquire), self.source.sample_rate())
            }
            TrackState::Paused => frames_to_millis(
                self.pause_frame.load(Ordering::Acquire),
                self.source.sample_rate(),
            ),
            TrackState::Stopped => 0,
        }
    }

    // --- control-plane transitions (sequencer only) ---

    pub fn mark_playing(&self) {
        self.finished.set(false);
        self.state.store(TrackState::Playing.to_u8(), Ordering::Release);
    }

    pub fn pause(&self) {
        if self.state() == TrackState::Playing {
            self.pause_frame
                .store(self.cursor.load(Ordering::Acquire), Ordering::Release);
            self.state.store(TrackState::Paused.to_u8(), Ordering::Release);
        }
    }

    /// Resume from pause, ramping up from silence over `ramp_frames` to
    /// avoid a click at the resume point.
    pub fn resume(&self, ramp_frames: u64, ramp_steps: u32) {
        if self.state() == TrackState::Paused {
            self.pause_frame.store(0, Ordering::Release);
            self.request_fade(self.gain_db.get(), ramp_frames, ramp_steps, true);
            self.state.store(TrackState::Playing.to_u8(), Ordering::Release);
        }
    }

    pub fn stop(&self) {
        self.state.store(TrackState::Stopped.to_u8(), Ordering::Release);
        self.cursor.store(0, Ordering::Release);
        self.pause_frame.store(0, Ordering::Release);
        self.finished.set(false);
    }

    /// Seek to a frame offset. Out-of-range targets reset to 0 (silent
    /// correction policy); pause state is preserved at the new position.
    pub fn seek_frames(&self, target: u64) {
        let target = if target >= self.source.frames() { 0 } else { target };
        self.cursor.store(target, Ordering::Release);
        if self.state() == TrackState::Paused {
            self.pause_frame.store(target, Ordering::Release);
        }
    }

    /// Set linear volume; the derived gain takes effect on the next mix
    /// block. No implicit fade.
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume.set(volume);
        self.gain_db.set(gain::db_from_volume(volume));
    }

    /// Fade toward `volume` over `total_frames` in `steps` increments.
    /// The target becomes the track volume immediately; the audible gain
    /// walks there on the render thread.
    pub fn fade_to(&self, volume: f32, total_frames: u64, steps: u32) {
        let volume = volume.clamp(0.0, 1.0);
        // Mailbox first: a render block landing in between must see the
        // ramp request, not a bare gain jump
        self.request_fade(gain::db_from_volume(volume), total_frames, steps, false);
        self.volume.set(volume);
        self.gain_db.set(gain::db_from_volume(volume));
    }

    fn request_fade(&self, target_db: f32, total_frames: u64, steps: u32, from_silence: bool) {
        self.fade_target_db.set(target_db);
        self.fade_frames.store(total_frames, Ordering::Release);
        self.fade_steps.store(steps, Ordering::Release);
        self.fade_from_silence.set(from_silence);
        self.fade_pending.set(true);
    }

    // --- render-thread operations ---

    /// Advance the cursor by up to `frames`, copying interleaved samples
    /// into `dst` (sized `frames * source channels`).
    ///
    /// Looping tracks wrap to 0 and stay Playing; non-looping tracks
    /// flip to Stopped at end-of-source and report `newly_stopped`.
    pub(crate) fn advance(&self, dst: &mut [f32], frames: usize) -> AdvanceResult {
        let ch = self.source.channels() as usize;
        let total = self.source.frames();
        if total == 0 {
            return self.stop_at_end(0);
        }

        let mut cursor = self.cursor.load(Ordering::Acquire);
        let mut written = 0usize;

        while written < frames {
            let got = self
                .source
                .read(cursor, &mut dst[written * ch..frames * ch]);
            if got == 0 {
                // Source refused to produce at a valid cursor; treat as end
                return self.stop_at_end(written);
            }
            written += got;
            cursor += got as u64;

            if cursor >= total {
                if self.looped {
                    cursor %= total;
                } else {
                    return self.stop_at_end(written);
                }
            }
        }

        self.cursor.store(cursor, Ordering::Release);
        AdvanceResult {
            frames_read: written,
            newly_stopped: false,
        }
    }

    fn stop_at_end(&self, written: usize) -> AdvanceResult {
        self.state.store(TrackState::Stopped.to_u8(), Ordering::Release);
        self.cursor.store(0, Ordering::Release);
        self.finished.set(true);
        AdvanceResult {
            frames_read: written,
            newly_stopped: true,
        }
    }

    /// Account for `frames` of rendered audio and return the gain (dB)
    /// to apply for this block, consuming any pending fade request.
    ///
    /// # Safety
    /// Must only be called from the render thread; it mutates the
    /// render-only ramp cell behind `&self`.
    #[inline]
    pub(crate) unsafe fn advance_gain(&self, frames: u64) -> f32 {
        let cell = &mut *self.render.get();

        if self.fade_pending.swap(false) {
            if self.fade_from_silence.swap(false) {
                cell.ramp.set_immediate(gain::SILENCE_DB);
            }
            cell.ramp.ramp_to(
                self.fade_target_db.get(),
                self.fade_frames.load(Ordering::Acquire),
                self.fade_steps.load(Ordering::Acquire),
            );
        } else if !cell.ramp.is_ramping() {
            // Idle ramp tracks plain volume changes
            cell.ramp.set_immediate(self.gain_db.get());
        }

        cell.ramp.advance(frames)
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("looped", &self.looped)
            .field("state", &self.state())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .field("volume", &self.volume.get())
            .finish()
    }
}
