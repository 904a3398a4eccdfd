//! Render statistics.
//!
//! Realtime anomalies can never surface as errors (the callback has no
//! one to throw to), so the render path records them in atomic counters
//! and hosts poll a snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters written by the render thread, read by the control plane.
#[derive(Debug, Default)]
pub struct RenderStats {
    /// Callbacks serviced.
    callbacks: AtomicU64,
    /// Frames rendered (including silence substitutions).
    frames_rendered: AtomicU64,
    /// Callbacks that exceeded the configured frame maximum.
    underruns: AtomicU64,
    /// Callbacks that produced silence for any reason (overrun request,
    /// empty snapshot).
    silent_callbacks: AtomicU64,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_callback(&self, frames: u64) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_silence(&self) {
        self.silent_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current counters.
    pub fn snapshot(&self) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            silent_callbacks: self.silent_callbacks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the render counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStatsSnapshot {
    pub callbacks: u64,
    pub frames_rendered: u64,
    pub underruns: u64,
    pub silent_callbacks: u64,
}
