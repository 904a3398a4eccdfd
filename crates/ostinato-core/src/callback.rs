//! Render callback state.
//!
//! A [`RenderHandle`] is everything the output backend needs to service
//! one buffer deadline: the snapshot publication point, the mixer, the
//! master gain and the stats counters. It is built on the control plane
//! and moved into the backend when the pipeline starts.

use crate::lockfree::AtomicFloat;
use crate::mixer::Mixer;
use crate::registry::RenderSnapshot;
use crate::stats::RenderStats;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// State for the realtime render path.
///
/// # RT safety
/// `render` performs one wait-free snapshot load and otherwise touches
/// only preallocated buffers and atomics. It never allocates, locks,
/// logs, or calls back into the control plane.
pub struct RenderHandle {
    snapshot: Arc<ArcSwap<RenderSnapshot>>,
    mixer: Mixer,
    stats: Arc<RenderStats>,
    master_volume: Arc<AtomicFloat>,
    channels: usize,
}

impl RenderHandle {
    pub fn new(
        snapshot: Arc<ArcSwap<RenderSnapshot>>,
        mixer: Mixer,
        stats: Arc<RenderStats>,
        master_volume: Arc<AtomicFloat>,
    ) -> Self {
        let channels = mixer.channels();
        Self {
            snapshot,
            mixer,
            stats,
            master_volume,
            channels,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Service one buffer deadline. `output` is interleaved and its
    /// length determines the requested frame count.
    ///
    /// Oversized requests and empty snapshots substitute silence and
    /// bump a counter; the callback itself never fails.
    pub fn render(&mut self, output: &mut [f32]) {
        let frames = output.len() / self.channels;
        self.stats.record_callback(frames as u64);

        if frames > self.mixer.max_frames() {
            output.fill(0.0);
            self.stats.record_underrun();
            self.stats.record_silence();
            return;
        }

        let snapshot = self.snapshot.load();
        let mixed = self.mixer.render(&snapshot, output, frames);
        if mixed == 0 {
            self.stats.record_silence();
            return;
        }

        let master = self.master_volume.get().clamp(0.0, 1.0);
        if master < 1.0 {
            for sample in output.iter_mut() {
                *sample *= master;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TrackRegistry;
    use crate::source::MemorySource;
    use crate::track::{Track, TrackId};

    fn handle_with_registry() -> (TrackRegistry, RenderHandle, Arc<RenderStats>) {
        let registry = TrackRegistry::new();
        let stats = Arc::new(RenderStats::new());
        let handle = RenderHandle::new(
            registry.snapshot_handle(),
            Mixer::new(64, 2),
            Arc::clone(&stats),
            Arc::new(AtomicFloat::new(1.0)),
        );
        (registry, handle, stats)
    }

    fn playing_track(id: u64, value: f32) -> Arc<Track> {
        let source = Arc::new(MemorySource::new(vec![value; 2000], 44_100, 2));
        let track = Arc::new(Track::new(TrackId(id), source, true, 1.0));
        track.mark_playing();
        track
    }

    #[test]
    fn test_oversized_request_substitutes_silence() {
        let (_registry, mut handle, stats) = handle_with_registry();

        let mut output = vec![1.0f32; 256]; // 128 frames > 64 max
        handle.render(&mut output);

        assert!(output.iter().all(|&s| s == 0.0));
        let snap = stats.snapshot();
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.silent_callbacks, 1);
        assert_eq!(snap.callbacks, 1);
    }

    #[test]
    fn test_empty_snapshot_is_silent_not_an_error() {
        let (_registry, mut handle, stats) = handle_with_registry();

        let mut output = vec![1.0f32; 64];
        handle.render(&mut output);

        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(stats.snapshot().silent_callbacks, 1);
        assert_eq!(stats.snapshot().underruns, 0);
    }

    #[test]
    fn test_renders_published_tracks() {
        let (mut registry, mut handle, stats) = handle_with_registry();
        registry.insert(playing_track(1, 0.25)).unwrap();

        let mut output = vec![0.0f32; 64];
        handle.render(&mut output);

        assert!((output[0] - 0.25).abs() < 1e-6);
        assert_eq!(stats.snapshot().silent_callbacks, 0);
        assert_eq!(stats.snapshot().frames_rendered, 32);
    }

    #[test]
    fn test_master_volume_scales_output() {
        let registry = {
            let mut r = TrackRegistry::new();
            r.insert(playing_track(1, 0.8)).unwrap();
            r
        };
        let master = Arc::new(AtomicFloat::new(0.5));
        let mut handle = RenderHandle::new(
            registry.snapshot_handle(),
            Mixer::new(64, 2),
            Arc::new(RenderStats::new()),
            Arc::clone(&master),
        );

        let mut output = vec![0.0f32; 64];
        handle.render(&mut output);
        assert!((output[0] - 0.4).abs() < 1e-6);
    }
}
