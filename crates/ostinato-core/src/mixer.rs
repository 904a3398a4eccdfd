//! Additive track mixer.
//!
//! Runs only inside the render callback: no allocation, no locks, no
//! logging. The scratch buffer is sized once for the largest callback
//! the engine will service and reused for every block.

use crate::gain;
use crate::registry::RenderSnapshot;
use crate::track::TrackState;

/// Mixes the playing tracks of a snapshot into one interleaved buffer.
///
/// The mix is a plain sum: no clipping or limiting is applied, so
/// overlapping full-scale tracks can exceed full scale.
pub struct Mixer {
    scratch: Vec<f32>,
    channels: usize,
}

impl Mixer {
    /// `max_frames` bounds the block size this mixer will ever be asked
    /// to render; the scratch allocation happens here, on the control
    /// plane.
    pub fn new(max_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            scratch: vec![0.0; max_frames * channels],
            channels,
        }
    }

    /// Mix `frames` frames of every Playing track into `output`
    /// (interleaved, `frames * channels` samples). Returns the number of
    /// tracks that contributed.
    ///
    /// Tracks that run off the end of a non-looping source flip
    /// themselves to Stopped and raise their finished flag; the
    /// sequencer sweeps those later. Nothing is freed or structurally
    /// changed here.
    pub fn render(&mut self, snapshot: &RenderSnapshot, output: &mut [f32], frames: usize) -> usize {
        let ch = self.channels;
        let out = &mut output[..frames * ch];
        out.fill(0.0);

        let mut mixed = 0;
        for track in snapshot.tracks() {
            if track.state() != TrackState::Playing {
                continue;
            }

            let src_ch = track.source().channels().max(1) as usize;
            let scratch = &mut self.scratch[..frames * src_ch];
            let advanced = track.advance(scratch, frames);

            // SAFETY: render() is only invoked from the render thread,
            // which is the sole user of the track's ramp cell.
            let block_db = unsafe { track.advance_gain(advanced.frames_read as u64) };
            let amp = gain::amplitude_from_db(block_db);

            if advanced.frames_read == 0 || amp == 0.0 {
                continue;
            }
            mixed += 1;

            if src_ch == ch {
                for (o, s) in out
                    .iter_mut()
                    .zip(scratch[..advanced.frames_read * ch].iter())
                {
                    *o += s * amp;
                }
            } else {
                // Mono source fanned out to every output channel.
                // (Registration rejects every other mismatch.)
                for (frame, &s) in scratch[..advanced.frames_read].iter().enumerate() {
                    let scaled = s * amp;
                    for c in 0..ch {
                        out[frame * ch + c] += scaled;
                    }
                }
            }
        }

        mixed
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn max_frames(&self) -> usize {
        self.scratch.len() / self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TrackRegistry;
    use crate::source::MemorySource;
    use crate::track::{Track, TrackId};
    use std::sync::Arc;

    fn snapshot_with(tracks: Vec<Arc<Track>>) -> (TrackRegistry, Arc<RenderSnapshot>) {
        let mut registry = TrackRegistry::new();
        for track in tracks {
            registry.insert(track).unwrap();
        }
        let snapshot = registry.snapshot_handle().load_full();
        (registry, snapshot)
    }

    fn stereo_track(id: u64, value: f32, frames: u64) -> Arc<Track> {
        let source = Arc::new(MemorySource::new(
            vec![value; frames as usize * 2],
            44_100,
            2,
        ));
        let track = Arc::new(Track::new(TrackId(id), source, false, 1.0));
        track.mark_playing();
        track
    }

    #[test]
    fn test_mixes_additively() {
        let (_registry, snapshot) =
            snapshot_with(vec![stereo_track(1, 0.25, 100), stereo_track(2, 0.5, 100)]);
        let mut mixer = Mixer::new(64, 2);

        let mut out = [0.0f32; 32];
        let mixed = mixer.render(&snapshot, &mut out, 16);
        assert_eq!(mixed, 2);
        for &s in &out {
            assert!((s - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_fills_before_mixing() {
        let (_registry, snapshot) = snapshot_with(vec![]);
        let mut mixer = Mixer::new(64, 2);

        let mut out = [1.0f32; 32];
        let mixed = mixer.render(&snapshot, &mut out, 16);
        assert_eq!(mixed, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_paused_and_stopped_tracks_skipped() {
        let playing = stereo_track(1, 0.5, 100);
        let paused = stereo_track(2, 0.5, 100);
        paused.pause();
        let stopped = stereo_track(3, 0.5, 100);
        stopped.stop();

        let (_registry, snapshot) = snapshot_with(vec![playing, paused, stopped]);
        let mut mixer = Mixer::new(64, 2);

        let mut out = [0.0f32; 32];
        assert_eq!(mixer.render(&snapshot, &mut out, 16), 1);
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mono_fans_out() {
        let source = Arc::new(MemorySource::new(vec![0.5; 100], 44_100, 1));
        let track = Arc::new(Track::new(TrackId(1), source, false, 1.0));
        track.mark_playing();

        let (_registry, snapshot) = snapshot_with(vec![track]);
        let mut mixer = Mixer::new(64, 2);

        let mut out = [0.0f32; 32];
        mixer.render(&snapshot, &mut out, 16);
        for frame in out.chunks(2) {
            assert!((frame[0] - 0.5).abs() < 1e-6);
            assert!((frame[1] - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_muted_track_advances_without_contributing() {
        let track = stereo_track(1, 0.5, 100);
        track.set_volume(0.0);

        let (registry, snapshot) = snapshot_with(vec![track]);
        let mut mixer = Mixer::new(64, 2);

        let mut out = [0.0f32; 128];
        assert_eq!(mixer.render(&snapshot, &mut out, 64), 0);
        assert!(out.iter().all(|&s| s == 0.0));

        // Position still moved: a muted track keeps its place in time
        let track = registry.get(TrackId(1)).unwrap();
        assert_eq!(track.position_ms(), 1); // 64 frames at 44.1 kHz
    }

    #[test]
    fn test_ended_track_flags_finished() {
        let track = stereo_track(1, 0.5, 8);
        let (registry, snapshot) = snapshot_with(vec![track]);
        let mut mixer = Mixer::new(64, 2);

        let mut out = [0.0f32; 32];
        mixer.render(&snapshot, &mut out, 16);

        let track = registry.get(TrackId(1)).unwrap();
        assert_eq!(track.state(), TrackState::Stopped);
        assert!(track.is_finished());
        assert_eq!(registry.finished_ids(), vec![TrackId(1)]);
    }
}
