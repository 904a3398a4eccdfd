//! PCM source abstraction.
//!
//! Decoding lives outside the engine: a source hands over interleaved
//! f32 frames on demand. Implementations must be readable from the
//! render thread without blocking, which in practice means memory-backed
//! or lock-free buffers.

use std::sync::Arc;

/// A decodable run of PCM frames.
pub trait PcmSource: Send + Sync {
    /// Total length in frames.
    fn frames(&self) -> u64;

    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Channel count of the interleaved data.
    fn channels(&self) -> u16;

    /// Copy up to `dst.len() / channels` frames starting at `start_frame`
    /// into `dst` (interleaved). Returns the number of frames written;
    /// short reads happen only at end of source.
    fn read(&self, start_frame: u64, dst: &mut [f32]) -> usize;
}

/// Pre-decoded source backed by an owned interleaved buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    channels: u16,
}

impl MemorySource {
    /// Wrap interleaved samples. Trailing partial frames are ignored.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// A silent source of the given length, useful as a placeholder.
    pub fn silence(frames: u64, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        Self::new(
            vec![0.0; frames as usize * channels as usize],
            sample_rate,
            channels,
        )
    }
}

impl PcmSource for MemorySource {
    fn frames(&self) -> u64 {
        (self.samples.len() / self.channels as usize) as u64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&self, start_frame: u64, dst: &mut [f32]) -> usize {
        let ch = self.channels as usize;
        let total = self.frames();
        if start_frame >= total {
            return 0;
        }

        let want = dst.len() / ch;
        let avail = (total - start_frame) as usize;
        let take = want.min(avail);

        let start = start_frame as usize * ch;
        let end = start + take * ch;
        dst[..take * ch].copy_from_slice(&self.samples[start..end]);
        take
    }
}

/// Convert a frame offset to milliseconds at the given rate.
#[inline]
pub fn frames_to_millis(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames * 1000 / sample_rate as u64
}

/// Convert milliseconds to a frame offset at the given rate.
#[inline]
pub fn millis_to_frames(millis: u64, sample_rate: u32) -> u64 {
    millis * sample_rate as u64 / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_geometry() {
        let src = MemorySource::new(vec![0.0; 200], 44_100, 2);
        assert_eq!(src.frames(), 100);
        assert_eq!(src.channels(), 2);
        assert_eq!(src.sample_rate(), 44_100);
    }

    #[test]
    fn test_read_within_bounds() {
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let src = MemorySource::new(samples, 48_000, 2);

        let mut dst = [0.0f32; 8];
        let read = src.read(2, &mut dst);
        assert_eq!(read, 4);
        assert_eq!(dst[0], 4.0);
        assert_eq!(dst[7], 11.0);
    }

    #[test]
    fn test_short_read_at_end() {
        let src = MemorySource::new(vec![1.0; 10], 48_000, 1);

        let mut dst = [0.0f32; 8];
        assert_eq!(src.read(7, &mut dst), 3);
        assert_eq!(src.read(10, &mut dst), 0);
        assert_eq!(src.read(u64::MAX, &mut dst), 0);
    }

    #[test]
    fn test_silence_source() {
        let src = MemorySource::silence(50, 44_100, 2);
        assert_eq!(src.frames(), 50);

        let mut dst = [1.0f32; 16];
        src.read(0, &mut dst);
        assert!(dst.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_millis_conversions() {
        assert_eq!(frames_to_millis(44_100, 44_100), 1000);
        assert_eq!(millis_to_frames(1000, 44_100), 44_100);
        assert_eq!(frames_to_millis(22_050, 44_100), 500);
        assert_eq!(frames_to_millis(100, 0), 0);
    }
}
