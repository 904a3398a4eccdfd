//! Stepped gain ramps for fades and resume smoothing.
//!
//! A ramp moves gain from its current value toward a target in discrete
//! linear steps, each lasting a fixed number of frames. The render path
//! advances ramps as part of normal mixing; nothing ever sleeps or
//! blocks waiting for a fade to complete.

use crate::gain;

/// Linear dB ramp advanced by frame count.
///
/// Owned by the render thread (inside a track's render cell). The control
/// plane requests ramps through the track's fade mailbox; it never touches
/// this struct directly.
#[derive(Debug, Clone)]
pub struct GainRamp {
    current_db: f32,
    target_db: f32,
    step_db: f32,
    frames_per_step: u64,
    frames_into_step: u64,
    steps_remaining: u32,
}

impl GainRamp {
    pub fn new(initial_db: f32) -> Self {
        Self {
            current_db: gain::clamp_db(initial_db),
            target_db: gain::clamp_db(initial_db),
            step_db: 0.0,
            frames_per_step: 0,
            frames_into_step: 0,
            steps_remaining: 0,
        }
    }

    /// Begin ramping from the current value toward `target_db`.
    ///
    /// `total_frames` is divided into `steps` equal holds; a step count
    /// of zero or a zero-length ramp snaps immediately.
    pub fn ramp_to(&mut self, target_db: f32, total_frames: u64, steps: u32) {
        let target_db = gain::clamp_db(target_db);
        if steps == 0 || total_frames == 0 {
            self.set_immediate(target_db);
            return;
        }

        self.target_db = target_db;
        self.steps_remaining = steps;
        self.step_db = (target_db - self.current_db) / steps as f32;
        self.frames_per_step = (total_frames / steps as u64).max(1);
        self.frames_into_step = 0;
    }

    /// Jump to a value with no ramp.
    pub fn set_immediate(&mut self, db: f32) {
        let db = gain::clamp_db(db);
        self.current_db = db;
        self.target_db = db;
        self.step_db = 0.0;
        self.steps_remaining = 0;
        self.frames_into_step = 0;
    }

    /// Account for `frames` of rendered audio and return the gain to
    /// apply for this block.
    ///
    /// Step granularity is far coarser than a hardware buffer, so the
    /// value is held constant across the block; the error is below one
    /// step of the configured fade resolution.
    #[inline]
    pub fn advance(&mut self, frames: u64) -> f32 {
        let block_db = self.current_db;

        if self.steps_remaining > 0 {
            self.frames_into_step += frames;
            while self.frames_into_step >= self.frames_per_step && self.steps_remaining > 0 {
                self.frames_into_step -= self.frames_per_step;
                self.current_db += self.step_db;
                self.steps_remaining -= 1;
            }
            // Snap on completion to avoid accumulation drift
            if self.steps_remaining == 0 {
                self.current_db = self.target_db;
                self.frames_into_step = 0;
            }
        }

        block_db
    }

    #[inline]
    pub fn current_db(&self) -> f32 {
        self.current_db
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.steps_remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_idle_ramp_holds_value() {
        let mut ramp = GainRamp::new(-12.0);
        assert!(!ramp.is_ramping());
        assert!((ramp.advance(512) - -12.0).abs() < EPSILON);
        assert!((ramp.current_db() - -12.0).abs() < EPSILON);
    }

    #[test]
    fn test_ramp_reaches_target_in_steps() {
        let mut ramp = GainRamp::new(-96.0);
        ramp.ramp_to(0.0, 1000, 10);
        assert!(ramp.is_ramping());

        // One step per 100 frames, 10 steps total
        for _ in 0..10 {
            ramp.advance(100);
        }
        assert!(!ramp.is_ramping());
        assert!((ramp.current_db() - 0.0).abs() < EPSILON);
    }

    #[test]
    fn test_large_block_consumes_multiple_steps() {
        let mut ramp = GainRamp::new(0.0);
        ramp.ramp_to(-96.0, 1000, 10);

        ramp.advance(550); // 5 full steps
        assert!(ramp.is_ramping());
        assert!((ramp.current_db() - -48.0).abs() < 0.5);

        ramp.advance(10_000); // way past the end
        assert!(!ramp.is_ramping());
        assert!((ramp.current_db() - -96.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_steps_snaps() {
        let mut ramp = GainRamp::new(-96.0);
        ramp.ramp_to(0.0, 1000, 0);
        assert!(!ramp.is_ramping());
        assert!((ramp.current_db() - 0.0).abs() < EPSILON);
    }

    #[test]
    fn test_retarget_mid_ramp() {
        let mut ramp = GainRamp::new(-96.0);
        ramp.ramp_to(0.0, 1000, 10);
        ramp.advance(500);
        let mid = ramp.current_db();
        assert!(mid > -96.0 && mid < 0.0);

        ramp.ramp_to(-96.0, 1000, 10);
        for _ in 0..10 {
            ramp.advance(100);
        }
        assert!((ramp.current_db() - -96.0).abs() < EPSILON);
    }

    #[test]
    fn test_block_gain_reported_before_stepping() {
        let mut ramp = GainRamp::new(-96.0);
        ramp.ramp_to(0.0, 100, 10);
        // First block renders at the pre-step value
        assert!((ramp.advance(10) - -96.0).abs() < EPSILON);
        assert!(ramp.advance(10) > -96.0);
    }
}
