//! Engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Output channel count.
    pub channels: u16,

    /// Largest buffer the render callback will service. Requests beyond
    /// this produce silence and count as underruns.
    pub max_frames_per_callback: usize,

    /// Bounded attempts when starting the output unit.
    pub start_retry_attempts: u32,

    /// Delay between start attempts. Sleeps only the sequencer thread.
    pub start_retry_backoff: Duration,

    /// Discrete steps a fade ramp is divided into.
    pub fade_steps: u32,

    /// Length of the short ramp applied when resuming from pause, in frames.
    pub resume_ramp_frames: u64,

    /// Capacity of the control-plane command queue.
    pub command_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            max_frames_per_callback: 4096,
            start_retry_attempts: 5,
            start_retry_backoff: Duration::from_millis(100),
            fade_steps: 10,
            resume_ramp_frames: 1024,
            command_queue_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8_000 || self.sample_rate > 384_000 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channels must be nonzero".into()));
        }
        if self.max_frames_per_callback == 0 {
            return Err(Error::InvalidConfig(
                "max_frames_per_callback must be nonzero".into(),
            ));
        }
        if self.start_retry_attempts == 0 {
            return Err(Error::InvalidConfig(
                "start_retry_attempts must be nonzero".into(),
            ));
        }
        if self.fade_steps == 0 {
            return Err(Error::InvalidConfig("fade_steps must be nonzero".into()));
        }
        if self.command_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "command_queue_capacity must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
