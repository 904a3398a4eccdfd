//! Shared helpers for integration tests.

#![allow(dead_code)]

use ostinato::prelude::*;
use ostinato::{ManualOutput, ManualOutputController};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SAMPLE_RATE: u32 = 44_100;

/// Engine with a manually pumped output backend.
pub fn manual_engine() -> (Engine, ManualOutputController) {
    manual_engine_with(EngineConfig::default())
}

pub fn manual_engine_with(config: EngineConfig) -> (Engine, ManualOutputController) {
    let backend = ManualOutput::new();
    let controller = backend.controller();
    let engine = Engine::builder()
        .config(config)
        .backend(Box::new(backend))
        .build()
        .expect("engine should build");
    (engine, controller)
}

/// Stereo source holding a constant sample value.
pub fn constant_source(value: f32, frames: u64) -> Arc<MemorySource> {
    Arc::new(MemorySource::new(
        vec![value; frames as usize * 2],
        SAMPLE_RATE,
        2,
    ))
}

/// Stereo sine source of the given length in seconds.
pub fn sine_source(freq: f32, seconds: f32) -> Arc<MemorySource> {
    let frames = (seconds * SAMPLE_RATE as f32) as usize;
    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f32 / SAMPLE_RATE as f32;
        let s = (t * freq * std::f32::consts::TAU).sin() * 0.5;
        samples.push(s);
        samples.push(s);
    }
    Arc::new(MemorySource::new(samples, SAMPLE_RATE, 2))
}

/// Pump `total_frames` through the render callback in fixed blocks,
/// returning the last rendered block.
pub fn pump(controller: &ManualOutputController, total_frames: usize, block: usize) -> Vec<f32> {
    let mut last = Vec::new();
    let mut remaining = total_frames;
    while remaining > 0 {
        let frames = remaining.min(block);
        last = controller
            .render_frames(frames)
            .expect("backend should be running");
        remaining -= frames;
    }
    last
}

/// Poll until `cond` holds; commands are applied asynchronously by the
/// sequencer, so state reads need a fence like this.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Peak absolute sample of a buffer.
pub fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}
