//! Output backends.
//!
//! The pipeline treats hardware as a black box behind [`OutputBackend`]:
//! something that can be started with a [`RenderHandle`] and will then
//! invoke it once per buffer deadline until stopped. [`CpalOutput`] is
//! the hardware implementation; [`ManualOutput`] lets tests and offline
//! hosts pump the callback themselves.

use crate::callback::RenderHandle;
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// A sink that periodically invokes the render callback.
///
/// Implementations are owned and driven by the sequencer thread; `start`
/// consumes a freshly built handle each time (a stopped backend keeps
/// nothing of the previous run).
pub trait OutputBackend: Send {
    fn start(&mut self, handle: RenderHandle) -> Result<()>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

// ---------------------------------------------------------------------
// Manual backend
// ---------------------------------------------------------------------

struct ManualShared {
    handle: Mutex<Option<RenderHandle>>,
    starts: AtomicU64,
    running: AtomicBool,
    fail_starts: AtomicU32,
}

/// Backend with no clock of its own: whoever holds the
/// [`ManualOutputController`] drives rendering. Used by tests and by
/// hosts doing offline/faster-than-realtime rendering.
pub struct ManualOutput {
    shared: Arc<ManualShared>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ManualShared {
                handle: Mutex::new(None),
                starts: AtomicU64::new(0),
                running: AtomicBool::new(false),
                fail_starts: AtomicU32::new(0),
            }),
        }
    }

    /// Controller for pumping the render callback from outside.
    pub fn controller(&self) -> ManualOutputController {
        ManualOutputController {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for ManualOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for ManualOutput {
    fn start(&mut self, handle: RenderHandle) -> Result<()> {
        if self.shared.fail_starts.load(Ordering::Acquire) > 0 {
            self.shared.fail_starts.fetch_sub(1, Ordering::AcqRel);
            return Err(crate::Error::NoOutputDevice);
        }
        *self.shared.handle.lock() = Some(handle);
        self.shared.starts.fetch_add(1, Ordering::AcqRel);
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        *self.shared.handle.lock() = None;
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

/// Drives a [`ManualOutput`] from the test or host side.
#[derive(Clone)]
pub struct ManualOutputController {
    shared: Arc<ManualShared>,
}

impl ManualOutputController {
    /// Render `frames` frames, returning the interleaved buffer, or
    /// `None` while the backend is stopped.
    pub fn render_frames(&self, frames: usize) -> Option<Vec<f32>> {
        let mut slot = self.shared.handle.lock();
        let handle = slot.as_mut()?;
        let mut output = vec![0.0; frames * handle.channels()];
        handle.render(&mut output);
        Some(output)
    }

    /// Number of successful starts since creation.
    pub fn starts(&self) -> u64 {
        self.shared.starts.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Make the next `count` start attempts fail (retry-path testing).
    pub fn fail_next_starts(&self, count: u32) {
        self.shared.fail_starts.store(count, Ordering::Release);
    }
}

// ---------------------------------------------------------------------
// CPAL backend
// ---------------------------------------------------------------------

#[cfg(feature = "cpal")]
pub use self::hw::CpalOutput;

#[cfg(feature = "cpal")]
mod hw {
    use super::*;
    use crate::Error;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    /// Wrapper to hold `cpal::Stream` in a `Send` context.
    ///
    /// # Safety
    /// `cpal::Stream` is `!Send` due to platform internals. This is safe
    /// because the stream is created, used and dropped only on the
    /// sequencer thread that owns the backend.
    struct StreamHandle(#[allow(dead_code)] cpal::Stream);

    unsafe impl Send for StreamHandle {}

    /// Hardware output via CPAL.
    pub struct CpalOutput {
        device_index: Option<usize>,
        stream: Option<StreamHandle>,
    }

    impl CpalOutput {
        /// Use the default output device.
        pub fn new() -> Self {
            Self {
                device_index: None,
                stream: None,
            }
        }

        /// Use a specific output device by enumeration index.
        pub fn with_device(index: usize) -> Self {
            Self {
                device_index: Some(index),
                stream: None,
            }
        }

        pub fn list_devices() -> Result<Vec<String>> {
            cpal::default_host()
                .output_devices()?
                .enumerate()
                .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
                .collect()
        }

        pub fn device_name(&self) -> Result<String> {
            Ok(get_device(self.device_index)?.name()?)
        }
    }

    impl Default for CpalOutput {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OutputBackend for CpalOutput {
        fn start(&mut self, handle: RenderHandle) -> Result<()> {
            let device = get_device(self.device_index)?;
            let config = device.default_output_config()?;

            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), handle)?,
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), handle)?,
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), handle)?,
                format => {
                    return Err(Error::InvalidConfig(format!(
                        "Unsupported sample format: {format:?}"
                    )));
                }
            };

            stream.play()?;
            self.stream = Some(StreamHandle(stream));
            Ok(())
        }

        fn stop(&mut self) {
            self.stream = None;
        }

        fn is_running(&self) -> bool {
            self.stream.is_some()
        }
    }

    fn get_device(index: Option<usize>) -> Result<cpal::Device> {
        let host = cpal::default_host();

        match index {
            Some(i) => {
                let devices: Vec<_> = host.output_devices()?.collect();
                let count = devices.len();
                devices.into_iter().nth(i).ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "Device index {i} out of range ({count} available)"
                    ))
                })
            }
            None => host.default_output_device().ok_or(Error::NoOutputDevice),
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut handle: RenderHandle,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let device_channels = config.channels as usize;
        let engine_channels = handle.channels();

        // Staging buffer grows on the first callback, then stays stable
        let mut staged = Vec::<f32>::new();

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let frames = data.len() / device_channels;
                    let needed = frames * engine_channels;
                    if staged.len() < needed {
                        staged.resize(needed, 0.0);
                    }

                    handle.render(&mut staged[..needed]);
                    write_output(data, device_channels, engine_channels, &staged);
                }));

                if result.is_err() {
                    output_silence(data);
                }
            },
            |_err| {},
            None,
        )?;

        Ok(stream)
    }

    /// Map engine channels onto the device layout: extra device channels
    /// stay silent, extra engine channels are dropped.
    #[inline]
    fn write_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
        data: &mut [T],
        device_channels: usize,
        engine_channels: usize,
        staged: &[f32],
    ) {
        for (i, sample) in data.iter_mut().enumerate() {
            let frame = i / device_channels;
            let ch = i % device_channels;
            let value = if ch < engine_channels {
                staged[frame * engine_channels + ch]
            } else {
                0.0
            };
            *sample = T::from_sample(value);
        }
    }

    #[inline]
    fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
        for sample in data.iter_mut() {
            *sample = T::from_sample(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfree::AtomicFloat;
    use crate::mixer::Mixer;
    use crate::registry::TrackRegistry;
    use crate::stats::RenderStats;

    fn make_handle(registry: &TrackRegistry) -> RenderHandle {
        RenderHandle::new(
            registry.snapshot_handle(),
            Mixer::new(64, 2),
            Arc::new(RenderStats::new()),
            Arc::new(AtomicFloat::new(1.0)),
        )
    }

    #[test]
    fn test_manual_start_stop() {
        let registry = TrackRegistry::new();
        let mut backend = ManualOutput::new();
        let controller = backend.controller();

        assert!(!backend.is_running());
        assert!(controller.render_frames(16).is_none());

        backend.start(make_handle(&registry)).unwrap();
        assert!(backend.is_running());
        assert_eq!(controller.starts(), 1);

        let buffer = controller.render_frames(16).unwrap();
        assert_eq!(buffer.len(), 32);

        backend.stop();
        assert!(!backend.is_running());
        assert!(controller.render_frames(16).is_none());
    }

    #[test]
    fn test_manual_start_failure_injection() {
        let registry = TrackRegistry::new();
        let mut backend = ManualOutput::new();
        let controller = backend.controller();
        controller.fail_next_starts(2);

        assert!(backend.start(make_handle(&registry)).is_err());
        assert!(backend.start(make_handle(&registry)).is_err());
        assert!(backend.start(make_handle(&registry)).is_ok());
        assert_eq!(controller.starts(), 1);
    }
}
