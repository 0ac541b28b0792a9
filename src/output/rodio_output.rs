//! System audio output using rodio
//!
//! The device's mixer thread iterates a [`Source`] whose samples come from
//! the fill callback, one device buffer at a time.

use super::{AudioOutput, FillCallback, OutputSpec};
use crate::{MixerError, Result};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio source that pulls batches from the fill callback
struct CallbackSource {
    callback: FillCallback,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
    /// One device buffer, refilled by the callback when consumed
    buffer: Vec<i16>,
    buffer_pos: usize,
}

impl CallbackSource {
    fn new(callback: FillCallback, spec: OutputSpec, finished: Arc<AtomicBool>) -> Self {
        let len = spec.buffer_len().max(spec.channels as usize);
        CallbackSource {
            callback,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            finished,
            buffer: vec![0; len],
            buffer_pos: len, // Start by pulling a new batch
        }
    }
}

impl Source for CallbackSource {
    fn current_frame_len(&self) -> Option<usize> {
        let remaining = self.buffer.len().saturating_sub(self.buffer_pos);
        Some(if remaining == 0 {
            self.buffer.len()
        } else {
            remaining
        })
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for CallbackSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            (self.callback)(&mut self.buffer);
            self.buffer_pos = 0;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Default system output device
pub struct RodioOutput {
    stream: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
    spec: Option<OutputSpec>,
    finished: Arc<AtomicBool>,
}

impl RodioOutput {
    /// Create an unopened device
    pub fn new() -> Self {
        RodioOutput {
            stream: None,
            sink: None,
            spec: None,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Rate the default device prefers, if it can be queried
    fn device_rate() -> Option<u32> {
        let device = rodio::cpal::default_host().default_output_device()?;
        let config = device.default_output_config().ok()?;
        Some(config.sample_rate().0)
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn open(&mut self, requested: OutputSpec) -> Result<OutputSpec> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| MixerError::DeviceUnavailable(format!("failed to create audio stream: {e}")))?;

        let spec = OutputSpec {
            sample_rate: Self::device_rate().unwrap_or(requested.sample_rate),
            ..requested
        };
        self.stream = Some((stream, handle));
        self.spec = Some(spec);
        Ok(spec)
    }

    fn start(&mut self, callback: FillCallback) -> Result<()> {
        let (Some((_, handle)), Some(spec)) = (self.stream.as_ref(), self.spec) else {
            return Err(MixerError::DeviceUnavailable("device not opened".into()));
        };

        let sink = Sink::try_new(handle)
            .map_err(|e| MixerError::DeviceUnavailable(format!("failed to create audio sink: {e}")))?;
        sink.pause();

        self.finished.store(false, Ordering::Relaxed);
        sink.append(CallbackSource::new(callback, spec, Arc::clone(&self.finished)));
        self.sink = Some(sink);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn close(&mut self) {
        // ends the source so the sink drops the callback
        self.finished.store(true, Ordering::Relaxed);
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.stream = None;
        self.spec = None;
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.close();
    }
}
