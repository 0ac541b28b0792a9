//! Audio Output Devices
//!
//! An output device negotiates a format and then pulls interleaved 16-bit
//! stereo from a registered callback, on a thread and schedule of its own.
//!
//! - [`ManualOutput`]: headless device driven by the host (tests, offline
//!   rendering, engines with their own audio loop)
//! - [`RodioOutput`]: system audio device (`streaming` feature)

mod manual;
#[cfg(feature = "streaming")]
mod rodio_output;

pub use manual::{ManualOutput, OutputPump};
#[cfg(feature = "streaming")]
pub use rodio_output::RodioOutput;

use crate::Result;

/// Fill callback: write interleaved stereo `i16` samples into the slice
pub type FillCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channels
    pub channels: u16,
    /// Frames per callback
    pub buffer_frames: u32,
}

impl OutputSpec {
    /// Stereo spec at `sample_rate` with `buffer_frames` frames per callback
    pub fn stereo(sample_rate: u32, buffer_frames: u32) -> Self {
        OutputSpec {
            sample_rate,
            channels: 2,
            buffer_frames,
        }
    }

    /// Samples (all channels) per callback
    pub fn buffer_len(&self) -> usize {
        self.buffer_frames as usize * self.channels as usize
    }
}

/// Device that periodically pulls audio from a callback
pub trait AudioOutput {
    /// Open the device; returns the format actually obtained
    ///
    /// # Errors
    ///
    /// [`crate::MixerError::DeviceUnavailable`] if no device can be opened.
    fn open(&mut self, requested: OutputSpec) -> Result<OutputSpec>;

    /// Register the fill callback; the device stays paused until [`AudioOutput::resume`]
    fn start(&mut self, callback: FillCallback) -> Result<()>;

    /// Stop invoking the callback
    fn pause(&mut self);

    /// Resume invoking the callback
    fn resume(&mut self);

    /// Release the device and drop the callback
    fn close(&mut self);
}
