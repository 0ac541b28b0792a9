//! Host-driven output device

use super::{AudioOutput, FillCallback, OutputSpec};
use crate::{MixerError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct PumpState {
    spec: Option<OutputSpec>,
    callback: Option<FillCallback>,
    paused: bool,
}

/// Output device whose callback runs whenever the host asks for audio
///
/// Keep an [`OutputPump`] (from [`ManualOutput::pump`]) before handing the
/// device to the mixer; the pump can be moved to any thread.
pub struct ManualOutput {
    state: Arc<Mutex<PumpState>>,
    forced_rate: Option<u32>,
    fail_open: bool,
}

impl ManualOutput {
    /// Device that accepts the requested format as-is
    pub fn new() -> Self {
        ManualOutput {
            state: Arc::new(Mutex::new(PumpState {
                paused: true,
                ..PumpState::default()
            })),
            forced_rate: None,
            fail_open: false,
        }
    }

    /// Device that negotiates `rate` whatever is requested
    pub fn with_rate(rate: u32) -> Self {
        ManualOutput {
            forced_rate: Some(rate),
            ..Self::new()
        }
    }

    /// Device that refuses to open
    pub fn unavailable() -> Self {
        ManualOutput {
            fail_open: true,
            ..Self::new()
        }
    }

    /// Handle used to pull audio from this device
    pub fn pump(&self) -> OutputPump {
        OutputPump {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for ManualOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for ManualOutput {
    fn open(&mut self, requested: OutputSpec) -> Result<OutputSpec> {
        if self.fail_open {
            return Err(MixerError::DeviceUnavailable(
                "manual output configured as unavailable".into(),
            ));
        }
        let spec = OutputSpec {
            sample_rate: self.forced_rate.unwrap_or(requested.sample_rate),
            ..requested
        };
        self.state.lock().spec = Some(spec);
        Ok(spec)
    }

    fn start(&mut self, callback: FillCallback) -> Result<()> {
        let mut state = self.state.lock();
        if state.spec.is_none() {
            return Err(MixerError::DeviceUnavailable("device not opened".into()));
        }
        state.callback = Some(callback);
        state.paused = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.state.lock().paused = true;
    }

    fn resume(&mut self) {
        self.state.lock().paused = false;
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.callback = None;
        state.spec = None;
        state.paused = true;
    }
}

/// Pull side of a [`ManualOutput`]
#[derive(Clone)]
pub struct OutputPump {
    state: Arc<Mutex<PumpState>>,
}

impl OutputPump {
    /// Fill `out` from the callback; silence while paused or closed
    ///
    /// Returns true if the callback ran.
    pub fn render_into(&self, out: &mut [i16]) -> bool {
        let mut state = self.state.lock();
        let paused = state.paused;
        match state.callback.as_mut() {
            Some(callback) if !paused => {
                callback(out);
                true
            }
            _ => {
                out.fill(0);
                false
            }
        }
    }

    /// Render `frames` stereo frames
    pub fn render(&self, frames: usize) -> Vec<i16> {
        let channels = self.spec().map_or(2, |s| s.channels as usize);
        let mut out = vec![0; frames * channels];
        self.render_into(&mut out);
        out
    }

    /// Negotiated format, while open
    pub fn spec(&self) -> Option<OutputSpec> {
        self.state.lock().spec
    }

    /// True while the callback is registered and not paused
    pub fn is_running(&self) -> bool {
        let state = self.state.lock();
        state.callback.is_some() && !state.paused
    }
}
