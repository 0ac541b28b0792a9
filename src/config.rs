//! Mixer Configuration

use crate::{MixerError, Result};
use serde::{Deserialize, Serialize};

/// Requested output rate (44.1 kHz); the device may negotiate another one
pub const DEFAULT_MIX_RATE: u32 = 44100;

/// Default device buffer size in frames
pub const DEFAULT_BUFFER_FRAMES: u32 = 512;

/// What `play` does when the channel still owns a playing sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Stop the previous voice, release its buffer, then start the new one
    #[default]
    Preempt,
    /// Refuse with [`MixerError::ChannelBusy`] and leave the channel untouched
    Reject,
}

/// Configuration for the mixer and its output device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Requested output sample rate in Hz
    pub sample_rate: u32,

    /// Requested device buffer size in frames
    /// Larger buffers = more latency but less chance of underrun
    pub buffer_frames: u32,

    /// Behavior when playing on a channel that is still busy
    pub reuse_policy: ReusePolicy,

    /// Map channel volume to voice gain (the legacy engine ignored volume)
    pub apply_volume: bool,

    /// Gain of the music stream
    pub music_gain: f32,
}

impl MixerConfig {
    /// Configuration optimized for low latency
    /// Buffer = 256 frames ≈ 5.8ms @ 44.1kHz
    pub fn low_latency(sample_rate: u32) -> Self {
        MixerConfig {
            sample_rate,
            buffer_frames: 256,
            ..Self::default()
        }
    }

    /// Configuration optimized for stability
    /// Buffer = 2048 frames ≈ 46ms @ 44.1kHz
    pub fn stable(sample_rate: u32) -> Self {
        MixerConfig {
            sample_rate,
            buffer_frames: 2048,
            ..Self::default()
        }
    }

    /// Device buffer latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_frames as f32 / self.sample_rate.max(1) as f32) * 1000.0
    }

    /// Check that every field is usable
    pub fn validate(&self) -> Result<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(MixerError::Config(format!(
                "sample rate {} Hz outside 8000..=192000",
                self.sample_rate
            )));
        }
        if !(16..=16384).contains(&self.buffer_frames) {
            return Err(MixerError::Config(format!(
                "buffer of {} frames outside 16..=16384",
                self.buffer_frames
            )));
        }
        if !self.music_gain.is_finite() || !(0.0..=4.0).contains(&self.music_gain) {
            return Err(MixerError::Config(format!(
                "music gain {} outside 0.0..=4.0",
                self.music_gain
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: MixerConfig =
            serde_json::from_str(json).map_err(|e| MixerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MixerError::Config(e.to_string()))
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        MixerConfig {
            sample_rate: DEFAULT_MIX_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            reuse_policy: ReusePolicy::default(),
            apply_volume: false,
            music_gain: 1.0,
        }
    }
}
