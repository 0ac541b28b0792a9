//! Sound effect mixer for a retro game engine
//!
//! Plays short 8-bit PCM sound effects on four fixed channels plus one
//! continuously refilled music stream, all rendered into a single interleaved
//! 16-bit stereo buffer that is pulled by an audio device callback.
//!
//! # Features
//! - Four fixed channels, each owning at most one sample buffer at a time
//! - 32.32 fixed-point point resampling of raw assets to 11025 Hz
//! - Canonical mono 8-bit WAV container as the single playback input
//! - Music stream pulled from an external [`SampleProducer`]
//! - Buffers released only after the voice is observed stopped
//!
//! # Crate feature flags
//! - `streaming` (opt-in): real-time output through rodio ([`RodioOutput`])
//!
//! # Quick start
//! ```no_run
//! use sfx_mixer::{ManualOutput, Mixer, MixerConfig};
//!
//! let mut mixer = Mixer::new(MixerConfig::default());
//! mixer.init_with_output(Box::new(ManualOutput::new())).unwrap();
//!
//! // play-length 4 words, no loop, 8 bytes of payload
//! let mut asset = vec![0x00, 0x04, 0x00, 0x00, 0, 0, 0, 0];
//! asset.extend_from_slice(&[0, 32, 64, 32, 0, -32i8 as u8, -64i8 as u8, -32i8 as u8]);
//! mixer.play_sound_raw(0, &asset, 8000, 63).unwrap();
//!
//! mixer.stop_all();
//! mixer.quit();
//! ```

#![warn(missing_docs)]

pub mod channel; // Channel Registry
pub mod config; // Mixer Configuration
pub mod container; // Container Encoding/Decoding
pub mod mixer; // Public Façade
pub mod music; // Music Stream Adapter
pub mod output; // Audio Output Devices
pub mod primitive; // Mixing Primitive
pub mod resampler; // Fixed-Point Resampling

/// Error types for mixer operations
#[derive(thiserror::Error, Debug)]
pub enum MixerError {
    /// The container buffer could not be allocated
    #[error("Allocation failure: cannot reserve {0} bytes for sample buffer")]
    AllocationFailure(usize),

    /// Play requested on a channel that still owns a playing buffer
    #[error("Channel {0} still owns a playing sample")]
    ChannelBusy(u8),

    /// The output device could not be opened or started
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Channel index outside the fixed channel table
    #[error("Invalid channel {0} (expected 0..{max})", max = crate::channel::CHANNEL_COUNT)]
    InvalidChannel(u8),

    /// Raw sound asset is malformed
    #[error("Invalid sound asset: {0}")]
    InvalidAsset(String),

    /// Container buffer is malformed or in an unsupported format
    #[error("Invalid sample container: {0}")]
    InvalidContainer(String),

    /// Sample rate of zero (or otherwise unusable)
    #[error("Invalid frequency: {0} Hz")]
    InvalidFrequency(u32),

    /// The mixing primitive has no free voice left
    #[error("No free voice available in the mixing primitive")]
    NoFreeVoice,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for mixer operations
pub type Result<T> = std::result::Result<T, MixerError>;

// Public API exports
pub use channel::{ChannelRegistry, ChannelState, PlayError, RawSound, CHANNEL_COUNT};
pub use config::{MixerConfig, ReusePolicy, DEFAULT_MIX_RATE};
pub use container::{encode_mono8, ContainerInfo, SampleBuffer, CONTAINER_RATE};
pub use mixer::{Mixer, MixerCore, MAX_VOLUME};
pub use music::{MusicStream, SampleProducer, SharedProducer, StreamState, MUSIC_FRAMES};
#[cfg(feature = "streaming")]
pub use output::RodioOutput;
pub use output::{AudioOutput, FillCallback, ManualOutput, OutputPump, OutputSpec};
pub use primitive::{
    LoopMode, MixingPrimitive, SampleDescriptor, SampleFormat, SoftMixer, VoiceHandle, VoiceState,
};
pub use resampler::{Frac, Resampler};
