//! State shared between game logic and the device callback
//!
//! One [`MixerCore`] lives behind one `parking_lot::Mutex`. The device
//! callback takes the lock for the duration of [`MixerCore::mix`]; every
//! other method only moves handles and flips fields, so the callback's wait
//! stays bounded. Encoding happens before the lock is taken, and released
//! buffers are returned so they are dropped after it is released.

use crate::channel::{ChannelRegistry, ChannelState, PlayError, CHANNEL_COUNT};
use crate::config::ReusePolicy;
use crate::container::SampleBuffer;
use crate::music::{MusicStream, SampleProducer, SharedProducer, StreamState};
use crate::primitive::{LoopMode, MixingPrimitive, SoftMixer, StreamRefill};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Weak;

/// Buffers released by one locked operation
pub type Released = [Option<SampleBuffer>; CHANNEL_COUNT];

/// Primitive, channels and music stream under one lock
#[derive(Debug)]
pub struct MixerCore {
    primitive: SoftMixer,
    channels: ChannelRegistry,
    music: MusicStream,
}

impl MixerCore {
    /// Empty core mixing at `rate` Hz
    pub fn new(rate: u32, reuse_policy: ReusePolicy) -> Self {
        MixerCore {
            primitive: SoftMixer::new(rate),
            channels: ChannelRegistry::new(reuse_policy),
            music: MusicStream::new(),
        }
    }

    /// Render interleaved stereo into `out` (device callback)
    pub fn mix(&mut self, out: &mut [i16]) {
        let MixerCore {
            primitive,
            channels,
            music,
        } = self;
        let stream: Option<&mut dyn StreamRefill> = match music.state() {
            StreamState::Streaming => Some(music),
            StreamState::Idle => None,
        };
        primitive.mix_into(out, &*channels, stream);
    }

    /// See [`ChannelRegistry::play_encoded`]
    pub fn play_encoded(
        &mut self,
        channel: u8,
        buffer: SampleBuffer,
        gain: f32,
        loops: LoopMode,
    ) -> std::result::Result<Option<SampleBuffer>, PlayError> {
        self.channels
            .play_encoded(&mut self.primitive, channel, buffer, gain, loops)
    }

    /// See [`ChannelRegistry::stop`]
    pub fn stop(&mut self, channel: u8) -> Result<Option<SampleBuffer>> {
        self.channels.stop(&mut self.primitive, channel)
    }

    /// See [`ChannelRegistry::reclaim`]
    pub fn reclaim(&mut self, channel: u8) -> Result<Option<SampleBuffer>> {
        self.channels.reclaim(&self.primitive, channel)
    }

    /// Reclaim every finished channel
    pub fn reclaim_all(&mut self) -> Released {
        self.channels.reclaim_all(&self.primitive)
    }

    /// Change the gain of a channel's voice
    pub fn set_gain(&mut self, channel: u8, gain: f32) -> Result<()> {
        self.channels.set_gain(&mut self.primitive, channel, gain)
    }

    /// Begin pulling music from `producer`, returning any producer it replaces
    pub fn start_music(
        &mut self,
        producer: Weak<Mutex<dyn SampleProducer>>,
        frequency: u32,
        gain: f32,
    ) -> Option<SharedProducer> {
        self.music.start(&mut self.primitive, producer, frequency, gain)
    }

    /// Stop the music stream, returning the detached producer
    pub fn stop_music(&mut self) -> Option<SharedProducer> {
        self.music.stop(&mut self.primitive)
    }

    /// Stop every channel and the stream
    pub fn stop_all(&mut self) -> (Released, Option<SharedProducer>) {
        let mut released: Released = Default::default();
        for (channel, out) in released.iter_mut().enumerate() {
            *out = self.stop(channel as u8).ok().flatten();
        }
        (released, self.stop_music())
    }

    /// Lifecycle state of a channel
    pub fn channel_state(&self, channel: u8) -> Result<ChannelState> {
        self.channels.state(channel)
    }

    /// Music stream state
    pub fn stream_state(&self) -> StreamState {
        self.music.state()
    }

    /// Channel table
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Mixing primitive
    pub fn primitive(&self) -> &SoftMixer {
        &self.primitive
    }

    /// Output rate of the primitive
    pub fn output_rate(&self) -> u32 {
        self.primitive.output_rate()
    }
}
