//! Public Façade
//!
//! [`Mixer`] is what game logic talks to. It sequences the channel registry,
//! the container encoder and the music stream adapter, and owns the output
//! device whose callback shares [`MixerCore`] through one lock.
//!
//! Playback calls made before [`Mixer::init`] (or after [`Mixer::quit`]) are
//! accepted and ignored, so a game can run with sound disabled.

mod shared;

pub use shared::{MixerCore, Released};

use crate::channel::{ChannelState, RawSound, CHANNEL_COUNT};
use crate::config::MixerConfig;
use crate::container::{encode_mono8, SampleBuffer};
use crate::music::{SharedProducer, StreamState};
use crate::output::{AudioOutput, FillCallback, OutputSpec};
use crate::primitive::{LoopMode, MixingPrimitive};
use crate::{MixerError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Highest channel volume used by the engine
pub const MAX_VOLUME: u8 = 63;

/// Raw assets are signed; containers follow the unsigned WAV convention
const SIGNED_TO_UNSIGNED: u8 = 0x80;

/// Gain used when volume is not applied
const UNITY_GAIN: f32 = 1.0;

struct MixerImpl {
    core: Arc<Mutex<MixerCore>>,
    output: Box<dyn AudioOutput>,
    spec: OutputSpec,
}

impl MixerImpl {
    fn stop_all(&self) {
        let (released, producer) = self.core.lock().stop_all();
        drop(released);
        if let Some(producer) = producer {
            producer.lock().stop();
        }
    }
}

/// Four-channel sound effect mixer with one music stream
pub struct Mixer {
    config: MixerConfig,
    inner: Option<MixerImpl>,
}

impl Mixer {
    /// Create an uninitialized mixer
    pub fn new(config: MixerConfig) -> Self {
        Mixer {
            config,
            inner: None,
        }
    }

    /// Open the system audio device and start mixing
    ///
    /// # Errors
    ///
    /// [`MixerError::DeviceUnavailable`] if the device cannot be opened, or if
    /// the crate was built without the `streaming` feature.
    pub fn init(&mut self) -> Result<()> {
        #[cfg(feature = "streaming")]
        {
            self.init_with_output(Box::new(crate::output::RodioOutput::new()))
        }
        #[cfg(not(feature = "streaming"))]
        {
            Err(MixerError::DeviceUnavailable(
                "built without the \"streaming\" feature".into(),
            ))
        }
    }

    /// Start mixing into `output`
    ///
    /// Opens the device, builds the primitive at the negotiated rate, resets
    /// every channel, registers the fill callback and unpauses the device.
    /// On error nothing is kept and the mixer stays uninitialized.
    pub fn init_with_output(&mut self, mut output: Box<dyn AudioOutput>) -> Result<()> {
        if self.inner.is_some() {
            self.quit();
        }
        self.config.validate()?;

        let requested = OutputSpec::stereo(self.config.sample_rate, self.config.buffer_frames);
        let spec = output.open(requested)?;
        if spec.channels != 2 {
            output.close();
            return Err(MixerError::DeviceUnavailable(format!(
                "device negotiated {} channels, stereo required",
                spec.channels
            )));
        }

        let core = Arc::new(Mutex::new(MixerCore::new(
            spec.sample_rate,
            self.config.reuse_policy,
        )));
        let callback: FillCallback = {
            let core = Arc::clone(&core);
            Box::new(move |out: &mut [i16]| core.lock().mix(out))
        };
        if let Err(err) = output.start(callback) {
            output.close();
            return Err(err);
        }
        output.resume();

        log::info!(
            "mixer started: {} Hz (requested {} Hz), {} frames per buffer",
            spec.sample_rate,
            requested.sample_rate,
            spec.buffer_frames
        );
        self.inner = Some(MixerImpl { core, output, spec });
        Ok(())
    }

    /// Stop everything, release all buffers, then pause and close the device
    pub fn quit(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.stop_all();
            inner.output.pause();
            inner.output.close();
            log::info!("mixer stopped");
        }
    }

    /// True between [`Mixer::init`] and [`Mixer::quit`]
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Negotiated output format
    pub fn output_spec(&self) -> Option<OutputSpec> {
        self.inner.as_ref().map(|i| i.spec)
    }

    /// Active configuration
    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Shared core, for hosts that drive mixing themselves
    pub fn core(&self) -> Option<Arc<Mutex<MixerCore>>> {
        self.inner.as_ref().map(|i| Arc::clone(&i.core))
    }

    fn gain(&self, volume: u8) -> f32 {
        if self.config.apply_volume {
            volume.min(MAX_VOLUME) as f32 / MAX_VOLUME as f32
        } else {
            UNITY_GAIN
        }
    }

    fn check_channel(channel: u8) -> Result<()> {
        if (channel as usize) < CHANNEL_COUNT {
            Ok(())
        } else {
            Err(MixerError::InvalidChannel(channel))
        }
    }

    /// Play a raw engine sound resource on `channel`
    ///
    /// The asset is resampled into a container before the lock is taken;
    /// only the hand-off to the channel is locked.
    pub fn play_sound_raw(&mut self, channel: u8, data: &[u8], freq: u32, volume: u8) -> Result<()> {
        log::debug!("Mixer::play_sound_raw({channel}, {freq}, {volume})");
        if self.inner.is_none() {
            return Ok(());
        }
        Self::check_channel(channel)?;

        let raw = RawSound::parse(data)?;
        if raw.is_truncated() {
            log::warn!(
                "sound asset wants {} bytes but holds {}, clamping",
                raw.len,
                raw.payload.len()
            );
        }
        let buffer = encode_mono8(raw.payload, freq, raw.len, SIGNED_TO_UNSIGNED)?;
        self.play_encoded(channel, buffer, volume, raw.loops)
    }

    /// Play an already encoded container on `channel`
    pub fn play_sound_wav(
        &mut self,
        channel: u8,
        data: SampleBuffer,
        volume: u8,
        loops: LoopMode,
    ) -> Result<()> {
        log::debug!("Mixer::play_sound_wav({channel}, {volume})");
        if self.inner.is_none() {
            return Ok(());
        }
        self.play_encoded(channel, data, volume, loops)
    }

    fn play_encoded(&mut self, channel: u8, buffer: SampleBuffer, volume: u8, loops: LoopMode) -> Result<()> {
        let gain = self.gain(volume);
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        let result = inner.core.lock().play_encoded(channel, buffer, gain, loops);
        // buffers handed back (released or rejected) are dropped here, outside the lock
        match result {
            Ok(released) => {
                drop(released);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Stop `channel` and release its buffer once the voice is stopped
    pub fn stop_sound(&mut self, channel: u8) -> Result<()> {
        log::debug!("Mixer::stop_sound({channel})");
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        let result = inner.core.lock().stop(channel);
        result.map(drop)
    }

    /// Change the volume of `channel`
    ///
    /// The legacy engine never implemented this; it only has an effect with
    /// [`MixerConfig::apply_volume`] enabled.
    pub fn set_channel_volume(&mut self, channel: u8, volume: u8) -> Result<()> {
        log::debug!("Mixer::set_channel_volume({channel}, {volume})");
        Self::check_channel(channel)?;
        if !self.config.apply_volume {
            return Ok(());
        }
        let gain = self.gain(volume);
        match self.inner.as_ref() {
            Some(inner) => inner.core.lock().set_gain(channel, gain),
            None => Ok(()),
        }
    }

    /// Start the music stream pulled from `producer`
    ///
    /// The producer is started at the output rate, then registered with the
    /// primitive. The mixer only keeps a weak reference to it. A stream that
    /// is already running is stopped first.
    pub fn play_music_stream(&mut self, producer: &SharedProducer) -> Result<()> {
        log::debug!("Mixer::play_music_stream()");
        let Some(rate) = self.inner.as_ref().map(|i| i.spec.sample_rate) else {
            return Ok(());
        };
        if self.stream_state() == StreamState::Streaming {
            self.stop_music_stream();
        }

        let frequency = {
            let mut producer = producer.lock();
            producer.start(rate);
            producer.frequency()
        };
        if frequency == 0 {
            producer.lock().stop();
            return Err(MixerError::InvalidFrequency(frequency));
        }

        if let Some(inner) = self.inner.as_ref() {
            let previous = inner
                .core
                .lock()
                .start_music(Arc::downgrade(producer), frequency, self.config.music_gain);
            if let Some(previous) = previous {
                previous.lock().stop();
            }
        }
        Ok(())
    }

    /// Stop the music stream and its producer
    pub fn stop_music_stream(&mut self) {
        log::debug!("Mixer::stop_music_stream()");
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let (was_streaming, producer) = {
            let mut core = inner.core.lock();
            (core.stream_state() == StreamState::Streaming, core.stop_music())
        };
        match producer {
            Some(producer) => producer.lock().stop(),
            None if was_streaming => log::warn!("music producer was dropped while streaming"),
            None => {}
        }
    }

    /// Stop every channel and the music stream
    pub fn stop_all(&mut self) {
        log::debug!("Mixer::stop_all()");
        if let Some(inner) = self.inner.as_ref() {
            inner.stop_all();
        }
    }

    /// Release the buffers of every channel whose voice has finished
    ///
    /// Optional; a host may call it once per frame. Playing voices are
    /// never touched.
    pub fn reclaim_finished(&mut self) {
        if let Some(inner) = self.inner.as_ref() {
            let released = inner.core.lock().reclaim_all();
            drop(released);
        }
    }

    /// Lifecycle state of `channel` (`Empty` while uninitialized)
    pub fn channel_state(&self, channel: u8) -> Result<ChannelState> {
        Self::check_channel(channel)?;
        match self.inner.as_ref() {
            Some(inner) => inner.core.lock().channel_state(channel),
            None => Ok(ChannelState::Empty),
        }
    }

    /// Music stream state (`Idle` while uninitialized)
    pub fn stream_state(&self) -> StreamState {
        self.inner
            .as_ref()
            .map_or(StreamState::Idle, |i| i.core.lock().stream_state())
    }

    /// Number of voices the primitive is currently playing
    pub fn active_voices(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |i| i.core.lock().primitive().active_voices())
    }

    /// Output rate of the primitive (0 while uninitialized)
    pub fn mix_rate(&self) -> u32 {
        self.inner
            .as_ref()
            .map_or(0, |i| i.core.lock().primitive().output_rate())
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.quit();
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("config", &self.config)
            .field("spec", &self.output_spec())
            .finish()
    }
}
