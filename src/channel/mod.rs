//! Channel Registry
//!
//! Fixed table of [`CHANNEL_COUNT`] playback channels. Each channel owns at
//! most one container buffer and maps to at most one voice of the mixing
//! primitive.
//!
//! A buffer leaves its channel only through [`ChannelRegistry::reclaim`],
//! and only once the primitive itself reports the voice as stopped. Released
//! buffers are handed back to the caller so they can be dropped after the
//! shared lock is released.

mod raw;

pub use raw::{RawSound, RAW_HEADER_LEN};

use crate::config::ReusePolicy;
use crate::container::SampleBuffer;
use crate::primitive::{
    BufferId, LoopMode, MixingPrimitive, SampleBank, SampleDescriptor, SampleFormat, VoiceHandle,
    VoiceState,
};
use crate::{MixerError, Result};

/// Number of fixed playback channels
pub const CHANNEL_COUNT: usize = 4;

const PITCH: f32 = 1.0;
const PAN: f32 = 0.0;

/// Channel lifecycle as seen from the game side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No buffer, no voice
    Empty,
    /// Buffer owned, voice started (the primitive may already have finished it)
    Playing,
    /// Stop requested but the primitive has not reported the voice stopped yet
    StoppedPendingFree,
}

/// Failed play request
///
/// Holds the rejected buffer and any buffer released before the failure, so
/// the caller can drop them after the shared lock is released.
#[derive(Debug)]
pub struct PlayError {
    /// Why the request failed
    pub error: MixerError,
    /// The buffer that was to be played
    pub buffer: SampleBuffer,
    /// Buffer reclaimed from the channel before the failure
    pub released: Option<SampleBuffer>,
}

impl PlayError {
    fn new(error: MixerError, buffer: SampleBuffer, released: Option<SampleBuffer>) -> Self {
        PlayError {
            error,
            buffer,
            released,
        }
    }
}

impl From<PlayError> for MixerError {
    fn from(err: PlayError) -> Self {
        err.error
    }
}

#[derive(Debug, Default)]
struct Channel {
    voice: Option<VoiceHandle>,
    buffer: Option<SampleBuffer>,
    sample: Option<SampleDescriptor>,
    stop_requested: bool,
    generation: u32,
}

impl Channel {
    fn state(&self) -> ChannelState {
        match (&self.buffer, self.stop_requested) {
            (None, _) => ChannelState::Empty,
            (Some(_), false) => ChannelState::Playing,
            (Some(_), true) => ChannelState::StoppedPendingFree,
        }
    }
}

/// Fixed table of playback channels
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: [Channel; CHANNEL_COUNT],
    reuse_policy: ReusePolicy,
}

impl ChannelRegistry {
    /// Create a registry with every channel empty
    pub fn new(reuse_policy: ReusePolicy) -> Self {
        ChannelRegistry {
            channels: Default::default(),
            reuse_policy,
        }
    }

    fn index(channel: u8) -> Result<usize> {
        let index = channel as usize;
        if index < CHANNEL_COUNT {
            Ok(index)
        } else {
            Err(MixerError::InvalidChannel(channel))
        }
    }

    /// Take ownership of `buffer` and start a voice for it
    ///
    /// The channel is reclaimed first. If it still owns a playing buffer the
    /// [`ReusePolicy`] decides: `Preempt` stops the old voice and releases its
    /// buffer, `Reject` fails with [`MixerError::ChannelBusy`].
    ///
    /// Returns the previously owned buffer if one was released. On failure
    /// the [`PlayError`] carries `buffer` and anything released, so no
    /// buffer is ever dropped inside this call.
    pub fn play_encoded<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &mut P,
        channel: u8,
        buffer: SampleBuffer,
        gain: f32,
        loops: LoopMode,
    ) -> std::result::Result<Option<SampleBuffer>, PlayError> {
        let index = match Self::index(channel) {
            Ok(index) => index,
            Err(error) => return Err(PlayError::new(error, buffer, None)),
        };
        let info = match buffer.info() {
            Ok(info) => info,
            Err(error) => return Err(PlayError::new(error, buffer, None)),
        };

        let mut released = self.reclaim_index(&*primitive, index);
        if self.channels[index].buffer.is_some() {
            match self.reuse_policy {
                ReusePolicy::Reject => {
                    log::warn!("channel {channel} is still playing, play request rejected");
                    let error = MixerError::ChannelBusy(channel);
                    return Err(PlayError::new(error, buffer, released));
                }
                ReusePolicy::Preempt => {
                    log::debug!("channel {channel} is still playing, preempting");
                    if let Some(voice) = self.channels[index].voice {
                        primitive.stop_voice(voice);
                    }
                    released = self.reclaim_index(&*primitive, index);
                    if self.channels[index].buffer.is_some() {
                        // the primitive refused to stop; never free under a live voice
                        log::warn!("channel {channel} voice did not stop, play request rejected");
                        let error = MixerError::ChannelBusy(channel);
                        return Err(PlayError::new(error, buffer, released));
                    }
                }
            }
        }

        let slot = &mut self.channels[index];
        let generation = slot.generation.wrapping_add(1);
        let sample = SampleDescriptor {
            buffer: BufferId {
                channel,
                generation,
            },
            offset: info.payload_offset,
            length: info.payload_len,
            frequency: info.frequency,
            format: SampleFormat::Unsigned8,
            loops,
        };

        let Some(voice) = primitive.play_sample(&sample, gain, PITCH, PAN) else {
            log::warn!("no free voice for channel {channel}");
            return Err(PlayError::new(MixerError::NoFreeVoice, buffer, released));
        };

        slot.generation = generation;
        slot.buffer = Some(buffer);
        slot.sample = Some(sample);
        slot.voice = Some(voice);
        slot.stop_requested = false;

        Ok(released)
    }

    /// Stop the channel's voice, then try to reclaim its buffer
    pub fn stop<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &mut P,
        channel: u8,
    ) -> Result<Option<SampleBuffer>> {
        let index = Self::index(channel)?;
        let slot = &mut self.channels[index];
        if let Some(voice) = slot.voice {
            primitive.stop_voice(voice);
            slot.stop_requested = true;
        }
        self.reclaim(&*primitive, channel)
    }

    /// Release the channel's buffer if its voice is stopped
    ///
    /// No-op while the primitive still reports the voice as playing: the
    /// primitive may be reading from the buffer.
    pub fn reclaim<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &P,
        channel: u8,
    ) -> Result<Option<SampleBuffer>> {
        let index = Self::index(channel)?;
        Ok(self.reclaim_index(primitive, index))
    }

    fn reclaim_index<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &P,
        index: usize,
    ) -> Option<SampleBuffer> {
        let slot = &mut self.channels[index];
        let voice = slot.voice?;
        if slot.buffer.is_none() || primitive.voice_state(voice) != VoiceState::Stopped {
            return None;
        }

        let buffer = slot.buffer.take();
        slot.sample = None;
        slot.voice = None;
        slot.stop_requested = false;
        buffer
    }

    /// Reclaim every channel whose voice has stopped
    pub fn reclaim_all<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &P,
    ) -> [Option<SampleBuffer>; CHANNEL_COUNT] {
        let mut released: [Option<SampleBuffer>; CHANNEL_COUNT] = Default::default();
        for (channel, out) in released.iter_mut().enumerate() {
            *out = self.reclaim(primitive, channel as u8).ok().flatten();
        }
        released
    }

    /// Apply a gain to the channel's voice, if any
    pub fn set_gain<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &mut P,
        channel: u8,
        gain: f32,
    ) -> Result<()> {
        let index = Self::index(channel)?;
        if let Some(voice) = self.channels[index].voice {
            primitive.set_voice_gain(voice, gain);
        }
        Ok(())
    }

    /// Lifecycle state of a channel
    pub fn state(&self, channel: u8) -> Result<ChannelState> {
        Ok(self.channels[Self::index(channel)?].state())
    }

    /// Voice handle of a channel
    pub fn voice(&self, channel: u8) -> Result<Option<VoiceHandle>> {
        Ok(self.channels[Self::index(channel)?].voice)
    }

    /// Descriptor of the sample playing on a channel
    pub fn sample(&self, channel: u8) -> Result<Option<SampleDescriptor>> {
        Ok(self.channels[Self::index(channel)?].sample)
    }

    /// True if every channel is empty
    pub fn is_idle(&self) -> bool {
        self.channels.iter().all(|c| c.buffer.is_none())
    }
}

impl SampleBank for ChannelRegistry {
    fn sample_data(&self, id: BufferId) -> Option<&[u8]> {
        let slot = self.channels.get(id.channel as usize)?;
        match (&slot.buffer, &slot.sample) {
            (Some(buffer), Some(sample)) if sample.buffer == id => Some(buffer.as_bytes()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{encode_mono8, CONTAINER_RATE, HEADER_LEN};
    use crate::primitive::{StreamDescriptor, StreamRefill};

    /// Primitive whose voices report PLAYING a fixed number of times
    #[derive(Default)]
    struct ScriptedPrimitive {
        next_index: u16,
        playing_polls: u32,
        no_free_voice: bool,
        polls: std::cell::Cell<u32>,
        stopped: Vec<VoiceHandle>,
        gains: Vec<(VoiceHandle, f32)>,
        started: Vec<SampleDescriptor>,
    }

    impl MixingPrimitive for ScriptedPrimitive {
        fn output_rate(&self) -> u32 {
            44100
        }

        fn play_sample(
            &mut self,
            sample: &SampleDescriptor,
            _gain: f32,
            _pitch: f32,
            _pan: f32,
        ) -> Option<VoiceHandle> {
            if self.no_free_voice {
                return None;
            }
            self.started.push(*sample);
            self.polls.set(0);
            self.next_index += 1;
            Some(VoiceHandle {
                index: self.next_index,
                generation: 1,
            })
        }

        fn stop_voice(&mut self, voice: VoiceHandle) {
            self.stopped.push(voice);
        }

        fn voice_state(&self, _voice: VoiceHandle) -> VoiceState {
            let polls = self.polls.get();
            self.polls.set(polls + 1);
            if polls < self.playing_polls {
                VoiceState::Playing
            } else {
                VoiceState::Stopped
            }
        }

        fn set_voice_gain(&mut self, voice: VoiceHandle, gain: f32) {
            self.gains.push((voice, gain));
        }

        fn play_stream(&mut self, _stream: &StreamDescriptor, _gain: f32) {}

        fn stop_stream(&mut self) {}

        fn is_streaming(&self) -> bool {
            false
        }

        fn mix_into(
            &mut self,
            _out: &mut [i16],
            _bank: &dyn SampleBank,
            _stream: Option<&mut dyn StreamRefill>,
        ) {
        }
    }

    fn encoded(len: usize) -> SampleBuffer {
        let raw: Vec<u8> = (0..len).map(|i| i as u8).collect();
        encode_mono8(&raw, CONTAINER_RATE, len, 0).unwrap()
    }

    #[test]
    fn test_play_encoded_records_descriptor() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);

        let released = reg
            .play_encoded(&mut prim, 2, encoded(50), 1.0, LoopMode::Forever)
            .unwrap();
        assert!(released.is_none());
        assert_eq!(reg.state(2).unwrap(), ChannelState::Playing);

        let sample = reg.sample(2).unwrap().unwrap();
        assert_eq!(sample.offset, HEADER_LEN);
        assert_eq!(sample.length, 50);
        assert_eq!(sample.frequency, CONTAINER_RATE);
        assert_eq!(sample.loops, LoopMode::Forever);
        assert_eq!(sample.format, SampleFormat::Unsigned8);
        assert_eq!(prim.started, vec![sample]);

        let bytes = reg.sample_data(sample.buffer).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 50);
    }

    #[test]
    fn test_reclaim_waits_for_stopped() {
        let mut prim = ScriptedPrimitive {
            playing_polls: 3,
            ..Default::default()
        };
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        reg.play_encoded(&mut prim, 0, encoded(10), 1.0, LoopMode::Once)
            .unwrap();

        // the first call is inside stop(); the voice keeps reporting PLAYING
        assert!(reg.stop(&mut prim, 0).unwrap().is_none());
        assert_eq!(reg.state(0).unwrap(), ChannelState::StoppedPendingFree);
        assert!(reg.reclaim(&prim, 0).unwrap().is_none());
        assert!(reg.reclaim(&prim, 0).unwrap().is_none());
        assert_eq!(prim.polls.get(), 3);

        // first STOPPED observation releases the buffer
        let freed = reg.reclaim(&prim, 0).unwrap();
        assert_eq!(freed.map(|b| b.len()), Some(HEADER_LEN + 10));
        assert_eq!(reg.state(0).unwrap(), ChannelState::Empty);
        assert_eq!(reg.voice(0).unwrap(), None);
        assert_eq!(reg.sample(0).unwrap(), None);

        // and only once
        assert!(reg.reclaim(&prim, 0).unwrap().is_none());
    }

    #[test]
    fn test_reclaim_property_playing_n_then_stopped() {
        for n in 0..8u32 {
            let mut prim = ScriptedPrimitive {
                playing_polls: n,
                ..Default::default()
            };
            let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
            reg.play_encoded(&mut prim, 1, encoded(4), 1.0, LoopMode::Once)
                .unwrap();

            let mut freed_at = None;
            for call in 0..(n + 3) {
                let freed = reg.reclaim(&prim, 1).unwrap();
                if freed.is_some() {
                    assert!(freed_at.is_none(), "buffer released twice");
                    freed_at = Some(call);
                }
            }
            assert_eq!(freed_at, Some(n));
        }
    }

    #[test]
    fn test_stop_on_empty_channel_is_noop() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        assert!(reg.stop(&mut prim, 3).unwrap().is_none());
        assert!(prim.stopped.is_empty());
        assert_eq!(reg.state(3).unwrap(), ChannelState::Empty);
    }

    #[test]
    fn test_reject_policy_keeps_channel() {
        let mut prim = ScriptedPrimitive {
            playing_polls: u32::MAX,
            ..Default::default()
        };
        let mut reg = ChannelRegistry::new(ReusePolicy::Reject);
        reg.play_encoded(&mut prim, 0, encoded(10), 1.0, LoopMode::Once)
            .unwrap();
        let before = reg.sample(0).unwrap();

        let err = reg
            .play_encoded(&mut prim, 0, encoded(20), 1.0, LoopMode::Once)
            .unwrap_err();
        assert!(matches!(err.error, MixerError::ChannelBusy(0)));
        // the rejected buffer goes back to the caller
        assert_eq!(err.buffer.len(), HEADER_LEN + 20);
        assert!(err.released.is_none());
        assert_eq!(reg.sample(0).unwrap(), before);
        assert_eq!(prim.started.len(), 1);
    }

    #[test]
    fn test_preempt_policy_stops_before_reuse() {
        let mut prim = ScriptedPrimitive {
            playing_polls: 1,
            ..Default::default()
        };
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        reg.play_encoded(&mut prim, 0, encoded(10), 1.0, LoopMode::Once)
            .unwrap();
        let old_voice = reg.voice(0).unwrap().unwrap();

        let released = reg
            .play_encoded(&mut prim, 0, encoded(20), 1.0, LoopMode::Once)
            .unwrap();
        assert_eq!(prim.stopped, vec![old_voice]);
        assert_eq!(released.map(|b| b.len()), Some(HEADER_LEN + 10));
        assert_eq!(reg.sample(0).unwrap().unwrap().length, 20);
        assert_ne!(reg.voice(0).unwrap(), Some(old_voice));
    }

    #[test]
    fn test_preempt_never_frees_live_voice() {
        let mut prim = ScriptedPrimitive {
            playing_polls: u32::MAX,
            ..Default::default()
        };
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        reg.play_encoded(&mut prim, 0, encoded(10), 1.0, LoopMode::Once)
            .unwrap();

        let err = reg
            .play_encoded(&mut prim, 0, encoded(20), 1.0, LoopMode::Once)
            .unwrap_err();
        assert!(matches!(err.error, MixerError::ChannelBusy(0)));
        assert_eq!(err.buffer.len(), HEADER_LEN + 20);
        assert_eq!(reg.sample(0).unwrap().unwrap().length, 10);
    }

    #[test]
    fn test_no_free_voice_hands_back_both_buffers() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        reg.play_encoded(&mut prim, 0, encoded(10), 1.0, LoopMode::Once)
            .unwrap();

        prim.no_free_voice = true;
        let err = reg
            .play_encoded(&mut prim, 0, encoded(20), 1.0, LoopMode::Once)
            .unwrap_err();
        assert!(matches!(err.error, MixerError::NoFreeVoice));
        assert_eq!(err.buffer.len(), HEADER_LEN + 20);
        assert_eq!(err.released.map(|b| b.len()), Some(HEADER_LEN + 10));
        assert_eq!(reg.state(0).unwrap(), ChannelState::Empty);
    }

    #[test]
    fn test_channel_isolation() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        for ch in 0..CHANNEL_COUNT as u8 {
            reg.play_encoded(&mut prim, ch, encoded(8 + ch as usize), 1.0, LoopMode::Once)
                .unwrap();
        }
        let snapshot: Vec<_> = (0..4).map(|ch| reg.sample(ch).unwrap()).collect();

        assert!(reg.stop(&mut prim, 1).unwrap().is_some());
        reg.set_gain(&mut prim, 2, 0.5).unwrap();

        for ch in [0u8, 2, 3] {
            assert_eq!(reg.sample(ch).unwrap(), snapshot[ch as usize]);
            assert_eq!(reg.state(ch).unwrap(), ChannelState::Playing);
        }
        assert_eq!(reg.state(1).unwrap(), ChannelState::Empty);
        assert_eq!(prim.gains.len(), 1);
        assert_eq!(Some(prim.gains[0].0), reg.voice(2).unwrap());
    }

    #[test]
    fn test_bank_rejects_stale_ids() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        reg.play_encoded(&mut prim, 0, encoded(4), 1.0, LoopMode::Once)
            .unwrap();
        let first = reg.sample(0).unwrap().unwrap().buffer;

        reg.play_encoded(&mut prim, 0, encoded(4), 1.0, LoopMode::Once)
            .unwrap();
        let second = reg.sample(0).unwrap().unwrap().buffer;

        assert_ne!(first, second);
        assert!(reg.sample_data(first).is_none());
        assert!(reg.sample_data(second).is_some());
    }

    #[test]
    fn test_invalid_channel_and_container() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        assert!(matches!(
            reg.play_encoded(&mut prim, 4, encoded(4), 1.0, LoopMode::Once),
            Err(PlayError {
                error: MixerError::InvalidChannel(4),
                ..
            })
        ));
        let err = reg
            .play_encoded(&mut prim, 0, SampleBuffer::from_vec(vec![0; 8]), 1.0, LoopMode::Once)
            .unwrap_err();
        assert!(matches!(err.error, MixerError::InvalidContainer(_)));
        assert_eq!(err.buffer.into_vec(), vec![0; 8]);
        assert!(reg.is_idle());
        assert!(prim.started.is_empty());
    }

    #[test]
    fn test_reclaim_all() {
        let mut prim = ScriptedPrimitive::default();
        let mut reg = ChannelRegistry::new(ReusePolicy::Preempt);
        reg.play_encoded(&mut prim, 0, encoded(4), 1.0, LoopMode::Once)
            .unwrap();
        reg.play_encoded(&mut prim, 3, encoded(4), 1.0, LoopMode::Once)
            .unwrap();

        let released = reg.reclaim_all(&prim);
        assert_eq!(released.iter().filter(|b| b.is_some()).count(), 2);
        assert!(reg.is_idle());
    }
}
