//! Software voice mixer
//!
//! Sums up to [`MAX_VOICES`] sample voices and one music stream into
//! interleaved 16-bit stereo.
//!
//! Features:
//! - Per-voice gain, pitch and pan
//! - 32.32 fixed-point stepping from sample rate to output rate
//! - Looping (once, forever, counted)
//! - Music stream refilled in place when its ring is consumed

use super::{
    LoopMode, MixingPrimitive, SampleBank, SampleDescriptor, StreamDescriptor, StreamRefill,
    VoiceHandle, VoiceState, OUTPUT_CHANNELS,
};
use crate::resampler::Frac;

/// Number of voices the software mixer can play at once
pub const MAX_VOICES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Voice {
    state: VoiceState,
    generation: u32,
    sample: Option<SampleDescriptor>,
    position: Frac,
    loops_done: u32,
    gain: f32,
    pan: f32,
}

impl Voice {
    const IDLE: Voice = Voice {
        state: VoiceState::Stopped,
        generation: 0,
        sample: None,
        position: Frac { offset: 0, inc: 0 },
        loops_done: 0,
        gain: 0.0,
        pan: 0.0,
    };

    fn stop(&mut self) {
        self.state = VoiceState::Stopped;
        self.sample = None;
    }

    /// Next normalized sample, or `None` once the voice has ended
    fn next_sample(&mut self, bank: &dyn SampleBank) -> Option<f32> {
        let sample = self.sample?;
        let payload = bank
            .sample_data(sample.buffer)
            .and_then(|data| data.get(sample.offset..sample.offset.checked_add(sample.length)?));
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            self.stop();
            return None;
        };

        while self.position.int() >= payload.len() {
            let repeat = match sample.loops {
                LoopMode::Once => false,
                LoopMode::Forever => true,
                LoopMode::Times(n) => self.loops_done < n,
            };
            if !repeat {
                self.stop();
                return None;
            }
            self.loops_done = self.loops_done.saturating_add(1);
            self.position.rewind(payload.len());
        }

        let value = sample.format.decode(payload[self.position.int()]);
        self.position.advance();
        Some(value)
    }
}

#[derive(Debug, Clone, Copy)]
struct StreamVoice {
    desc: StreamDescriptor,
    gain: f32,
    position: Frac,
    primed: bool,
}

impl StreamVoice {
    fn frames(&self) -> usize {
        self.desc.length / self.desc.channels.max(1) as usize
    }

    /// Next (left, right) frame, refilling the ring when it runs dry
    fn next_frame(&mut self, refill: &mut dyn StreamRefill) -> (f32, f32) {
        let frames = self.frames();
        if !self.primed {
            refill.refill();
            self.primed = true;
        }
        while self.position.int() >= frames {
            refill.refill();
            self.position.rewind(frames);
        }

        let ring = refill.samples();
        let channels = self.desc.channels.max(1) as usize;
        let base = self.position.int() * channels;
        self.position.advance();

        let fetch = |i: usize| ring.get(i).map_or(0.0, |&s| self.desc.format.decode(s as u8));
        if channels >= 2 {
            (fetch(base), fetch(base + 1))
        } else {
            let s = fetch(base);
            (s, s)
        }
    }
}

/// Software implementation of [`MixingPrimitive`]
#[derive(Debug, Clone)]
pub struct SoftMixer {
    rate: u32,
    voices: [Voice; MAX_VOICES],
    stream: Option<StreamVoice>,
}

impl SoftMixer {
    /// Create a mixer producing output at `rate` Hz
    pub fn new(rate: u32) -> Self {
        SoftMixer {
            rate: rate.max(1),
            voices: [Voice::IDLE; MAX_VOICES],
            stream: None,
        }
    }

    /// Number of voices currently playing
    pub fn active_voices(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.state == VoiceState::Playing)
            .count()
    }

    fn step(&self, frequency: u32, pitch: f32) -> u64 {
        let inc = (frequency as f64 * pitch.max(0.0) as f64 * (1u64 << Frac::BITS) as f64)
            / self.rate as f64;
        (inc as u64).max(1)
    }

    fn voice_mut(&mut self, handle: VoiceHandle) -> Option<&mut Voice> {
        self.voices
            .get_mut(handle.index as usize)
            .filter(|v| v.generation == handle.generation)
    }
}

/// Gains for (left, right) with pan in -1.0..=1.0
#[inline]
fn pan_gains(gain: f32, pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    (gain * (1.0 - pan).min(1.0), gain * (1.0 + pan).min(1.0))
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl MixingPrimitive for SoftMixer {
    fn output_rate(&self) -> u32 {
        self.rate
    }

    fn play_sample(
        &mut self,
        sample: &SampleDescriptor,
        gain: f32,
        pitch: f32,
        pan: f32,
    ) -> Option<VoiceHandle> {
        let inc = self.step(sample.frequency, pitch);
        let (index, voice) = self
            .voices
            .iter_mut()
            .enumerate()
            .find(|(_, v)| v.state == VoiceState::Stopped)?;

        voice.generation = voice.generation.wrapping_add(1);
        voice.state = VoiceState::Playing;
        voice.sample = Some(*sample);
        voice.position = Frac::new(inc);
        voice.loops_done = 0;
        voice.gain = gain;
        voice.pan = pan;

        Some(VoiceHandle {
            index: index as u16,
            generation: voice.generation,
        })
    }

    fn stop_voice(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.voice_mut(voice) {
            v.stop();
        }
    }

    fn voice_state(&self, voice: VoiceHandle) -> VoiceState {
        self.voices
            .get(voice.index as usize)
            .filter(|v| v.generation == voice.generation)
            .map_or(VoiceState::Stopped, |v| v.state)
    }

    fn set_voice_gain(&mut self, voice: VoiceHandle, gain: f32) {
        if let Some(v) = self.voice_mut(voice) {
            v.gain = gain;
        }
    }

    fn play_stream(&mut self, stream: &StreamDescriptor, gain: f32) {
        if stream.length == 0 || stream.channels == 0 || stream.length < stream.channels as usize {
            return;
        }
        let inc = self.step(stream.frequency, 1.0);
        self.stream = Some(StreamVoice {
            desc: *stream,
            gain,
            position: Frac::new(inc),
            primed: false,
        });
    }

    fn stop_stream(&mut self) {
        self.stream = None;
    }

    fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    fn mix_into(
        &mut self,
        out: &mut [i16],
        bank: &dyn SampleBank,
        mut stream: Option<&mut dyn StreamRefill>,
    ) {
        for frame in out.chunks_exact_mut(OUTPUT_CHANNELS) {
            let mut left = 0.0f32;
            let mut right = 0.0f32;

            for voice in self.voices.iter_mut() {
                if voice.state != VoiceState::Playing {
                    continue;
                }
                if let Some(s) = voice.next_sample(bank) {
                    let (gl, gr) = pan_gains(voice.gain, voice.pan);
                    left += s * gl;
                    right += s * gr;
                }
            }

            if let (Some(sv), Some(refill)) = (self.stream.as_mut(), stream.as_deref_mut()) {
                let (l, r) = sv.next_frame(refill);
                left += l * sv.gain;
                right += r * sv.gain;
            }

            frame[0] = to_i16(left);
            frame[1] = to_i16(right);
        }

        // odd trailing sample
        if out.len() % OUTPUT_CHANNELS != 0 {
            if let Some(last) = out.last_mut() {
                *last = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{BufferId, SampleFormat};
    use std::collections::HashMap;

    struct Bank(HashMap<BufferId, Vec<u8>>);

    impl SampleBank for Bank {
        fn sample_data(&self, id: BufferId) -> Option<&[u8]> {
            self.0.get(&id).map(|v| v.as_slice())
        }
    }

    struct Ring {
        data: Vec<i8>,
        refills: usize,
        next: i8,
    }

    impl StreamRefill for Ring {
        fn refill(&mut self) {
            self.refills += 1;
            let value = self.next;
            self.data.iter_mut().for_each(|s| *s = value);
            self.next = self.next.wrapping_add(1);
        }

        fn samples(&self) -> &[i8] {
            &self.data
        }
    }

    const ID: BufferId = BufferId {
        channel: 0,
        generation: 1,
    };

    fn descriptor(length: usize, loops: LoopMode) -> SampleDescriptor {
        SampleDescriptor {
            buffer: ID,
            offset: 0,
            length,
            frequency: 44100,
            format: SampleFormat::Signed8,
            loops,
        }
    }

    fn bank(bytes: Vec<u8>) -> Bank {
        Bank(HashMap::from([(ID, bytes)]))
    }

    #[test]
    fn test_one_shot_voice_stops_at_end() {
        let mut mixer = SoftMixer::new(44100);
        let bank = bank(vec![64; 4]);
        let voice = mixer
            .play_sample(&descriptor(4, LoopMode::Once), 1.0, 1.0, 0.0)
            .unwrap();

        let mut out = [0i16; 8];
        mixer.mix_into(&mut out, &bank, None);
        assert_eq!(out, [16384; 8]);
        assert_eq!(mixer.voice_state(voice), VoiceState::Playing);

        mixer.mix_into(&mut out, &bank, None);
        assert_eq!(out, [0; 8]);
        assert_eq!(mixer.voice_state(voice), VoiceState::Stopped);
    }

    #[test]
    fn test_forever_voice_wraps() {
        let mut mixer = SoftMixer::new(44100);
        let bank = bank(vec![0, 64]);
        let voice = mixer
            .play_sample(&descriptor(2, LoopMode::Forever), 1.0, 1.0, 0.0)
            .unwrap();

        let mut out = [0i16; 16];
        mixer.mix_into(&mut out, &bank, None);
        let left: Vec<i16> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0, 16384, 0, 16384, 0, 16384, 0, 16384]);
        assert_eq!(mixer.voice_state(voice), VoiceState::Playing);
    }

    #[test]
    fn test_counted_loops() {
        let mut mixer = SoftMixer::new(44100);
        let bank = bank(vec![64]);
        let voice = mixer
            .play_sample(&descriptor(1, LoopMode::Times(2)), 1.0, 1.0, 0.0)
            .unwrap();

        let mut out = [0i16; 8];
        mixer.mix_into(&mut out, &bank, None);
        let left: Vec<i16> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![16384, 16384, 16384, 0]);
        assert_eq!(mixer.voice_state(voice), VoiceState::Stopped);
    }

    #[test]
    fn test_missing_buffer_stops_voice() {
        let mut mixer = SoftMixer::new(44100);
        let empty = Bank(HashMap::new());
        let voice = mixer
            .play_sample(&descriptor(4, LoopMode::Forever), 1.0, 1.0, 0.0)
            .unwrap();

        let mut out = [1i16; 4];
        mixer.mix_into(&mut out, &empty, None);
        assert_eq!(out, [0; 4]);
        assert_eq!(mixer.voice_state(voice), VoiceState::Stopped);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut mixer = SoftMixer::new(44100);
        let first = mixer
            .play_sample(&descriptor(4, LoopMode::Once), 1.0, 1.0, 0.0)
            .unwrap();
        mixer.stop_voice(first);

        let second = mixer
            .play_sample(&descriptor(4, LoopMode::Once), 1.0, 1.0, 0.0)
            .unwrap();
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);

        // the old handle must not reach the new voice
        assert_eq!(mixer.voice_state(first), VoiceState::Stopped);
        mixer.stop_voice(first);
        assert_eq!(mixer.voice_state(second), VoiceState::Playing);
    }

    #[test]
    fn test_voice_exhaustion() {
        let mut mixer = SoftMixer::new(44100);
        for _ in 0..MAX_VOICES {
            assert!(mixer
                .play_sample(&descriptor(4, LoopMode::Forever), 1.0, 1.0, 0.0)
                .is_some());
        }
        assert_eq!(mixer.active_voices(), MAX_VOICES);
        assert!(mixer
            .play_sample(&descriptor(4, LoopMode::Forever), 1.0, 1.0, 0.0)
            .is_none());
    }

    #[test]
    fn test_pan_and_gain() {
        let mut mixer = SoftMixer::new(44100);
        let bank = bank(vec![64; 8]);
        let voice = mixer
            .play_sample(&descriptor(8, LoopMode::Once), 0.5, 1.0, 1.0)
            .unwrap();

        let mut out = [0i16; 2];
        mixer.mix_into(&mut out, &bank, None);
        assert_eq!(out, [0, 8192]);

        mixer.set_voice_gain(voice, 1.0);
        mixer.mix_into(&mut out, &bank, None);
        assert_eq!(out, [0, 16384]);
    }

    #[test]
    fn test_mix_clamps() {
        let mut mixer = SoftMixer::new(44100);
        let bank = bank(vec![0x7F; 4]);
        for _ in 0..4 {
            mixer.play_sample(&descriptor(4, LoopMode::Once), 1.0, 1.0, 0.0);
        }
        let mut out = [0i16; 2];
        mixer.mix_into(&mut out, &bank, None);
        assert_eq!(out, [i16::MAX, i16::MAX]);
    }

    #[test]
    fn test_stream_refills_when_consumed() {
        let mut mixer = SoftMixer::new(44100);
        let mut ring = Ring {
            data: vec![0; 4],
            refills: 0,
            next: 64,
        };
        mixer.play_stream(
            &StreamDescriptor {
                frequency: 44100,
                channels: 2,
                length: 4,
                format: SampleFormat::Signed8,
            },
            1.0,
        );
        assert!(mixer.is_streaming());

        let empty = Bank(HashMap::new());
        let mut out = [0i16; 10];
        mixer.mix_into(&mut out, &empty, Some(&mut ring));

        // 2 frames per ring: refilled on frames 0, 2 and 4
        assert_eq!(ring.refills, 3);
        assert_eq!(out[0], 16384);
        assert_eq!(out[4], 65 * 256);
        assert_eq!(out[8], 66 * 256);

        mixer.stop_stream();
        assert!(!mixer.is_streaming());
        mixer.mix_into(&mut out, &empty, Some(&mut ring));
        assert_eq!(ring.refills, 3);
        assert_eq!(out, [0; 10]);
    }

    #[test]
    fn test_resampled_voice_step() {
        let mut mixer = SoftMixer::new(44100);
        let bank = bank(vec![64, 0]);
        let mut desc = descriptor(2, LoopMode::Once);
        desc.frequency = 22050;
        mixer.play_sample(&desc, 1.0, 1.0, 0.0).unwrap();

        let mut out = [0i16; 8];
        mixer.mix_into(&mut out, &bank, None);
        let left: Vec<i16> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![16384, 16384, 0, 0]);
    }
}
