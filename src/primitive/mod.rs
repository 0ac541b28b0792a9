//! Mixing Primitive
//!
//! Interface of the voice mixer that turns active voices into interleaved
//! output, plus [`SoftMixer`], the software implementation used by the
//! façade.
//!
//! Voices never hold a pointer into sample memory. A [`SampleDescriptor`]
//! names its buffer by [`BufferId`] and the primitive resolves that id through
//! a [`SampleBank`] on every mix call. A buffer that is gone simply ends the
//! voice; it can never be read after release.

mod soft;

pub use soft::{SoftMixer, MAX_VOICES};

/// Interleaved output channel count (stereo)
pub const OUTPUT_CHANNELS: usize = 2;

/// Handle to a voice inside the mixing primitive
///
/// The generation makes a handle go stale once its voice slot is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    /// Voice slot index
    pub index: u16,
    /// Slot generation at the time the voice was started
    pub generation: u32,
}

/// Playback state of a voice as tracked by the primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Voice is producing samples
    Playing,
    /// Voice finished or was stopped (also reported for stale handles)
    Stopped,
}

/// Encoding of 8-bit sample bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Two's complement, silence at 0
    Signed8,
    /// Offset binary, silence at 0x80 (WAV convention)
    Unsigned8,
}

impl SampleFormat {
    /// Convert one byte to a normalized sample in -1.0..1.0
    #[inline]
    pub fn decode(self, byte: u8) -> f32 {
        match self {
            SampleFormat::Signed8 => (byte as i8) as f32 / 128.0,
            SampleFormat::Unsigned8 => (byte as i16 - 128) as f32 / 128.0,
        }
    }
}

/// Looping behavior of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play once (legacy loop count 0)
    #[default]
    Once,
    /// Repeat until stopped (legacy negative loop count)
    Forever,
    /// Repeat this many extra times after the first pass
    Times(u32),
}

impl LoopMode {
    /// Map the engine's signed loop count
    pub fn from_count(count: i32) -> Self {
        match count {
            0 => LoopMode::Once,
            n if n < 0 => LoopMode::Forever,
            n => LoopMode::Times(n as u32),
        }
    }
}

/// Identifies the owned buffer a voice reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    /// Owning channel
    pub channel: u8,
    /// Channel-local buffer generation
    pub generation: u32,
}

/// Everything the primitive needs to play one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDescriptor {
    /// Buffer holding the sample
    pub buffer: BufferId,
    /// Offset of the payload within the buffer (container header excluded)
    pub offset: usize,
    /// Payload length in samples
    pub length: usize,
    /// Sample rate in Hz
    pub frequency: u32,
    /// Byte encoding
    pub format: SampleFormat,
    /// Looping behavior
    pub loops: LoopMode,
}

/// Music stream parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Sample rate in Hz
    pub frequency: u32,
    /// Interleaved channels in the ring (1 or 2)
    pub channels: u16,
    /// Ring length in samples (all channels)
    pub length: usize,
    /// Byte encoding of the ring
    pub format: SampleFormat,
}

/// Resolves buffer ids to sample bytes at mix time
pub trait SampleBank {
    /// Bytes of buffer `id`, or `None` if it is no longer owned
    fn sample_data(&self, id: BufferId) -> Option<&[u8]>;
}

/// Refill side of the music stream, driven from the pull context
pub trait StreamRefill {
    /// Refill the ring; called when the previous contents are consumed
    fn refill(&mut self);

    /// Current ring contents
    fn samples(&self) -> &[i8];
}

/// Voice mixer interface
///
/// All methods are called with the shared mixer lock held, so none of them
/// may block, allocate or perform I/O.
pub trait MixingPrimitive {
    /// Output sample rate in Hz
    fn output_rate(&self) -> u32;

    /// Start a voice; `None` when every voice is busy
    fn play_sample(
        &mut self,
        sample: &SampleDescriptor,
        gain: f32,
        pitch: f32,
        pan: f32,
    ) -> Option<VoiceHandle>;

    /// Stop a voice; stale handles are ignored
    fn stop_voice(&mut self, voice: VoiceHandle);

    /// Current state of a voice
    fn voice_state(&self, voice: VoiceHandle) -> VoiceState;

    /// Change the gain of a playing voice; stale handles are ignored
    fn set_voice_gain(&mut self, voice: VoiceHandle, gain: f32);

    /// Start pulling the music stream
    fn play_stream(&mut self, stream: &StreamDescriptor, gain: f32);

    /// Stop pulling the music stream
    fn stop_stream(&mut self);

    /// True while the music stream is being pulled
    fn is_streaming(&self) -> bool;

    /// Mix every active voice into interleaved stereo `out`
    fn mix_into(
        &mut self,
        out: &mut [i16],
        bank: &dyn SampleBank,
        stream: Option<&mut dyn StreamRefill>,
    );
}
