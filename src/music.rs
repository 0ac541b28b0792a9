//! Music Stream Adapter
//!
//! Bridges a pull-based sequencer ([`SampleProducer`]) into the primitive's
//! refill contract. The ring is a fixed array owned by the adapter, so the
//! stream has no per-buffer ownership to track.
//!
//! The refill runs on the audio device's thread while the mixer lock is held.
//! `produce_samples` must therefore be cheap and must never block; a slow
//! producer is heard as a glitch, it is not compensated for here. The refill
//! only ever `try_lock`s the producer, so a game thread holding it costs one
//! ring of silence instead of stalling the device.

use crate::primitive::{MixingPrimitive, SampleFormat, StreamDescriptor, StreamRefill};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Stereo frames produced per refill
pub const MUSIC_FRAMES: usize = 256;

/// Ring length in samples (two interleaved channels)
pub const MUSIC_BUFFER_LEN: usize = MUSIC_FRAMES * 2;

/// External music sequencer
pub trait SampleProducer: Send {
    /// Prepare to produce samples for output at `target_rate` Hz
    fn start(&mut self, target_rate: u32);

    /// Stop producing
    fn stop(&mut self);

    /// Sample rate of the produced stream in Hz
    fn frequency(&self) -> u32;

    /// Write `frames` interleaved stereo frames of signed 8-bit samples
    fn produce_samples(&mut self, buf: &mut [i8], frames: usize);
}

/// Shared handle to a producer; the mixer only keeps a [`Weak`] to it
///
/// Lock order is mixer core, then producer. The audio thread takes the
/// producer with `try_lock` while holding the core lock and plays silence
/// when it is contended, so game code may hold the producer across mixer
/// calls. A refill that finds itself holding the only strong handle keeps it
/// until the stream is stopped, so the producer is dropped on the game
/// thread. Stop the stream before dropping the last handle to keep the
/// destructor off the audio thread entirely.
pub type SharedProducer = Arc<Mutex<dyn SampleProducer>>;

/// Music stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not registered with the primitive
    Idle,
    /// Being pulled by the primitive
    Streaming,
}

/// Music stream adapter
pub struct MusicStream {
    ring: [i8; MUSIC_BUFFER_LEN],
    descriptor: Option<StreamDescriptor>,
    producer: Option<Weak<Mutex<dyn SampleProducer>>>,
    /// Last strong handle, left behind by a game thread that dropped it mid-refill
    retired: Option<SharedProducer>,
    state: StreamState,
}

impl MusicStream {
    /// Create an idle stream
    pub fn new() -> Self {
        MusicStream {
            ring: [0; MUSIC_BUFFER_LEN],
            descriptor: None,
            producer: None,
            retired: None,
            state: StreamState::Idle,
        }
    }

    /// Register the stream with the primitive and begin pulling from `producer`
    ///
    /// `frequency` is the producer's sample rate. Restarting an active
    /// stream replaces the producer; the previous one is returned so the
    /// caller can stop and drop it outside the mixer lock.
    pub fn start<P: MixingPrimitive + ?Sized>(
        &mut self,
        primitive: &mut P,
        producer: Weak<Mutex<dyn SampleProducer>>,
        frequency: u32,
        gain: f32,
    ) -> Option<SharedProducer> {
        let previous = self.detach();
        let descriptor = StreamDescriptor {
            frequency,
            channels: 2,
            length: MUSIC_BUFFER_LEN,
            format: SampleFormat::Signed8,
        };
        self.ring.fill(0);
        self.descriptor = Some(descriptor);
        self.producer = Some(producer);
        self.state = StreamState::Streaming;
        primitive.play_stream(&descriptor, gain);
        previous
    }

    /// Stop pulling; safe to call while idle
    ///
    /// Returns the detached producer, if it is still alive, so the caller
    /// can stop and drop it outside the mixer lock.
    pub fn stop<P: MixingPrimitive + ?Sized>(&mut self, primitive: &mut P) -> Option<SharedProducer> {
        primitive.stop_stream();
        self.descriptor = None;
        self.state = StreamState::Idle;
        self.detach()
    }

    fn detach(&mut self) -> Option<SharedProducer> {
        let weak = self.producer.take();
        self.retired
            .take()
            .or_else(|| weak.as_ref().and_then(Weak::upgrade))
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Descriptor registered with the primitive while streaming
    pub fn descriptor(&self) -> Option<StreamDescriptor> {
        self.descriptor
    }
}

impl Default for MusicStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MusicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicStream")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("retired", &self.retired.is_some())
            .finish_non_exhaustive()
    }
}

impl StreamRefill for MusicStream {
    fn refill(&mut self) {
        let Some(producer) = self.producer.as_ref().and_then(Weak::upgrade) else {
            // producer gone: play silence rather than stale data
            self.ring.fill(0);
            return;
        };
        match producer.try_lock() {
            Some(mut guard) => guard.produce_samples(&mut self.ring, MUSIC_FRAMES),
            // held by the game thread
            None => self.ring.fill(0),
        }
        if Arc::strong_count(&producer) == 1 {
            self.producer = None;
            self.retired = Some(producer);
        }
    }

    fn samples(&self) -> &[i8] {
        &self.ring
    }
}
