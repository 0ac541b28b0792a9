//! Fixed-Point Resampling
//!
//! Point (nearest-lower) resampling driven by a 32.32 fractional accumulator.
//! Stored assets use a low fixed rate while the container and the output run
//! at other rates, so every conversion goes through [`Resampler`].

use crate::{MixerError, Result};

/// Fixed-point position with a 32-bit fractional part
///
/// The step is truncated once per conversion, so the fractional width bounds
/// the drift: with 32 bits even the largest raw asset (131070 bytes at
/// 2 kHz) stays well within one output sample of the exact length.
/// Positions must stay below 2^32 whole samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frac {
    /// Current position (integer part in the high bits)
    pub offset: u64,
    /// Increment added per output sample
    pub inc: u64,
}

impl Frac {
    /// Number of fractional bits
    pub const BITS: u32 = 32;
    const MASK: u64 = (1 << Self::BITS) - 1;

    /// Create an accumulator at position zero advancing by `inc` per step
    #[inline]
    pub const fn new(inc: u64) -> Self {
        Frac { offset: 0, inc }
    }

    /// Step size for converting `source_rate` into `target_rate`
    #[inline]
    pub const fn step(source_rate: u32, target_rate: u32) -> u64 {
        ((source_rate as u64) << Self::BITS) / target_rate as u64
    }

    /// Integer part of the position
    #[inline]
    pub fn int(&self) -> usize {
        (self.offset >> Self::BITS) as usize
    }

    /// Fractional part of the position
    #[inline]
    pub fn frac(&self) -> u32 {
        (self.offset & Self::MASK) as u32
    }

    /// Advance by one increment
    #[inline]
    pub fn advance(&mut self) {
        self.offset += self.inc;
    }

    /// Move the position back by `samples` whole samples
    #[inline]
    pub fn rewind(&mut self, samples: usize) {
        self.offset = self.offset.saturating_sub((samples as u64) << Self::BITS);
    }
}

/// Converts sample indices between two fixed rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    inc: u64,
}

impl Resampler {
    /// Create a resampler from `source_rate` to `target_rate`
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::InvalidFrequency`] if either rate is zero, or if
    /// the source rate is so low that the step rounds down to zero.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if target_rate == 0 {
            return Err(MixerError::InvalidFrequency(target_rate));
        }
        let inc = Frac::step(source_rate, target_rate);
        if inc == 0 {
            return Err(MixerError::InvalidFrequency(source_rate));
        }
        Ok(Resampler {
            source_rate,
            target_rate,
            inc,
        })
    }

    /// Source sample rate in Hz
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Target sample rate in Hz
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Fixed-point increment per output sample
    pub fn increment(&self) -> u64 {
        self.inc
    }

    /// Number of output samples produced from `source_len` input samples
    ///
    /// Equal to the number of items [`Resampler::indices`] yields.
    pub fn output_len(&self, source_len: usize) -> usize {
        let end = (source_len as u64) << Frac::BITS;
        end.div_ceil(self.inc) as usize
    }

    /// Source indices to read, one per output sample
    pub fn indices(&self, source_len: usize) -> ResampleIndices {
        ResampleIndices {
            pos: Frac::new(self.inc),
            source_len,
        }
    }
}

/// Iterator over resampled source indices
///
/// Stops as soon as the integer part reaches the source length.
#[derive(Debug, Clone)]
pub struct ResampleIndices {
    pos: Frac,
    source_len: usize,
}

impl Iterator for ResampleIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.pos.int();
        if index >= self.source_len {
            return None;
        }
        self.pos.advance();
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let end = (self.source_len as u64) << Frac::BITS;
        let remaining = end.saturating_sub(self.pos.offset).div_ceil(self.pos.inc) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ResampleIndices {}
