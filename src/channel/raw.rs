//! Raw Sound Asset Format
//!
//! Layout of the engine's sound resources:
//! - Bytes 0-1: play length in 16-bit words (big-endian)
//! - Bytes 2-3: loop length in 16-bit words (big-endian, 0 = no loop)
//! - Bytes 4-7: unused
//! - Bytes 8..: signed 8-bit mono PCM

use crate::primitive::LoopMode;
use crate::{MixerError, Result};

/// Offset of the PCM payload in a raw asset
pub const RAW_HEADER_LEN: usize = 8;

/// Parsed view of a raw sound asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSound<'a> {
    /// Bytes to play from the start of the payload
    pub len: usize,
    /// Once, or forever when the asset has a loop length
    pub loops: LoopMode,
    /// PCM bytes after the header
    pub payload: &'a [u8],
}

impl<'a> RawSound<'a> {
    /// Parse the header of a raw asset
    ///
    /// A nonzero loop length replaces the play length and makes the sound
    /// loop forever. Lengths are reported as stored; the encoder clamps them
    /// to the payload actually present.
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::InvalidAsset`] if `data` is shorter than the
    /// 8-byte header.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < RAW_HEADER_LEN {
            return Err(MixerError::InvalidAsset(format!(
                "{} bytes is too small for the {RAW_HEADER_LEN}-byte header",
                data.len()
            )));
        }

        let play_len = u16::from_be_bytes([data[0], data[1]]) as usize * 2;
        let loop_len = u16::from_be_bytes([data[2], data[3]]) as usize * 2;

        let (len, loops) = if loop_len != 0 {
            (loop_len, LoopMode::Forever)
        } else {
            (play_len, LoopMode::Once)
        };

        Ok(RawSound {
            len,
            loops,
            payload: &data[RAW_HEADER_LEN..],
        })
    }

    /// True if the header asks for more bytes than the payload holds
    pub fn is_truncated(&self) -> bool {
        self.len > self.payload.len()
    }
}
