//! Container header parsing
//!
//! Walks the RIFF chunk list instead of trusting fixed offsets, so WAV assets
//! written by other tools (extra chunks, odd padding) decode the same way as
//! the encoder's canonical 44-byte layout.

use crate::{MixerError, Result};

const PCM_FORMAT_TAG: u16 = 1;

/// Decoded container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Sample rate in Hz
    pub frequency: u32,
    /// Offset of the first payload byte
    pub payload_offset: usize,
    /// Payload length in samples (clamped to the bytes present)
    pub payload_len: usize,
}

impl ContainerInfo {
    /// Parse a mono 8-bit PCM RIFF/WAVE buffer
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::InvalidContainer`] if the magic numbers are
    /// wrong, a chunk is missing, or the format is not mono 8-bit PCM.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(invalid("buffer too small for RIFF header"));
        }
        if &data[0..4] != b"RIFF" {
            return Err(invalid("missing RIFF magic"));
        }
        if &data[8..12] != b"WAVE" {
            return Err(invalid("missing WAVE form type"));
        }

        let mut frequency = None;
        let mut pos = 12;
        while pos + 8 <= data.len() {
            let id = &data[pos..pos + 4];
            let size = read_le_u32(data, pos + 4) as usize;
            let body = pos + 8;

            match id {
                b"fmt " => {
                    if size < 16 || body + 16 > data.len() {
                        return Err(invalid("truncated fmt chunk"));
                    }
                    let tag = read_le_u16(data, body);
                    let channels = read_le_u16(data, body + 2);
                    let rate = read_le_u32(data, body + 4);
                    let bits = read_le_u16(data, body + 14);
                    if tag != PCM_FORMAT_TAG {
                        return Err(invalid(&format!("unsupported format tag {tag}")));
                    }
                    if channels != 1 {
                        return Err(invalid(&format!("{channels} channels, expected mono")));
                    }
                    if bits != 8 {
                        return Err(invalid(&format!("{bits}-bit samples, expected 8-bit")));
                    }
                    if rate == 0 {
                        return Err(invalid("zero sample rate"));
                    }
                    frequency = Some(rate);
                }
                b"data" => {
                    let frequency = frequency.ok_or_else(|| invalid("data chunk before fmt chunk"))?;
                    let available = data.len() - body;
                    return Ok(ContainerInfo {
                        frequency,
                        payload_offset: body,
                        payload_len: size.min(available),
                    });
                }
                _ => {}
            }

            // chunks are word aligned
            pos = body.saturating_add(size).saturating_add(size & 1);
        }

        Err(invalid("missing data chunk"))
    }
}

fn invalid(msg: &str) -> MixerError {
    MixerError::InvalidContainer(msg.to_string())
}

fn read_le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
