//! Raw mono 8-bit PCM to container conversion

use super::{SampleBuffer, CONTAINER_RATE, HEADER_LEN};
use crate::resampler::Resampler;
use crate::{MixerError, Result};

/// Canonical header; size and rate fields are placeholders patched by the encoder
const HEADER_TEMPLATE: [u8; HEADER_LEN] = [
    b'R', b'I', b'F', b'F', 0x24, 0x00, 0x00, 0x00, b'W', b'A', b'V', b'E', // RIFF$...WAVE
    b'f', b'm', b't', b' ', 0x10, 0x00, 0x00, 0x00, // fmt chunk, 16 bytes
    0x01, 0x00, 0x01, 0x00, // PCM, mono
    0x00, 0x7d, 0x00, 0x00, 0x00, 0x7d, 0x00, 0x00, // rate, byte rate
    0x01, 0x00, 0x08, 0x00, // block align 1, 8 bits
    b'd', b'a', b't', b'a', 0x00, 0x00, 0x00, 0x00, // data chunk
];

const RIFF_SIZE_OFFSET: usize = 4;
const SAMPLE_RATE_OFFSET: usize = 24;
const BYTE_RATE_OFFSET: usize = 28;
const DATA_SIZE_OFFSET: usize = 40;

/// Build a container from raw mono 8-bit samples
///
/// Point-resamples the first `length` bytes of `raw` from `source_freq` to
/// [`CONTAINER_RATE`], XOR-ing every byte with `xor_mask` (`0x80` turns signed
/// samples into the unsigned WAV convention, `0` copies them as-is).
/// `length` is clamped to the bytes actually present.
///
/// # Errors
///
/// - [`MixerError::InvalidFrequency`] if `source_freq` is zero
/// - [`MixerError::AllocationFailure`] if the buffer cannot be reserved; no
///   partially written buffer is ever returned
pub fn encode_mono8(raw: &[u8], source_freq: u32, length: usize, xor_mask: u8) -> Result<SampleBuffer> {
    let length = length.min(raw.len());
    let resampler = Resampler::new(source_freq, CONTAINER_RATE)?;

    let payload_len = resampler.output_len(length);
    let data_size = u32::try_from(payload_len)
        .ok()
        .filter(|n| n.checked_add(36).is_some())
        .ok_or_else(|| MixerError::InvalidAsset(format!("{payload_len} samples do not fit a container")))?;

    let total = HEADER_LEN + payload_len;
    let mut out = Vec::new();
    out.try_reserve_exact(total)
        .map_err(|_| MixerError::AllocationFailure(total))?;

    out.extend_from_slice(&HEADER_TEMPLATE);
    out.extend(resampler.indices(length).map(|i| raw[i] ^ xor_mask));
    debug_assert_eq!(out.len(), total);

    write_le_u32(&mut out, RIFF_SIZE_OFFSET, 36 + data_size);
    write_le_u32(&mut out, SAMPLE_RATE_OFFSET, CONTAINER_RATE);
    write_le_u32(&mut out, BYTE_RATE_OFFSET, CONTAINER_RATE);
    write_le_u32(&mut out, DATA_SIZE_OFFSET, data_size);

    Ok(SampleBuffer::from_vec(out))
}

fn write_le_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
