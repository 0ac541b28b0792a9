//! Sample Container
//!
//! Every playback request ends up as a mono 8-bit RIFF/WAVE buffer so that a
//! single decode path can feed the mixing primitive.
//!
//! Format details:
//! - Header: 44 bytes (RIFF, `fmt ` and `data` chunk headers)
//! - Payload: resampled 8-bit PCM at [`CONTAINER_RATE`]
//! - Size fields are patched after resampling

mod encode;
mod header;

pub use encode::encode_mono8;
pub use header::ContainerInfo;

/// Sample rate of every encoded container (Hz)
pub const CONTAINER_RATE: u32 = 11025;

/// Size of the canonical container header in bytes
pub const HEADER_LEN: usize = 44;

/// Exclusively owned container bytes
///
/// Not `Clone`: moving a `SampleBuffer` into a channel transfers the only
/// handle to its memory, so nothing else can still reference it.
#[derive(Debug, PartialEq, Eq)]
pub struct SampleBuffer {
    data: Box<[u8]>,
}

impl SampleBuffer {
    /// Take ownership of already-encoded container bytes
    pub fn from_vec(data: Vec<u8>) -> Self {
        SampleBuffer {
            data: data.into_boxed_slice(),
        }
    }

    /// Container bytes, header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parse the container header
    pub fn info(&self) -> crate::Result<ContainerInfo> {
        ContainerInfo::parse(&self.data)
    }

    /// Give the bytes back to the caller
    pub fn into_vec(self) -> Vec<u8> {
        self.data.into_vec()
    }
}

impl From<Vec<u8>> for SampleBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}
