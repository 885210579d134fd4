//! Core audio constants and frame types
//!
//! The transport runs mono at 48 kHz. Everything upstream of the encoder is
//! normalized `f32` PCM in `[-1.0, 1.0]`.

/// Transport sample rate (Hz). Tracks at any other rate are rejected.
pub const SAMPLE_RATE: u32 = 48_000;

/// Transport channel count. Tracks with any other layout are rejected.
pub const CHANNELS: u16 = 1;

/// Samples released per second of wall-clock time
pub const SAMPLES_PER_SECOND: u32 = SAMPLE_RATE * CHANNELS as u32;

/// Samples per encoder frame (10 ms at 48 kHz mono)
pub const FRAME_SAMPLES: usize = 480;

/// Upper bound on the encoded size of one frame
pub const MAX_ENCODED_FRAME_BYTES: usize = 512;

/// Extra samples added to a decode block on top of one fifth of a second
pub const HEAD_SAMPLES: usize = 1920;

/// Default decode block size: 200 ms of audio plus head room
pub const DEFAULT_BLOCK_SIZE: usize = SAMPLES_PER_SECOND as usize / 5 + HEAD_SAMPLES;

/// Only container extension accepted for local tracks
pub const SUPPORTED_EXTENSION: &str = ".ogg";

/// One frame of PCM, exactly the encoder's input unit
pub type PcmFrame = [f32; FRAME_SAMPLES];

/// Encoder output for one frame
///
/// Backed by a fixed buffer so the per-tick hot path does not allocate.
#[derive(Clone)]
pub struct EncodedFrame {
    data: [u8; MAX_ENCODED_FRAME_BYTES],
    len: usize,
}

impl EncodedFrame {
    /// Empty frame
    pub fn new() -> Self {
        Self {
            data: [0u8; MAX_ENCODED_FRAME_BYTES],
            len: 0,
        }
    }

    /// Whole backing buffer, for encoders to write into
    pub fn buffer_mut(&mut self) -> &mut [u8; MAX_ENCODED_FRAME_BYTES] {
        &mut self.data
    }

    /// Set the number of valid bytes after an encode
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(MAX_ENCODED_FRAME_BYTES);
    }

    /// Encoded payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for EncodedFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedFrame").field("len", &self.len).finish()
    }
}

/// Convert a sample count to milliseconds at the transport rate
pub fn samples_to_ms(samples: u64) -> u64 {
    samples * 1000 / SAMPLES_PER_SECOND as u64
}
