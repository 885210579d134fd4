//! Frame encoding
//!
//! The voice transport takes fixed 480-sample frames. `FrameEncoder` is the
//! codec seam. `MuLawEncoder` (G.711 µ-law) is the built-in codec: one byte
//! per sample, so a frame always fits the 512-byte output bound.
//!
//! Encoders are created per session through an `EncoderFactory`; no codec
//! state is shared between sessions.

use crate::audio::types::{EncodedFrame, PcmFrame, FRAME_SAMPLES, MAX_ENCODED_FRAME_BYTES};
use crate::error::Result;

/// Encodes one PCM frame into transport bytes
pub trait FrameEncoder: Send {
    /// Encode `frame` into `out`, returning the encoded length (≤ 512)
    fn encode(&mut self, frame: &PcmFrame, out: &mut EncodedFrame) -> Result<usize>;
}

/// Creates one encoder per session
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Box<dyn FrameEncoder>;
}

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32_635;

/// G.711 µ-law encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct MuLawEncoder;

impl MuLawEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode one 16-bit linear sample
    pub fn encode_sample(pcm: i16) -> u8 {
        let mut sample = pcm as i32;
        let sign = if sample < 0 {
            sample = -sample;
            0x80
        } else {
            0
        };
        sample = sample.min(MULAW_CLIP) + MULAW_BIAS;

        let mut exponent = 7;
        let mut mask = 0x4000;
        while exponent > 0 && sample & mask == 0 {
            exponent -= 1;
            mask >>= 1;
        }
        let mantissa = (sample >> (exponent + 3)) & 0x0F;

        !((sign | (exponent << 4) | mantissa) as u8)
    }
}

impl FrameEncoder for MuLawEncoder {
    fn encode(&mut self, frame: &PcmFrame, out: &mut EncodedFrame) -> Result<usize> {
        const _: () = assert!(FRAME_SAMPLES <= MAX_ENCODED_FRAME_BYTES);

        let buf = out.buffer_mut();
        for (dst, &sample) in buf.iter_mut().zip(frame.iter()) {
            let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            *dst = Self::encode_sample(pcm);
        }
        out.set_len(FRAME_SAMPLES);
        Ok(FRAME_SAMPLES)
    }
}

/// Factory producing a fresh `MuLawEncoder` per session
#[derive(Debug, Default, Clone, Copy)]
pub struct MuLawEncoderFactory;

impl EncoderFactory for MuLawEncoderFactory {
    fn create(&self) -> Box<dyn FrameEncoder> {
        Box::new(MuLawEncoder::new())
    }
}
