//! Audio codec seams and transport constants

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::{DecoderFactory, SymphoniaDecoder, SymphoniaDecoderFactory, TrackDecoder};
pub use encoder::{EncoderFactory, FrameEncoder, MuLawEncoder, MuLawEncoderFactory};
pub use types::{EncodedFrame, PcmFrame, FRAME_SAMPLES, SAMPLE_RATE};
