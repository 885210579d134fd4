//! Track decoding
//!
//! The pipeline only needs a pull-based PCM reader over an in-memory byte
//! buffer. `TrackDecoder` is that seam; `SymphoniaDecoder` is the production
//! implementation for Ogg/Vorbis using symphonia.
//!
//! Dropping a decoder releases the codec state and the byte buffer it owns.

use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Pull-based PCM reader over one opened track
pub trait TrackDecoder: Send {
    /// Channel count reported by the container
    fn channels(&self) -> u16;

    /// Sample rate reported by the container (Hz)
    fn sample_rate(&self) -> u32;

    /// Total interleaved samples, if the container declares it
    fn total_samples(&self) -> Option<u64>;

    /// Fill `buffer` with interleaved f32 samples.
    ///
    /// Returns the number written; 0 signals end of stream.
    fn read_samples(&mut self, buffer: &mut [f32]) -> Result<usize>;

    /// Force end of stream: the next read returns 0
    fn seek_to_end(&mut self);
}

/// Opens a decoder over a fully buffered track
pub trait DecoderFactory: Send + Sync {
    /// `extension` is a format hint without the leading dot (e.g. "ogg")
    fn open(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<Box<dyn TrackDecoder>>;
}

/// Symphonia-backed decoder factory
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn open(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<Box<dyn TrackDecoder>> {
        Ok(Box::new(SymphoniaDecoder::open(bytes, extension)?))
    }
}

/// Streaming symphonia decoder
///
/// Decodes one packet at a time into `pending` and hands samples out from
/// there, so memory stays bounded by a packet regardless of track length.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    total_samples: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    pending_pos: usize,
    finished: bool,
}

impl SymphoniaDecoder {
    /// Probe `bytes` and prepare the first audio track for decoding
    pub fn open(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self> {
        let byte_len = bytes.len();
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let total_samples = codec_params.n_frames.map(|frames| frames * channels as u64);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Opened track: {} bytes, sample_rate={}, channels={}, total_samples={:?}",
            byte_len, sample_rate, channels, total_samples
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            total_samples,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        })
    }

    /// Decode the next packet of our track into `pending`.
    ///
    /// Returns false at end of stream.
    fn decode_next_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Stream reset required, treating as end of stream");
                    return Ok(false);
                }
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let needed = decoded.capacity() * spec.channels.count();
                    let reuse = self
                        .sample_buf
                        .as_ref()
                        .is_some_and(|buf| buf.capacity() >= needed);
                    if !reuse {
                        self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        self.pending.clear();
                        self.pending.extend_from_slice(buf.samples());
                        self.pending_pos = 0;
                    }
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode error: {}", e))),
            }
        }
    }
}

impl TrackDecoder for SymphoniaDecoder {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_samples(&self) -> Option<u64> {
        self.total_samples
    }

    fn read_samples(&mut self, buffer: &mut [f32]) -> Result<usize> {
        let mut written = 0;

        while written < buffer.len() && !self.finished {
            if self.pending_pos >= self.pending.len() {
                if !self.decode_next_packet()? {
                    self.finished = true;
                    break;
                }
                continue;
            }

            let available = self.pending.len() - self.pending_pos;
            let n = available.min(buffer.len() - written);
            buffer[written..written + n]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            written += n;
        }

        Ok(written)
    }

    fn seek_to_end(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_fail_to_probe() {
        let result = SymphoniaDecoderFactory.open(vec![0u8; 64], Some("ogg"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_empty_input_fails_to_probe() {
        let result = SymphoniaDecoder::open(Vec::new(), None);
        assert!(result.is_err());
    }

    /// 40 silent Vorbis packets with 256-sample blocks: the first packet only
    /// primes the overlap, each later one yields 128 frames.
    const SILENCE_OGG: &[u8] = include_bytes!("../../tests/test_assets/silence_48k_mono.ogg");
    const SILENCE_FRAMES: usize = 39 * 128;

    fn open_silence() -> Box<dyn TrackDecoder> {
        SymphoniaDecoderFactory
            .open(SILENCE_OGG.to_vec(), Some("ogg"))
            .expect("fixture should open")
    }

    #[test]
    fn test_fixture_reports_stream_parameters() {
        let decoder = open_silence();
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.sample_rate(), 48000);
        assert_eq!(decoder.total_samples(), Some(SILENCE_FRAMES as u64));
    }

    #[test]
    fn test_reads_carry_partial_packets() {
        let mut decoder = open_silence();

        // 100 does not divide the 128-frame packets, so most reads straddle
        // a packet boundary
        let mut buffer = [1.0f32; 100];
        let mut total = 0;
        loop {
            let n = decoder.read_samples(&mut buffer).unwrap();
            if n == 0 {
                break;
            }
            assert!(buffer[..n].iter().all(|s| *s == 0.0));
            total += n;
            if total < SILENCE_FRAMES {
                assert_eq!(n, buffer.len(), "short read before end of stream");
            }
        }

        assert_eq!(total, SILENCE_FRAMES);
        assert_eq!(decoder.read_samples(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_large_read_spans_packets() {
        let mut decoder = open_silence();
        let mut buffer = vec![0.0f32; 1000];

        assert_eq!(decoder.read_samples(&mut buffer).unwrap(), 1000);

        let mut rest = vec![0.0f32; SILENCE_FRAMES];
        assert_eq!(decoder.read_samples(&mut rest).unwrap(), SILENCE_FRAMES - 1000);
    }

    #[test]
    fn test_seek_to_end_drops_buffered_samples() {
        let mut decoder = open_silence();
        let mut buffer = [0.0f32; 100];

        // Leaves 28 frames of the first audio packet pending
        assert_eq!(decoder.read_samples(&mut buffer).unwrap(), 100);

        decoder.seek_to_end();
        assert_eq!(decoder.read_samples(&mut buffer).unwrap(), 0);
        assert_eq!(decoder.read_samples(&mut buffer).unwrap(), 0);
    }
}
