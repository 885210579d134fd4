//! Track resolution, loading and format validation
//!
//! A track reference is a plain string. At load time it is classified as a
//! remote URL (only when the session allows remote tracks) or a local path.
//! Bytes are buffered fully in memory, handed to the decoder, and the opened
//! stream is checked against the transport format: mono, 48 kHz.
//!
//! Reading the bytes is a suspending step: the producer yields
//! `Suspend::Read` or `Suspend::Fetch`, and its host runs
//! `ByteSource::read_local` on the blocking pool or awaits
//! `ByteSource::fetch_remote`. The cheap existence and extension checks
//! run inline first.

use crate::audio::decoder::{DecoderFactory, TrackDecoder};
use crate::audio::types::{CHANNELS, SAMPLE_RATE, SUPPORTED_EXTENSION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Longest response body kept in a `FetchFailed` error
const MAX_ERROR_BODY: usize = 512;

/// Where a track reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackLocation {
    Local(PathBuf),
    Remote(String),
}

/// Classify a track reference.
///
/// Absolute http(s) URLs are remote when `allow_remote` is set; everything
/// else is treated as a local path.
pub fn classify(reference: &str, allow_remote: bool) -> TrackLocation {
    if allow_remote {
        if let Ok(url) = Url::parse(reference) {
            if matches!(url.scheme(), "http" | "https") {
                return TrackLocation::Remote(reference.to_string());
            }
        }
    }
    TrackLocation::Local(PathBuf::from(reference))
}

/// Retrieves raw track bytes
#[async_trait]
pub trait ByteSource: Send + Sync {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Read a local file fully; a missing file is `Error::NotFound`
    fn read_local(&self, path: &Path) -> Result<Vec<u8>>;

    /// Fetch a remote resource, returning the status code and body
    async fn fetch_remote(&self, url: &str) -> Result<(u16, Vec<u8>)>;
}

/// Filesystem + reqwest byte source
pub struct DefaultByteSource {
    http_client: reqwest::Client,
}

impl DefaultByteSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("voxstream/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ByteSource for DefaultByteSource {
    fn read_local(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<(u16, Vec<u8>)> {
        debug!(url = %url, "Fetching remote track");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok((status, body.to_vec()))
    }
}

/// Gate a local track before reading it: it must exist and carry the
/// `.ogg` extension, checked in that order
pub fn check_local(source: &dyn ByteSource, path: &Path) -> Result<()> {
    if !source.exists(path) {
        return Err(Error::NotFound(path.display().to_string()));
    }
    if !has_supported_extension(path) {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }
    Ok(())
}

/// Turn a completed fetch into track bytes; anything but 2xx is `FetchFailed`
pub fn accept_fetch(status: u16, body: Vec<u8>) -> Result<Vec<u8>> {
    if (200..300).contains(&status) {
        return Ok(body);
    }
    let mut text = String::from_utf8_lossy(&body).into_owned();
    if text.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    Err(Error::FetchFailed { status, body: text })
}

/// Whether `path` ends in `.ogg`.
///
/// The match ignores ASCII case, so `TRACK.OGG` is accepted too. Only the
/// suffix is checked; the decoder probe decides whether the bytes really
/// are Ogg.
fn has_supported_extension(path: &Path) -> bool {
    let wanted = SUPPORTED_EXTENSION.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

/// Format hint for the decoder, taken from the reference's extension
pub fn extension_hint(location: &TrackLocation) -> Option<String> {
    let path = match location {
        TrackLocation::Local(path) => path.clone(),
        TrackLocation::Remote(url) => Url::parse(url)
            .ok()
            .map(|u| PathBuf::from(u.path()))
            .unwrap_or_default(),
    };
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Open `bytes` and validate the stream format.
///
/// On a validation failure the decoder (and with it the byte buffer) is
/// dropped before the error is returned.
pub fn open_decode_session(
    factory: &dyn DecoderFactory,
    track: &str,
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<DecodeSession> {
    let decoder = factory.open(bytes, extension)?;

    let channels = decoder.channels();
    if channels != CHANNELS {
        drop(decoder);
        return Err(Error::InvalidChannelLayout {
            track: track.to_string(),
            channels,
        });
    }

    let sample_rate = decoder.sample_rate();
    if sample_rate != SAMPLE_RATE {
        drop(decoder);
        return Err(Error::InvalidSampleRate {
            track: track.to_string(),
            sample_rate,
            expected: SAMPLE_RATE,
        });
    }

    Ok(DecodeSession {
        track: track.to_string(),
        decoder,
        position: 0,
    })
}

/// The currently playing track's open decoder
pub struct DecodeSession {
    track: String,
    decoder: Box<dyn TrackDecoder>,
    position: u64,
}

impl DecodeSession {
    /// Samples read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn total_samples(&self) -> Option<u64> {
        self.decoder.total_samples()
    }

    /// Fill `buffer`; 0 means end of stream
    pub fn read_samples(&mut self, buffer: &mut [f32]) -> Result<usize> {
        let n = self.decoder.read_samples(buffer)?;
        self.position += n as u64;
        Ok(n)
    }

    /// Force end of stream on the next read
    pub fn seek_to_end(&mut self) {
        self.decoder.seek_to_end();
        if let Some(total) = self.decoder.total_samples() {
            self.position = self.position.max(total);
        }
    }
}

impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("track", &self.track)
            .field("position", &self.position)
            .finish()
    }
}
