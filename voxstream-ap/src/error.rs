//! Error types for voxstream-ap
//!
//! Track-level failures (missing file, wrong container, failed fetch, bad
//! channel layout or rate) are recovered by the decode producer with a
//! skip-and-continue policy; none of them is fatal to a session.

use thiserror::Error;

/// Main error type for voxstream-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Local track path does not exist
    #[error("Track not found: {0}")]
    NotFound(String),

    /// Track does not carry a whitelisted container extension
    #[error("Unsupported format: {0} (tracks must be .ogg files)")]
    UnsupportedFormat(String),

    /// Remote endpoint answered with a non-success status
    #[error("Failed to retrieve audio: status {status}: {body}")]
    FetchFailed { status: u16, body: String },

    /// Track is not mono
    #[error("Invalid channel layout: {track} has {channels} channels, tracks must be mono")]
    InvalidChannelLayout { track: String, channels: u16 },

    /// Track is not at the transport sample rate
    #[error("Invalid sample rate: {track} is {sample_rate} Hz, tracks must be {expected} Hz")]
    InvalidSampleRate {
        track: String,
        sample_rate: u32,
        expected: u32,
    },

    /// Nothing to select: empty playlist, or direct play with no staged track
    #[error("Empty selection: {0}")]
    EmptySelection(String),

    /// Playlist index outside the current bounds
    #[error("Index {index} out of range for playlist of length {len}")]
    OutOfRange { index: i32, len: usize },

    /// Container or codec decode error
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Frame encoder error
    #[error("Audio encode error: {0}")]
    Encode(String),

    /// Ring buffer contract violation (read beyond available samples)
    #[error("Ring buffer error: {0}")]
    RingBuffer(String),

    /// Remote transport error (connection, TLS, body read)
    #[error("HTTP fetch error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// True for failures of a single track attempt (load, fetch or validation).
    ///
    /// These are followed by the cool-down and advance policy. Selection
    /// failures (`EmptySelection`, `OutOfRange`) end the run instead.
    pub fn is_track_rejection(&self) -> bool {
        !matches!(
            self,
            Error::EmptySelection(_) | Error::OutOfRange { .. } | Error::InvalidInput(_)
        )
    }
}

impl From<voxstream_common::Error> for Error {
    fn from(e: voxstream_common::Error) -> Self {
        match e {
            voxstream_common::Error::Io(io) => Error::Io(io),
            voxstream_common::Error::InvalidInput(msg) => Error::InvalidInput(msg),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using voxstream-ap Error
pub type Result<T> = std::result::Result<T, Error>;
