//! # Voxstream Audio Pipeline (voxstream-ap)
//!
//! Streams queues of mono 48 kHz tracks into a real-time voice transport.
//!
//! **Purpose:** Select and decode tracks, pace decoded audio against wall
//! clock time, cut it into 480-sample frames, encode each frame and fan it
//! out to a dynamic set of recipients, with one playback session per owner.
//!
//! **Architecture:** A decode producer (explicit state machine hosted on a
//! tokio task) feeds a backpressured sample queue. A pace consumer, run by a
//! fixed-timestep tick driver, drains it into a ring buffer and emits frames.
//! Decoding uses symphonia, buffering uses ringbuf, control is an axum API.

pub mod api;
pub mod audio;
pub mod config;
pub mod delivery;
pub mod error;
pub mod playback;

pub use config::Config;
pub use error::{Error, Result};
pub use playback::{PlaybackSession, SessionManager};
