//! Identity and routing types shared by events and the streaming pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity that owns a playback session and that encoded frames are sent as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(OwnerId)
    }
}

/// Stable identifier of a frame recipient, used for allow-list filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub u32);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output routing class an encoded frame is tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastChannel {
    /// Positional audio heard around the owner
    #[default]
    Proximity,
    /// Radio transmission
    Radio,
    /// Facility-wide intercom
    Intercom,
    /// Heard by spectators only
    Spectator,
    /// Heard by everyone regardless of position
    Global,
}

impl BroadcastChannel {
    /// Wire tag used in datagram headers
    pub fn as_u8(self) -> u8 {
        match self {
            BroadcastChannel::Proximity => 1,
            BroadcastChannel::Radio => 2,
            BroadcastChannel::Intercom => 3,
            BroadcastChannel::Spectator => 4,
            BroadcastChannel::Global => 5,
        }
    }
}

impl fmt::Display for BroadcastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastChannel::Proximity => write!(f, "proximity"),
            BroadcastChannel::Radio => write!(f, "radio"),
            BroadcastChannel::Intercom => write!(f, "intercom"),
            BroadcastChannel::Spectator => write!(f, "spectator"),
            BroadcastChannel::Global => write!(f, "global"),
        }
    }
}

/// Playback state of a session as seen by observers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Samples are being paced out
    Playing,
    /// ShouldPlay is off; producer and consumer are both held
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}
