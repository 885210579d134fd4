//! Configuration for the voxstream-ap streaming service
//!
//! Bootstrap only: everything here is read once from a TOML file at
//! startup. Per-session settings (volume, loop, shuffle, ...) start from
//! `[defaults]` and are changed at runtime through the control API.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--bind, --tick-ms)
//! 2. Environment variables (VOXSTREAM_CONFIG, RUST_LOG)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::audio::types::{DEFAULT_BLOCK_SIZE, FRAME_SAMPLES};
use crate::error::{Error, Result};
use crate::playback::ring_buffer::DEFAULT_RING_CAPACITY;
use crate::playback::session::SessionSettings;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use voxstream_common::RecipientId;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    /// Initial settings for every new session
    pub defaults: SessionSettings,
    /// Static audience used by the UDP delivery sink
    pub recipients: Vec<RecipientConfig>,
    pub logging: LoggingConfig,
}

/// HTTP control API and tick driver
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Control API listen address
    ///
    /// Default: 127.0.0.1:5740
    pub bind_addr: SocketAddr,

    /// Fixed tick interval for the pace consumer
    ///
    /// Default: 10ms (one frame)
    pub tick_interval_ms: u64,

    /// Timeout for remote track fetches
    pub fetch_timeout_ms: u64,

    /// Local UDP address the delivery socket binds to
    pub udp_bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5740)),
            tick_interval_ms: 10,
            fetch_timeout_ms: 30_000,
            udp_bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }
}

impl ServerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Producer/consumer tuning shared by all sessions
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Samples read from the decoder per producer step; also the
    /// backpressure threshold on the sample queue
    ///
    /// Default: 11520 (one fifth of a second plus 1920 head samples)
    pub block_size: usize,

    /// Wait after a rejected track before advancing
    ///
    /// Default: 1000ms
    pub cooldown_ms: u64,

    /// Paced ring buffer capacity in samples (at least one frame)
    ///
    /// Default: 48000
    pub ring_capacity: usize,

    /// On a direct-play loop replay, report `direct_play = false` to the
    /// finished hook instead of the actual value
    pub invert_replay_direct_flag: bool,

    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cooldown_ms: 1000,
            ring_capacity: DEFAULT_RING_CAPACITY,
            invert_replay_direct_flag: false,
            event_capacity: 256,
        }
    }
}

impl StreamConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// One statically configured frame recipient
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientConfig {
    pub id: RecipientId,
    pub addr: SocketAddr,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "voxstream_ap=info".to_string(),
        }
    }
}

impl Config {
    /// Load from `path` (or built-in defaults when `None`) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = voxstream_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string and validate
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.block_size == 0 {
            return Err(Error::Config("stream.block_size must be > 0".into()));
        }
        if self.stream.ring_capacity < FRAME_SAMPLES {
            return Err(Error::Config(format!(
                "stream.ring_capacity must be at least {} samples, got {}",
                FRAME_SAMPLES, self.stream.ring_capacity
            )));
        }
        if self.stream.event_capacity == 0 {
            return Err(Error::Config("stream.event_capacity must be > 0".into()));
        }
        if self.server.tick_interval_ms == 0 {
            return Err(Error::Config("server.tick_interval_ms must be > 0".into()));
        }
        self.defaults.validate()?;

        let mut ids: Vec<RecipientId> = self.recipients.iter().map(|r| r.id).collect();
        ids.sort();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Config("duplicate recipient id".into()));
        }
        Ok(())
    }
}
