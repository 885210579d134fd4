//! Streaming pipeline: playlist selection, decode producer, pace consumer
//! and the per-owner sessions that bind them

pub mod consumer;
pub mod context;
pub mod driver;
pub mod hooks;
pub mod manager;
pub mod playlist;
pub mod producer;
pub mod ring_buffer;
pub mod sample_queue;
pub mod session;
pub mod track_source;

#[cfg(test)]
pub(crate) mod test_support;

pub use consumer::{PaceConsumer, TickReport};
pub use context::PipelineContext;
pub use hooks::{TrackHooks, TrackObserver};
pub use manager::SessionManager;
pub use playlist::{Playlist, DIRECT_PLAY_INDEX};
pub use producer::{DecodeProducer, ProducerState, RunOutcome, Step, Suspend};
pub use session::{PlaybackSession, SessionSettings, SessionStatus, SettingsUpdate};
pub use track_source::{ByteSource, DefaultByteSource};
