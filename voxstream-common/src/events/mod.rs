//! Event types for the voxstream event system
//!
//! Provides the shared `StreamEvent` definitions and the `EventBus` used to
//! fan them out to observers (SSE clients, loggers, host integrations).

mod types;

pub use types::{BroadcastChannel, OwnerId, PlaybackState, RecipientId};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stream event types
///
/// Events are broadcast via `EventBus` and can be serialized for SSE transmission.
/// They are notifications only; the synchronous lifecycle hooks in the player crate
/// are the place to rewrite a selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A playback session was created for an owner
    SessionCreated {
        owner: OwnerId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback session was torn down
    SessionRemoved {
        owner: OwnerId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track reference was resolved for the next run
    ///
    /// `index` is -1 for direct play.
    TrackSelected {
        owner: OwnerId,
        track: String,
        index: i32,
        direct_play: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track passed validation and is about to stream
    TrackLoaded {
        owner: OwnerId,
        track: String,
        index: i32,
        direct_play: bool,
        /// Total samples reported by the decoder, if known
        total_samples: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track ran to the end of its stream
    TrackFinished {
        owner: OwnerId,
        track: String,
        direct_play: bool,
        /// Playlist index the next run starts at (-1 for direct replay)
        next_index: i32,
        /// Whether another run was scheduled
        continuing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track attempt or selection failed
    TrackFailed {
        owner: OwnerId,
        track: Option<String>,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// ShouldPlay was toggled
    PlaybackStateChanged {
        owner: OwnerId,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl StreamEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::SessionCreated { .. } => "SessionCreated",
            StreamEvent::SessionRemoved { .. } => "SessionRemoved",
            StreamEvent::TrackSelected { .. } => "TrackSelected",
            StreamEvent::TrackLoaded { .. } => "TrackLoaded",
            StreamEvent::TrackFinished { .. } => "TrackFinished",
            StreamEvent::TrackFailed { .. } => "TrackFailed",
            StreamEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
        }
    }

    /// Owner the event belongs to
    pub fn owner(&self) -> OwnerId {
        match self {
            StreamEvent::SessionCreated { owner, .. }
            | StreamEvent::SessionRemoved { owner, .. }
            | StreamEvent::TrackSelected { owner, .. }
            | StreamEvent::TrackLoaded { owner, .. }
            | StreamEvent::TrackFinished { owner, .. }
            | StreamEvent::TrackFailed { owner, .. }
            | StreamEvent::PlaybackStateChanged { owner, .. } => *owner,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for stream events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use voxstream_common::events::{EventBus, OwnerId, StreamEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(StreamEvent::SessionCreated {
///     owner: OwnerId(7),
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.owner(), OwnerId(7));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StreamEvent,
    ) -> Result<usize, broadcast::error::SendError<StreamEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
