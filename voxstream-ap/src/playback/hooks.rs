//! Track lifecycle hooks
//!
//! Observers are called synchronously from the decode producer, in
//! registration order. A hook that wants to change the upcoming selection
//! returns `Some(new_value)`; later observers see the rewritten value and
//! the last override wins. Returning `None` leaves the value alone.
//!
//! Hooks run on the producer's task while it holds the session's run slot.
//! They may read the session (`status`, `playlist`, `settings`) and edit its
//! playlist or settings. They must not block, and must not call `play`,
//! `play_direct` or `close` on the same session (redirect through the
//! returned override instead).

use crate::playback::session::PlaybackSession;
use std::sync::{Arc, RwLock};

/// Receives track lifecycle callbacks
///
/// All methods default to "no override".
pub trait TrackObserver: Send + Sync {
    /// Before the requested index is resolved. May redirect to another
    /// index, or to/from the direct-play sentinel (-1).
    fn on_track_selecting(
        &self,
        _session: &PlaybackSession,
        _direct_play: bool,
        _index: i32,
    ) -> Option<i32> {
        None
    }

    /// After selection. May replace the track reference about to load.
    /// `track` is `None` for a direct play with nothing staged.
    fn on_track_selected(
        &self,
        _session: &PlaybackSession,
        _direct_play: bool,
        _index: i32,
        _track: Option<&str>,
    ) -> Option<String> {
        None
    }

    /// The track passed validation and is about to stream
    fn on_track_loaded(
        &self,
        _session: &PlaybackSession,
        _direct_play: bool,
        _index: i32,
        _track: &str,
    ) {
    }

    /// The track reached end of stream. May rewrite the index the next run
    /// starts at.
    fn on_track_finished(
        &self,
        _session: &PlaybackSession,
        _track: &str,
        _direct_play: bool,
        _next_index: i32,
    ) -> Option<i32> {
        None
    }
}

/// Ordered list of registered observers
#[derive(Default)]
pub struct TrackHooks {
    observers: RwLock<Vec<Arc<dyn TrackObserver>>>,
}

impl TrackHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn TrackObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Callbacks run on a copy of the list so an observer may register
    // another without deadlocking.
    fn snapshot(&self) -> Vec<Arc<dyn TrackObserver>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the requested index after all overrides
    pub fn track_selecting(&self, session: &PlaybackSession, direct_play: bool, index: i32) -> i32 {
        self.snapshot().iter().fold(index, |current, observer| {
            observer
                .on_track_selecting(session, direct_play, current)
                .unwrap_or(current)
        })
    }

    /// Returns the track reference after all overrides
    pub fn track_selected(
        &self,
        session: &PlaybackSession,
        direct_play: bool,
        index: i32,
        track: Option<String>,
    ) -> Option<String> {
        self.snapshot().iter().fold(track, |current, observer| {
            observer
                .on_track_selected(session, direct_play, index, current.as_deref())
                .or(current)
        })
    }

    pub fn track_loaded(&self, session: &PlaybackSession, direct_play: bool, index: i32, track: &str) {
        for observer in self.snapshot() {
            observer.on_track_loaded(session, direct_play, index, track);
        }
    }

    /// Returns `Some(index)` if any observer overrode `next_index`
    pub fn track_finished(
        &self,
        session: &PlaybackSession,
        track: &str,
        direct_play: bool,
        next_index: i32,
    ) -> Option<i32> {
        let mut overridden = None;
        for observer in self.snapshot() {
            let current = overridden.unwrap_or(next_index);
            if let Some(index) = observer.on_track_finished(session, track, direct_play, current) {
                overridden = Some(index);
            }
        }
        overridden
    }
}

impl std::fmt::Debug for TrackHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackHooks")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::test_support::test_session;

    struct Redirect(i32);

    impl TrackObserver for Redirect {
        fn on_track_selecting(&self, _: &PlaybackSession, _: bool, _: i32) -> Option<i32> {
            Some(self.0)
        }
        fn on_track_finished(&self, _: &PlaybackSession, _: &str, _: bool, next: i32) -> Option<i32> {
            Some(next + self.0)
        }
    }

    struct Rename(&'static str);

    impl TrackObserver for Rename {
        fn on_track_selected(
            &self,
            _: &PlaybackSession,
            _: bool,
            _: i32,
            track: Option<&str>,
        ) -> Option<String> {
            Some(format!("{}{}", track.unwrap_or(""), self.0))
        }
    }

    struct Passive;
    impl TrackObserver for Passive {}

    #[test]
    fn test_no_observers_leaves_values() {
        let hooks = TrackHooks::new();
        let session = test_session();
        assert_eq!(hooks.track_selecting(&session, false, 3), 3);
        assert_eq!(
            hooks.track_selected(&session, false, 0, Some("a.ogg".into())),
            Some("a.ogg".to_string())
        );
        assert_eq!(hooks.track_finished(&session, "a.ogg", false, 0), None);
    }

    #[test]
    fn test_last_override_wins() {
        let hooks = TrackHooks::new();
        hooks.register(Arc::new(Redirect(2)));
        hooks.register(Arc::new(Passive));
        hooks.register(Arc::new(Redirect(-1)));
        let session = test_session();
        assert_eq!(hooks.track_selecting(&session, false, 0), -1);
    }

    #[test]
    fn test_overrides_chain_in_registration_order() {
        let hooks = TrackHooks::new();
        hooks.register(Arc::new(Rename("-first")));
        hooks.register(Arc::new(Rename("-second")));
        let session = test_session();
        assert_eq!(
            hooks.track_selected(&session, true, -1, None),
            Some("-first-second".to_string())
        );

        let hooks = TrackHooks::new();
        hooks.register(Arc::new(Redirect(1)));
        hooks.register(Arc::new(Redirect(1)));
        assert_eq!(hooks.track_finished(&session, "a.ogg", false, 0), Some(2));
    }
}
