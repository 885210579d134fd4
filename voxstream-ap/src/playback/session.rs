//! Per-owner playback session
//!
//! Binds a playlist, the decode producer's run slot, the pace consumer and
//! the tunable settings for one owning identity.
//!
//! # Concurrency
//!
//! The pace consumer runs from the tick driver and the decode producer runs
//! as a tokio task. They share only the sample queue, the settings and a
//! few flags. Producer steps execute while holding the run slot lock and
//! re-check their generation under it, so once `play` has bumped the
//! generation no step of the superseded run can execute. Queue pushes also
//! check the run's cancellation token under the queue lock.
//!
//! Lifecycle hooks run inside producer steps, so everything a hook may call
//! (`status`, `is_running`, the playlist and settings accessors) stays off
//! the run slot lock.

use crate::error::{Error, Result};
use crate::playback::consumer::{PaceConsumer, TickReport};
use crate::playback::context::PipelineContext;
use crate::playback::driver;
use crate::playback::playlist::{Playlist, DIRECT_PLAY_INDEX};
use crate::playback::producer::ProducerState;
use crate::playback::ring_buffer::RingBufferStats;
use crate::playback::sample_queue::SampleQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use voxstream_common::events::PlaybackState;
use voxstream_common::{BroadcastChannel, OwnerId, RecipientId, StreamEvent};

/// Tunable per-session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Output gain, 100 = unity
    pub volume: f32,

    /// Re-append each selected track to the end of the playlist
    #[serde(rename = "loop")]
    pub looping: bool,

    /// Randomize the playlist before each selection
    pub shuffle: bool,

    /// Start the next run automatically when a track finishes
    #[serde(rename = "continue")]
    pub continue_playback: bool,

    /// Pause flag; false holds both producer and consumer
    pub should_play: bool,

    /// Treat absolute http(s) URLs as remote tracks
    pub allow_remote: bool,

    /// Emit pacing diagnostics at debug level
    pub verbose_logging: bool,

    pub channel: BroadcastChannel,

    /// Allow-list of recipients; empty means everyone
    pub recipients: Vec<RecipientId>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            volume: 100.0,
            looping: false,
            shuffle: false,
            continue_playback: true,
            should_play: true,
            allow_remote: false,
            verbose_logging: false,
            channel: BroadcastChannel::default(),
            recipients: Vec::new(),
        }
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<()> {
        validate_volume(self.volume)
    }

    /// Per-sample gain factor
    pub fn gain(&self) -> f32 {
        self.volume / 100.0
    }
}

fn validate_volume(volume: f32) -> Result<()> {
    if !volume.is_finite() || volume < 0.0 {
        return Err(Error::InvalidInput(format!(
            "volume must be a finite non-negative number, got {}",
            volume
        )));
    }
    Ok(())
}

/// Partial settings change; `None` fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub volume: Option<f32>,
    #[serde(rename = "loop")]
    pub looping: Option<bool>,
    pub shuffle: Option<bool>,
    #[serde(rename = "continue")]
    pub continue_playback: Option<bool>,
    pub allow_remote: Option<bool>,
    pub verbose_logging: Option<bool>,
    pub channel: Option<BroadcastChannel>,
    pub recipients: Option<Vec<RecipientId>>,
}

/// What the current run is doing, for status reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunProgress {
    pub state: ProducerState,
    pub track: Option<String>,
    pub index: Option<i32>,
    pub direct_play: bool,
    /// Samples read from the decoder so far
    pub position: u64,
    pub total_samples: Option<u64>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub owner: OwnerId,
    pub settings: SessionSettings,
    pub playlist: Vec<String>,
    pub staged_track: Option<String>,
    pub progress: RunProgress,
    pub run_active: bool,
    pub queued_samples: usize,
    pub ring: RingBufferStats,
    pub frames_encoded: u64,
    pub frames_delivered: u64,
}

#[derive(Default)]
struct RunSlot {
    generation: u64,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// One owner's streaming pipeline
pub struct PlaybackSession {
    owner: OwnerId,
    context: Arc<PipelineContext>,
    settings: RwLock<SessionSettings>,
    playlist: Mutex<Playlist>,
    /// Track played by the direct-play sentinel (also the last selected track)
    staged_track: Mutex<Option<String>>,
    queue: SampleQueue,
    consumer: Mutex<PaceConsumer>,
    progress: RwLock<RunProgress>,
    run: Mutex<RunSlot>,
    /// Generation of the in-flight run, 0 when none
    running: AtomicU64,
    tick_notify: Notify,
    stop_requested: AtomicBool,
    /// Set once a run reaches Streaming; gates the pace consumer
    active: AtomicBool,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl PlaybackSession {
    pub fn new(
        owner: OwnerId,
        context: Arc<PipelineContext>,
        settings: SessionSettings,
    ) -> Result<Arc<Self>> {
        settings.validate()?;
        let consumer = PaceConsumer::new(context.stream.ring_capacity, context.encoders.create())?;

        Ok(Arc::new(Self {
            owner,
            context,
            settings: RwLock::new(settings),
            playlist: Mutex::new(Playlist::new()),
            staged_track: Mutex::new(None),
            queue: SampleQueue::new(),
            consumer: Mutex::new(consumer),
            progress: RwLock::new(RunProgress::default()),
            run: Mutex::new(RunSlot::default()),
            running: AtomicU64::new(0),
            tick_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn queue(&self) -> &SampleQueue {
        &self.queue
    }

    pub(crate) fn tick_notify(&self) -> &Notify {
        &self.tick_notify
    }

    pub(crate) fn emit(&self, event: StreamEvent) {
        self.context.events.emit_lossy(event);
    }

    // ========================================
    // Settings
    // ========================================

    pub fn settings(&self) -> RwLockReadGuard<'_, SessionSettings> {
        self.settings.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a partial update; returns the new settings
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<SessionSettings> {
        if let Some(volume) = update.volume {
            validate_volume(volume)?;
        }
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        if let Some(volume) = update.volume {
            settings.volume = volume;
        }
        if let Some(looping) = update.looping {
            settings.looping = looping;
        }
        if let Some(shuffle) = update.shuffle {
            settings.shuffle = shuffle;
        }
        if let Some(cont) = update.continue_playback {
            settings.continue_playback = cont;
        }
        if let Some(allow_remote) = update.allow_remote {
            settings.allow_remote = allow_remote;
        }
        if let Some(verbose) = update.verbose_logging {
            settings.verbose_logging = verbose;
        }
        if let Some(channel) = update.channel {
            settings.channel = channel;
        }
        if let Some(recipients) = update.recipients {
            settings.recipients = recipients;
        }
        Ok(settings.clone())
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.update_settings(SettingsUpdate {
            volume: Some(volume),
            ..Default::default()
        })
        .map(|_| ())
    }

    pub fn pause(&self) {
        self.set_should_play(false);
    }

    pub fn resume(&self) {
        self.set_should_play(true);
    }

    fn set_should_play(&self, should_play: bool) {
        let old = {
            let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut settings.should_play, should_play)
        };
        if old == should_play {
            return;
        }

        let as_state = |playing: bool| {
            if playing {
                PlaybackState::Playing
            } else {
                PlaybackState::Paused
            }
        };
        info!(owner = %self.owner, "Playback {}", as_state(should_play));
        self.emit(StreamEvent::PlaybackStateChanged {
            owner: self.owner,
            old_state: as_state(old),
            new_state: as_state(should_play),
            timestamp: chrono::Utc::now(),
        });
    }

    // ========================================
    // Playlist
    // ========================================

    pub fn enqueue(&self, track: impl Into<String>, position: i32) -> Result<()> {
        lock(&self.playlist).enqueue(track, position)
    }

    pub fn remove_at(&self, index: usize) -> Result<String> {
        lock(&self.playlist).remove_at(index)
    }

    pub fn clear_playlist(&self) {
        lock(&self.playlist).clear();
    }

    pub fn playlist(&self) -> Vec<String> {
        lock(&self.playlist).tracks().to_vec()
    }

    pub fn playlist_len(&self) -> usize {
        lock(&self.playlist).len()
    }

    pub(crate) fn with_playlist<R>(&self, f: impl FnOnce(&mut Playlist) -> R) -> R {
        f(&mut lock(&self.playlist))
    }

    /// Set the track the direct-play sentinel plays
    pub fn stage_track(&self, track: Option<String>) {
        *lock(&self.staged_track) = track;
    }

    pub fn staged_track(&self) -> Option<String> {
        lock(&self.staged_track).clone()
    }

    // ========================================
    // Run control
    // ========================================

    /// Cancel any in-flight run and start a new one at `index`
    /// (`DIRECT_PLAY_INDEX` plays the staged track).
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(self: &Arc<Self>, index: i32) -> Result<()> {
        if self.is_closed() {
            return Err(Error::InvalidInput(format!("session {} is closed", self.owner)));
        }

        let mut slot = lock(&self.run);
        Self::cancel_slot(&mut slot);
        slot.generation += 1;
        self.running.store(slot.generation, Ordering::SeqCst);
        let token = CancellationToken::new();
        slot.token = Some(token.clone());
        slot.handle = Some(driver::spawn_run(Arc::clone(self), slot.generation, token, index));

        debug!(owner = %self.owner, index, generation = slot.generation, "Started producer run");
        Ok(())
    }

    /// Stage `track` and play it without touching the playlist
    pub fn play_direct(self: &Arc<Self>, track: impl Into<String>) -> Result<()> {
        self.stage_track(Some(track.into()));
        self.play(DIRECT_PLAY_INDEX)
    }

    /// Ask the producer to end the current track; with `clear` the playlist
    /// is emptied first so nothing follows it
    pub fn stop_track(&self, clear: bool) {
        if clear {
            self.clear_playlist();
        }
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn clear_stop_request(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Whether a producer run is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) != 0
    }

    /// Called by the producer task on exit; a superseded run leaves the
    /// current one alone
    pub(crate) fn finish_run(&self, generation: u64) {
        let _ = self
            .running
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Run `step` only if `generation` is still the current run.
    ///
    /// Holds the run slot for the duration, so `play` cannot interleave.
    pub(crate) fn with_run<R>(&self, generation: u64, step: impl FnOnce() -> R) -> Option<R> {
        let slot = lock(&self.run);
        if slot.generation != generation || self.is_closed() {
            return None;
        }
        let result = step();
        drop(slot);
        Some(result)
    }

    fn cancel_slot(slot: &mut RunSlot) {
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    /// Tear down: cancel the producer and stop pacing
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut slot = lock(&self.run);
        Self::cancel_slot(&mut slot);
        slot.generation += 1;
        drop(slot);
        self.running.store(0, Ordering::SeqCst);
        let dropped = self.queue.clear();
        self.tick_notify.notify_waiters();
        if dropped > 0 {
            debug!(owner = %self.owner, "Dropped {} queued samples", dropped);
        }
        debug!(owner = %self.owner, "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_active(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub(crate) fn update_progress(&self, f: impl FnOnce(&mut RunProgress)) {
        f(&mut self.progress.write().unwrap_or_else(|e| e.into_inner()));
    }

    pub fn progress(&self) -> RunProgress {
        self.progress.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // ========================================
    // Pacing
    // ========================================

    /// Run the pace consumer for one tick of `dt`, then wake a producer
    /// waiting on the next tick
    pub fn tick(&self, dt: Duration) -> Result<TickReport> {
        let result = lock(&self.consumer).tick(self, dt);
        self.tick_notify.notify_waiters();
        result
    }

    pub fn status(&self) -> SessionStatus {
        let (ring, frames_encoded, frames_delivered) = {
            let consumer = lock(&self.consumer);
            let stats = consumer.stats();
            (consumer.ring_stats(), stats.frames_encoded, stats.frames_delivered)
        };
        SessionStatus {
            owner: self.owner,
            settings: self.settings().clone(),
            playlist: self.playlist(),
            staged_track: self.staged_track(),
            progress: self.progress(),
            run_active: self.is_running(),
            queued_samples: self.queue.len(),
            ring,
            frames_encoded,
            frames_delivered,
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        let slot = self.run.get_mut().unwrap_or_else(|e| e.into_inner());
        Self::cancel_slot(slot);
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("owner", &self.owner)
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::test_support::{test_context, test_session};

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.volume, 100.0);
        assert!(settings.continue_playback);
        assert!(settings.should_play);
        assert!(!settings.allow_remote);
        assert_eq!(settings.channel, BroadcastChannel::Proximity);
        assert_eq!(settings.gain(), 1.0);
    }

    #[test]
    fn test_settings_serde_names() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"loop": true, "continue": false, "volume": 50}"#).unwrap();
        assert!(settings.looping);
        assert!(!settings.continue_playback);
        assert_eq!(settings.gain(), 0.5);
    }

    #[test]
    fn test_update_rejects_negative_volume() {
        let session = test_session();
        assert!(session.set_volume(-5.0).is_err());
        assert!(session.set_volume(f32::NAN).is_err());
        assert!(session.set_volume(150.0).is_ok());
        assert_eq!(session.settings().volume, 150.0);
    }

    #[test]
    fn test_pause_resume_emits_state_change_once() {
        let context = test_context();
        let mut rx = context.events.subscribe();
        let session =
            PlaybackSession::new(OwnerId(1), Arc::new(context), SessionSettings::default()).unwrap();

        session.pause();
        session.pause();
        session.resume();

        match rx.try_recv().unwrap() {
            StreamEvent::PlaybackStateChanged { new_state, .. } => {
                assert_eq!(new_state, PlaybackState::Paused)
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            StreamEvent::PlaybackStateChanged { new_state, .. } => {
                assert_eq!(new_state, PlaybackState::Playing)
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_track_with_clear_empties_playlist() {
        let session = test_session();
        session.enqueue("a.ogg", -1).unwrap();
        session.enqueue("b.ogg", -1).unwrap();

        session.stop_track(false);
        assert_eq!(session.playlist_len(), 2);
        assert!(session.take_stop_request());
        assert!(!session.take_stop_request());

        session.stop_track(true);
        assert_eq!(session.playlist_len(), 0);
        assert!(session.take_stop_request());
    }

    #[test]
    fn test_with_run_rejects_stale_generation() {
        let session = test_session();
        assert_eq!(session.with_run(0, || 7), Some(7));
        assert_eq!(session.with_run(1, || 7), None);
        session.close();
        assert_eq!(session.with_run(1, || 7), None);
    }

    #[test]
    fn test_finish_run_ignores_superseded_generation() {
        let session = test_session();
        session.running.store(3, Ordering::SeqCst);
        session.finish_run(2);
        assert!(session.is_running());
        session.finish_run(3);
        assert!(!session.is_running());
    }

    #[test]
    fn test_close_releases_queued_samples() {
        let session = test_session();
        session.queue().push_block(&[0.5; 960]);
        session.close();
        assert!(session.queue().is_empty());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_play_on_closed_session_fails() {
        let session = test_session();
        session.close();
        assert!(session.play(0).is_err());
    }
}
