//! Decode producer
//!
//! An explicit state machine that selects a track, loads and validates it,
//! then streams decoded blocks into the session's sample queue:
//!
//! ```text
//! Idle → Selecting → Loading → Validating → Streaming → Finished
//!            │           │          │
//!            └───────────┴──────────┴──────────────────→ Failed
//! ```
//!
//! `step()` never blocks. When the producer has to wait it returns
//! `Step::Suspend` naming what it waits for, and its host (see `driver`)
//! resumes it once that has happened. The suspension points are a local
//! file read, a remote fetch, the post-failure cool-down, the next tick
//! while paused, and the next tick while the queue is saturated.
//!
//! Failures are routed by `Error::is_track_rejection`: a rejected track
//! cools down and advances to the next queued track, anything else ends the
//! run.
//!
//! A run ends with `Step::Done`. `RunOutcome::Restart(index)` asks the host
//! to start the next run in place, at `index`.

use crate::error::{Error, Result};
use crate::playback::playlist::DIRECT_PLAY_INDEX;
use crate::playback::session::PlaybackSession;
use crate::playback::track_source::{
    accept_fetch, check_local, classify, extension_hint, open_decode_session, DecodeSession,
    TrackLocation,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voxstream_common::StreamEvent;

/// Producer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    #[default]
    Idle,
    Selecting,
    Loading,
    Validating,
    Streaming,
    Finished,
    Failed,
}

/// What a suspended producer is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspend {
    /// The next pace consumer tick (paused or queue saturated)
    NextTick,
    /// A fixed delay after a rejected track
    Cooldown(Duration),
    /// Completion of a local file read; deliver it with `complete_read`
    Read(PathBuf),
    /// Completion of a remote fetch; deliver it with `complete_fetch`
    Fetch(String),
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    /// Start a new run at this playlist index (or the direct-play sentinel)
    Restart(i32),
}

/// Result of one `step()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Suspend(Suspend),
    Done(RunOutcome),
}

/// Counters across all runs hosted by one producer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub runs: u64,
    pub blocks_pushed: u64,
    pub samples_pushed: u64,
    /// Suspensions because the sample queue was saturated
    pub backpressure_waits: u64,
    /// Suspensions because playback was paused
    pub pause_waits: u64,
    pub rejected_tracks: u64,
}

/// Track bytes requested from the host
enum FetchState {
    Idle,
    InFlight,
    Complete(Result<Vec<u8>>),
}

/// Decode producer for one session
pub struct DecodeProducer {
    session: Arc<PlaybackSession>,
    token: CancellationToken,
    state: ProducerState,
    requested_index: i32,
    index: i32,
    direct_play: bool,
    track: Option<String>,
    location: Option<TrackLocation>,
    fetch: FetchState,
    bytes: Option<Vec<u8>>,
    decode: Option<DecodeSession>,
    block: Vec<f32>,
    /// Samples of `block` read but not yet pushed (0 = none pending)
    block_len: usize,
    cooling_down: bool,
    outcome: Option<RunOutcome>,
    stats: ProducerStats,
}

impl DecodeProducer {
    pub fn new(session: Arc<PlaybackSession>, index: i32, token: CancellationToken) -> Self {
        Self {
            session,
            token,
            state: ProducerState::Idle,
            requested_index: index,
            index,
            direct_play: index == DIRECT_PLAY_INDEX,
            track: None,
            location: None,
            fetch: FetchState::Idle,
            bytes: None,
            decode: None,
            block: Vec::new(),
            block_len: 0,
            cooling_down: false,
            outcome: None,
            stats: ProducerStats {
                runs: 1,
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    /// Track of the current run, once selected
    pub fn track(&self) -> Option<&str> {
        self.track.as_deref()
    }

    pub fn is_direct_play(&self) -> bool {
        self.direct_play
    }

    /// Reset for a new run at `index`, keeping the counters
    pub fn restart(&mut self, index: i32) {
        self.release();
        self.state = ProducerState::Idle;
        self.requested_index = index;
        self.index = index;
        self.direct_play = index == DIRECT_PLAY_INDEX;
        self.track = None;
        self.location = None;
        self.cooling_down = false;
        self.outcome = None;
        self.stats.runs += 1;
        self.session.update_progress(|p| p.state = ProducerState::Idle);
    }

    /// Deliver the result of the fetch requested by `Suspend::Fetch`
    pub fn complete_fetch(&mut self, result: Result<(u16, Vec<u8>)>) {
        self.fetch =
            FetchState::Complete(result.and_then(|(status, body)| accept_fetch(status, body)));
    }

    /// Deliver the result of the read requested by `Suspend::Read`
    pub fn complete_read(&mut self, result: Result<Vec<u8>>) {
        self.fetch = FetchState::Complete(result);
    }

    /// Advance the state machine by one transition
    pub fn step(&mut self) -> Step {
        if self.token.is_cancelled() || self.session.is_closed() {
            self.release();
            return Step::Done(RunOutcome::Stopped);
        }
        if let Some(outcome) = self.outcome {
            return Step::Done(outcome);
        }

        let step = match self.state {
            ProducerState::Idle => {
                self.enter(ProducerState::Selecting);
                Step::Continue
            }
            ProducerState::Selecting => self.select(),
            ProducerState::Loading => self.load(),
            ProducerState::Validating => self.validate(),
            ProducerState::Streaming => self.stream(),
            ProducerState::Finished => self.finish(),
            ProducerState::Failed => self.after_failure(),
        };

        if let Step::Done(outcome) = step {
            self.outcome = Some(outcome);
        }
        step
    }

    fn enter(&mut self, state: ProducerState) {
        debug!(owner = %self.session.owner(), "Producer {:?} -> {:?}", self.state, state);
        self.state = state;
        self.session.update_progress(|p| p.state = state);
    }

    /// Drop decoder and buffered bytes
    fn release(&mut self) {
        self.decode = None;
        self.bytes = None;
        self.fetch = FetchState::Idle;
        self.block_len = 0;
    }

    fn select(&mut self) -> Step {
        let session = Arc::clone(&self.session);
        let hooks = Arc::clone(&session.context().hooks);
        session.clear_stop_request();

        let requested = self.requested_index;
        let index = hooks.track_selecting(&session, requested == DIRECT_PLAY_INDEX, requested);
        let direct_play = index == DIRECT_PLAY_INDEX;

        let selected = if direct_play {
            Ok(session.staged_track())
        } else {
            let (shuffle, looping) = {
                let settings = session.settings();
                (settings.shuffle, settings.looping)
            };
            session
                .with_playlist(|p| p.select(index, shuffle, looping, &mut rand::thread_rng()))
                .map(Some)
        };

        let candidate = match selected {
            Ok(candidate) => candidate,
            Err(e) => return self.fail(e),
        };

        self.index = index;
        self.direct_play = direct_play;

        let Some(track) = hooks.track_selected(&session, direct_play, index, candidate) else {
            return self.fail(Error::EmptySelection(
                "direct play requested with no staged track".to_string(),
            ));
        };

        info!(owner = %session.owner(), index, direct_play, "Selected track {}", track);

        session.stage_track(Some(track.clone()));
        session.update_progress(|p| {
            p.track = Some(track.clone());
            p.index = Some(index);
            p.direct_play = direct_play;
            p.position = 0;
            p.total_samples = None;
        });
        session.emit(StreamEvent::TrackSelected {
            owner: session.owner(),
            track: track.clone(),
            index,
            direct_play,
            timestamp: chrono::Utc::now(),
        });

        self.track = Some(track);
        self.enter(ProducerState::Loading);
        Step::Continue
    }

    fn load(&mut self) -> Step {
        let Some(track) = self.track.clone() else {
            return self.reject(Error::EmptySelection("no track selected".to_string()));
        };
        let allow_remote = self.session.settings().allow_remote;
        let location = self
            .location
            .get_or_insert_with(|| classify(&track, allow_remote))
            .clone();

        let request = match location {
            TrackLocation::Remote(url) => Suspend::Fetch(url),
            TrackLocation::Local(path) => {
                if matches!(self.fetch, FetchState::Idle) {
                    if let Err(e) = check_local(self.session.context().bytes.as_ref(), &path) {
                        return self.fail(e);
                    }
                }
                Suspend::Read(path)
            }
        };

        let bytes = match std::mem::replace(&mut self.fetch, FetchState::InFlight) {
            FetchState::Idle => {
                debug!(owner = %self.session.owner(), "Requesting bytes: {:?}", request);
                return Step::Suspend(request);
            }
            FetchState::InFlight => return Step::Suspend(request),
            FetchState::Complete(result) => {
                self.fetch = FetchState::Idle;
                result
            }
        };

        match bytes {
            Ok(bytes) => {
                debug!("Loaded {} bytes for {}", bytes.len(), track);
                self.bytes = Some(bytes);
                self.enter(ProducerState::Validating);
                Step::Continue
            }
            Err(e) => self.fail(e),
        }
    }

    fn validate(&mut self) -> Step {
        let session = Arc::clone(&self.session);
        let (Some(track), Some(bytes)) = (self.track.clone(), self.bytes.take()) else {
            return self.reject(Error::Decode("no track bytes buffered".to_string()));
        };
        let extension = self.location.as_ref().and_then(extension_hint);

        let decode = match open_decode_session(
            session.context().decoders.as_ref(),
            &track,
            bytes,
            extension.as_deref(),
        ) {
            Ok(decode) => decode,
            Err(e) => return self.fail(e),
        };

        let total_samples = decode.total_samples();
        session
            .context()
            .hooks
            .track_loaded(&session, self.direct_play, self.index, &track);
        session.update_progress(|p| p.total_samples = total_samples);
        session.emit(StreamEvent::TrackLoaded {
            owner: session.owner(),
            track: track.clone(),
            index: self.index,
            direct_play: self.direct_play,
            total_samples,
            timestamp: chrono::Utc::now(),
        });
        info!(owner = %session.owner(), "Playing {} ({:?} samples)", track, total_samples);

        let block_size = session.context().stream.block_size;
        if self.block.len() != block_size {
            self.block = vec![0.0; block_size];
        }
        self.block_len = 0;
        self.decode = Some(decode);
        session.mark_active();
        self.enter(ProducerState::Streaming);
        Step::Continue
    }

    fn stream(&mut self) -> Step {
        let session = Arc::clone(&self.session);

        // A stop request drops any pending block and forces end of stream
        let stop = session.take_stop_request();
        if stop || self.block_len == 0 {
            let read = match self.decode.as_mut() {
                Some(decode) => {
                    if stop {
                        debug!(owner = %session.owner(), "Stop requested, seeking to end");
                        decode.seek_to_end();
                    }
                    let result = decode.read_samples(&mut self.block);
                    let position = decode.position();
                    session.update_progress(|p| p.position = position);
                    result
                }
                None => Ok(0),
            };

            match read {
                Ok(0) => {
                    self.block_len = 0;
                    self.enter(ProducerState::Finished);
                    return Step::Continue;
                }
                Ok(n) => self.block_len = n,
                Err(e) => {
                    warn!(owner = %session.owner(), "Decode error, ending track: {}", e);
                    self.block_len = 0;
                    self.enter(ProducerState::Finished);
                    return Step::Continue;
                }
            }
        }

        if !session.settings().should_play {
            self.stats.pause_waits += 1;
            return Step::Suspend(Suspend::NextTick);
        }

        if session.queue().is_saturated(session.context().stream.block_size) {
            self.stats.backpressure_waits += 1;
            return Step::Suspend(Suspend::NextTick);
        }

        let block = &self.block[..self.block_len];
        let token = &self.token;
        if !session.queue().push_block_unless(block, || token.is_cancelled()) {
            self.release();
            return Step::Done(RunOutcome::Stopped);
        }

        self.stats.blocks_pushed += 1;
        self.stats.samples_pushed += self.block_len as u64;
        self.block_len = 0;
        Step::Continue
    }

    fn finish(&mut self) -> Step {
        self.release();

        let session = Arc::clone(&self.session);
        let hooks = Arc::clone(&session.context().hooks);
        let track = self.track.clone().unwrap_or_default();
        let (continue_playback, looping) = {
            let settings = session.settings();
            (settings.continue_playback, settings.looping)
        };

        debug!(owner = %session.owner(), "Track complete: {}", track);

        let (outcome, reported_direct) = if continue_playback && looping && self.direct_play {
            let reported = !session.context().stream.invert_replay_direct_flag;
            let next = hooks
                .track_finished(&session, &track, reported, DIRECT_PLAY_INDEX)
                .unwrap_or(DIRECT_PLAY_INDEX);
            (RunOutcome::Restart(next), reported)
        } else if continue_playback && session.playlist_len() > 0 {
            let next = hooks
                .track_finished(&session, &track, self.direct_play, 0)
                .unwrap_or(0);
            (RunOutcome::Restart(next), self.direct_play)
        } else {
            let outcome = match hooks.track_finished(&session, &track, self.direct_play, 0) {
                Some(next) => RunOutcome::Restart(next),
                None => RunOutcome::Stopped,
            };
            (outcome, self.direct_play)
        };

        let (next_index, continuing) = match outcome {
            RunOutcome::Restart(next) => (next, true),
            RunOutcome::Stopped => (0, false),
        };
        session.emit(StreamEvent::TrackFinished {
            owner: session.owner(),
            track: track.clone(),
            direct_play: reported_direct,
            next_index,
            continuing,
            timestamp: chrono::Utc::now(),
        });

        if continuing {
            info!(owner = %session.owner(), "Finished {}, next index {}", track, next_index);
        } else {
            info!(owner = %session.owner(), "Finished {}, playback stopped", track);
        }
        Step::Done(outcome)
    }

    fn fail(&mut self, e: Error) -> Step {
        if e.is_track_rejection() {
            self.reject(e)
        } else {
            self.end_run(e)
        }
    }

    /// Selection failures (and anything else that is not a track rejection)
    /// end the run without a retry
    fn end_run(&mut self, e: Error) -> Step {
        self.release();
        warn!(owner = %self.session.owner(), "Run ended: {}", e);
        self.session.emit(StreamEvent::TrackFailed {
            owner: self.session.owner(),
            track: self.track.clone(),
            reason: e.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.cooling_down = false;
        self.enter(ProducerState::Failed);
        Step::Done(RunOutcome::Stopped)
    }

    /// Load and validation failures cool down, then advance
    fn reject(&mut self, e: Error) -> Step {
        self.release();
        self.stats.rejected_tracks += 1;

        let track = self.track.clone();
        error!(
            owner = %self.session.owner(),
            "Track {} rejected: {}",
            track.as_deref().unwrap_or("<none>"),
            e
        );
        self.session.emit(StreamEvent::TrackFailed {
            owner: self.session.owner(),
            track,
            reason: e.to_string(),
            timestamp: chrono::Utc::now(),
        });

        self.cooling_down = true;
        self.enter(ProducerState::Failed);
        Step::Suspend(Suspend::Cooldown(self.session.context().stream.cooldown()))
    }

    fn after_failure(&mut self) -> Step {
        if !std::mem::take(&mut self.cooling_down) {
            return Step::Done(RunOutcome::Stopped);
        }
        if self.session.playlist_len() > 0 {
            info!(owner = %self.session.owner(), "Skipping to next queued track");
            Step::Done(RunOutcome::Restart(0))
        } else {
            debug!(owner = %self.session.owner(), "Playlist empty after rejection, stopping");
            Step::Done(RunOutcome::Stopped)
        }
    }
}

impl std::fmt::Debug for DecodeProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeProducer")
            .field("owner", &self.session.owner())
            .field("state", &self.state)
            .field("index", &self.index)
            .field("direct_play", &self.direct_play)
            .field("track", &self.track)
            .finish_non_exhaustive()
    }
}
