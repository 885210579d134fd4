//! Test helpers for voxstream-ap integration tests
//!
//! Provides reusable fakes for the pipeline's seams:
//! - `TrackLibrary`: scripted tracks served by `ScriptedBytes` and decoded by
//!   `ScriptedDecoders`, which count live decoders to catch leaks
//! - `RecordingAudience`: in-memory recipient registry and delivery sink
//! - `HookRecorder`: lifecycle observer with optional overrides
//! - `pump`: steps a `DecodeProducer` synchronously to its next suspension

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxstream_ap::audio::{DecoderFactory, MuLawEncoderFactory, TrackDecoder};
use voxstream_ap::config::StreamConfig;
use voxstream_ap::delivery::{DeliverySink, Recipient, RecipientRegistry};
use voxstream_ap::playback::{
    ByteSource, DecodeProducer, PipelineContext, PlaybackSession, SessionSettings, Step, Suspend,
    TrackHooks, TrackObserver,
};
use voxstream_ap::{Error, Result};
use voxstream_common::{BroadcastChannel, EventBus, OwnerId, RecipientId, StreamEvent};

// ============================================================================
// Scripted tracks
// ============================================================================

/// Format and content of one scripted track
#[derive(Debug, Clone, Copy)]
pub struct TrackSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: usize,
    /// Every sample of the track has this value
    pub value: f32,
}

impl TrackSpec {
    /// Valid mono 48 kHz track
    pub fn mono(samples: usize) -> Self {
        Self {
            channels: 1,
            sample_rate: 48_000,
            samples,
            value: 0.25,
        }
    }

    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

/// Shared catalogue of scripted tracks keyed by reference
#[derive(Clone, Default)]
pub struct TrackLibrary {
    tracks: Arc<Mutex<HashMap<String, TrackSpec>>>,
    remote: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    /// Tracks that exist but whose read fails with `Error::InvalidInput`
    unreadable: Arc<Mutex<HashMap<String, String>>>,
    live_decoders: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl TrackLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track readable at `reference`
    pub fn add(&self, reference: &str, spec: TrackSpec) {
        self.tracks
            .lock()
            .unwrap()
            .insert(reference.to_string(), spec);
    }

    /// Serve `url` with the given status; a 2xx body names a registered track
    pub fn add_remote(&self, url: &str, status: u16, body: &str) {
        self.remote
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.as_bytes().to_vec()));
    }

    /// Register a track that exists but cannot be read
    pub fn add_unreadable(&self, reference: &str, reason: &str) {
        self.unreadable
            .lock()
            .unwrap()
            .insert(reference.to_string(), reason.to_string());
    }

    /// Decoders opened and not yet dropped
    pub fn live_decoders(&self) -> usize {
        self.live_decoders.load(Ordering::SeqCst)
    }

    /// Tracks handed to the decoder factory, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    fn spec(&self, reference: &str) -> Option<TrackSpec> {
        self.tracks.lock().unwrap().get(reference).copied()
    }
}

/// Byte source over a `TrackLibrary`: a track's bytes are its own reference
pub struct ScriptedBytes {
    library: TrackLibrary,
}

#[async_trait]
impl ByteSource for ScriptedBytes {
    fn exists(&self, path: &Path) -> bool {
        path.to_str().is_some_and(|p| {
            self.library.spec(p).is_some() || self.library.unreadable.lock().unwrap().contains_key(p)
        })
    }

    fn read_local(&self, path: &Path) -> Result<Vec<u8>> {
        let reference = path.display().to_string();
        if let Some(reason) = self.library.unreadable.lock().unwrap().get(&reference) {
            return Err(Error::InvalidInput(reason.clone()));
        }
        match self.library.spec(&reference) {
            Some(_) => Ok(reference.into_bytes()),
            None => Err(Error::NotFound(reference)),
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<(u16, Vec<u8>)> {
        self.library
            .remote
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Http(format!("connection refused: {}", url)))
    }
}

/// Decoder factory producing `ScriptedDecoder`s from library bytes
pub struct ScriptedDecoders {
    library: TrackLibrary,
}

impl DecoderFactory for ScriptedDecoders {
    fn open(&self, bytes: Vec<u8>, _extension: Option<&str>) -> Result<Box<dyn TrackDecoder>> {
        let reference = String::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        let spec = self
            .library
            .spec(&reference)
            .ok_or_else(|| Error::Decode(format!("no scripted track {}", reference)))?;

        self.library.live_decoders.fetch_add(1, Ordering::SeqCst);
        self.library.opened.lock().unwrap().push(reference);
        Ok(Box::new(ScriptedDecoder {
            spec,
            remaining: spec.samples * spec.channels as usize,
            live: Arc::clone(&self.library.live_decoders),
        }))
    }
}

struct ScriptedDecoder {
    spec: TrackSpec,
    remaining: usize,
    live: Arc<AtomicUsize>,
}

impl TrackDecoder for ScriptedDecoder {
    fn channels(&self) -> u16 {
        self.spec.channels
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn total_samples(&self) -> Option<u64> {
        Some((self.spec.samples * self.spec.channels as usize) as u64)
    }

    fn read_samples(&mut self, buffer: &mut [f32]) -> Result<usize> {
        let n = buffer.len().min(self.remaining);
        buffer[..n].fill(self.spec.value);
        self.remaining -= n;
        Ok(n)
    }

    fn seek_to_end(&mut self) {
        self.remaining = 0;
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Audience
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentFrame {
    pub recipient: RecipientId,
    pub owner: OwnerId,
    pub channel: BroadcastChannel,
    pub payload: Vec<u8>,
}

/// Registry and sink that records every delivered frame
#[derive(Default)]
pub struct RecordingAudience {
    recipients: Mutex<Vec<Recipient>>,
    sent: Mutex<Vec<SentFrame>>,
}

impl RecordingAudience {
    pub fn with_ready(ids: &[u32]) -> Self {
        let audience = Self::default();
        for &id in ids {
            audience.join(id, true);
        }
        audience
    }

    pub fn join(&self, id: u32, ready: bool) {
        self.recipients.lock().unwrap().push(Recipient {
            id: RecipientId(id),
            ready,
        });
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, id: u32) -> Vec<SentFrame> {
        self.sent()
            .into_iter()
            .filter(|f| f.recipient == RecipientId(id))
            .collect()
    }
}

impl RecipientRegistry for RecordingAudience {
    fn snapshot(&self, out: &mut Vec<Recipient>) {
        out.clear();
        out.extend_from_slice(&self.recipients.lock().unwrap());
    }
}

impl DeliverySink for RecordingAudience {
    fn send(
        &self,
        recipient: RecipientId,
        owner: OwnerId,
        channel: BroadcastChannel,
        payload: &[u8],
    ) -> Result<()> {
        self.sent.lock().unwrap().push(SentFrame {
            recipient,
            owner,
            channel,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// One observed lifecycle callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    Selecting { direct_play: bool, index: i32 },
    Selected { direct_play: bool, index: i32, track: Option<String> },
    Loaded { direct_play: bool, index: i32, track: String },
    Finished { track: String, direct_play: bool, next_index: i32 },
}

/// Records every callback; optionally overrides selection and next index
#[derive(Default)]
pub struct HookRecorder {
    pub calls: Mutex<Vec<HookCall>>,
    pub redirect_index: Option<i32>,
    pub replace_track: Option<String>,
    pub next_index: Option<i32>,
}

impl HookRecorder {
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TrackObserver for HookRecorder {
    fn on_track_selecting(
        &self,
        _session: &PlaybackSession,
        direct_play: bool,
        index: i32,
    ) -> Option<i32> {
        self.calls
            .lock()
            .unwrap()
            .push(HookCall::Selecting { direct_play, index });
        self.redirect_index
    }

    fn on_track_selected(
        &self,
        _session: &PlaybackSession,
        direct_play: bool,
        index: i32,
        track: Option<&str>,
    ) -> Option<String> {
        self.calls.lock().unwrap().push(HookCall::Selected {
            direct_play,
            index,
            track: track.map(str::to_string),
        });
        self.replace_track.clone()
    }

    fn on_track_loaded(&self, _session: &PlaybackSession, direct_play: bool, index: i32, track: &str) {
        self.calls.lock().unwrap().push(HookCall::Loaded {
            direct_play,
            index,
            track: track.to_string(),
        });
    }

    fn on_track_finished(
        &self,
        _session: &PlaybackSession,
        track: &str,
        direct_play: bool,
        next_index: i32,
    ) -> Option<i32> {
        self.calls.lock().unwrap().push(HookCall::Finished {
            track: track.to_string(),
            direct_play,
            next_index,
        });
        self.next_index
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One session wired to scripted collaborators
pub struct Harness {
    pub library: TrackLibrary,
    pub audience: Arc<RecordingAudience>,
    pub hooks: Arc<TrackHooks>,
    pub events: tokio::sync::broadcast::Receiver<StreamEvent>,
    pub session: Arc<PlaybackSession>,
}

impl Harness {
    pub fn new(block_size: usize) -> Self {
        Self::build(block_size, 10, SessionSettings::default())
    }

    pub fn with_settings(block_size: usize, settings: SessionSettings) -> Self {
        Self::build(block_size, 10, settings)
    }

    pub fn build(block_size: usize, cooldown_ms: u64, settings: SessionSettings) -> Self {
        let library = TrackLibrary::new();
        let audience = Arc::new(RecordingAudience::with_ready(&[1]));
        let hooks = Arc::new(TrackHooks::new());
        let context = scripted_context(
            &library,
            Arc::clone(&audience),
            Arc::clone(&hooks),
            block_size,
            cooldown_ms,
        );
        let events = context.events.subscribe();
        let session = PlaybackSession::new(OwnerId(7), Arc::new(context), settings)
            .expect("session");
        Self {
            library,
            audience,
            hooks,
            events,
            session,
        }
    }

    /// A producer for a fresh run at `index`
    pub fn producer(&self, index: i32) -> DecodeProducer {
        DecodeProducer::new(Arc::clone(&self.session), index, Default::default())
    }

    /// Tick the consumer once for `dt`
    pub fn tick(&self, dt: Duration) -> voxstream_ap::playback::TickReport {
        self.session.tick(dt).expect("tick")
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn scripted_context(
    library: &TrackLibrary,
    audience: Arc<RecordingAudience>,
    hooks: Arc<TrackHooks>,
    block_size: usize,
    cooldown_ms: u64,
) -> PipelineContext {
    PipelineContext {
        decoders: Arc::new(ScriptedDecoders {
            library: library.clone(),
        }),
        encoders: Arc::new(MuLawEncoderFactory),
        bytes: Arc::new(ScriptedBytes {
            library: library.clone(),
        }),
        registry: audience.clone(),
        sink: audience,
        hooks,
        events: EventBus::new(256),
        stream: StreamConfig {
            block_size,
            cooldown_ms,
            ..Default::default()
        },
    }
}

/// Step until the producer suspends or finishes.
///
/// Local reads and remote fetches are resolved inline against the session's
/// byte source; every other suspension is returned to the caller.
pub fn pump(producer: &mut DecodeProducer, session: &PlaybackSession) -> Step {
    loop {
        match producer.step() {
            Step::Continue => continue,
            Step::Suspend(Suspend::Read(path)) => {
                let result = session.context().bytes.read_local(&path);
                producer.complete_read(result);
            }
            Step::Suspend(Suspend::Fetch(url)) => {
                let bytes = Arc::clone(&session.context().bytes);
                let result = futures::executor::block_on(bytes.fetch_remote(&url));
                producer.complete_fetch(result);
            }
            other => return other,
        }
    }
}

/// Wait (polling) until `condition` holds, panicking after `timeout`
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
