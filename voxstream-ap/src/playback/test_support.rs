//! Shared fixtures for unit tests

use crate::audio::{MuLawEncoderFactory, SymphoniaDecoderFactory};
use crate::config::StreamConfig;
use crate::delivery::{DeliverySink, Recipient, RecipientRegistry};
use crate::error::Result;
use crate::playback::context::PipelineContext;
use crate::playback::hooks::TrackHooks;
use crate::playback::session::{PlaybackSession, SessionSettings};
use crate::playback::track_source::DefaultByteSource;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxstream_common::{BroadcastChannel, EventBus, OwnerId, RecipientId};

#[derive(Debug, Clone)]
pub struct SentFrame {
    pub recipient: RecipientId,
    pub owner: OwnerId,
    pub channel: BroadcastChannel,
    pub payload: Vec<u8>,
}

/// In-memory audience that records every delivery
#[derive(Default)]
pub struct RecordingAudience {
    recipients: Vec<Recipient>,
    sent: Mutex<Vec<SentFrame>>,
}

impl RecordingAudience {
    pub fn with_ready(ids: &[u32]) -> Self {
        Self {
            recipients: ids
                .iter()
                .map(|&id| Recipient {
                    id: RecipientId(id),
                    ready: true,
                })
                .collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap().clone()
    }
}

impl RecipientRegistry for RecordingAudience {
    fn snapshot(&self, out: &mut Vec<Recipient>) {
        out.clear();
        out.extend_from_slice(&self.recipients);
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

pub fn test_context_with(audience: Arc<RecordingAudience>) -> PipelineContext {
    PipelineContext {
        decoders: Arc::new(SymphoniaDecoderFactory),
        encoders: Arc::new(MuLawEncoderFactory),
        bytes: Arc::new(DefaultByteSource::new(Duration::from_secs(1)).unwrap()),
        registry: audience.clone(),
        sink: audience,
        hooks: Arc::new(TrackHooks::new()),
        events: EventBus::new(64),
        stream: StreamConfig {
            block_size: 9600,
            cooldown_ms: 10,
            ..Default::default()
        },
    }
}

pub fn test_context() -> PipelineContext {
    test_context_with(Arc::new(RecordingAudience::default()))
}

pub fn test_session() -> Arc<PlaybackSession> {
    PlaybackSession::new(OwnerId(1), Arc::new(test_context()), SessionSettings::default()).unwrap()
}
