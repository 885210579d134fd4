//! Collaborators and tuning shared by every session

use crate::audio::decoder::DecoderFactory;
use crate::audio::encoder::EncoderFactory;
use crate::config::StreamConfig;
use crate::delivery::{DeliverySink, RecipientRegistry};
use crate::playback::hooks::TrackHooks;
use crate::playback::track_source::ByteSource;
use std::sync::Arc;
use voxstream_common::EventBus;

/// Everything a session needs from the outside world
#[derive(Clone)]
pub struct PipelineContext {
    pub decoders: Arc<dyn DecoderFactory>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub bytes: Arc<dyn ByteSource>,
    pub registry: Arc<dyn RecipientRegistry>,
    pub sink: Arc<dyn DeliverySink>,
    pub hooks: Arc<TrackHooks>,
    pub events: EventBus,
    pub stream: StreamConfig,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("hooks", &self.hooks)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
