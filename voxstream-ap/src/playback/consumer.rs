//! Pace consumer
//!
//! Runs once per tick. Releases decoded samples at exactly the transport
//! sample rate, scales them by the session volume into the ring buffer,
//! then cuts the ring buffer into 480-sample frames, encodes each one and
//! fans it out to eligible recipients.
//!
//! Pacing uses a fractional accumulator: elapsed time adds
//! `dt × samples_per_second` of credit, whole samples are spent, and the
//! remainder carries into the next tick. Credit is kept as an integer count
//! of sample-nanoseconds so the arithmetic is exact: after ticks
//! `dt_1..dt_N` the samples released equal `floor(Σdt × rate)` less any
//! queue underrun.

use crate::audio::encoder::FrameEncoder;
use crate::audio::types::{EncodedFrame, PcmFrame, FRAME_SAMPLES, SAMPLES_PER_SECOND};
use crate::delivery::{is_eligible, Recipient};
use crate::error::Result;
use crate::playback::ring_buffer::{PlaybackRingBuffer, RingBufferStats};
use crate::playback::session::PlaybackSession;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace, warn};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Samples moved from the queue into the ring buffer
    pub samples_paced: usize,
    pub frames_encoded: usize,
    /// Frame deliveries (frames × eligible recipients)
    pub deliveries: usize,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub ticks: u64,
    pub samples_paced: u64,
    pub frames_encoded: u64,
    pub frames_delivered: u64,
    pub encode_errors: u64,
    pub delivery_errors: u64,
}

/// Per-session pacing, framing and fan-out state
pub struct PaceConsumer {
    ring: PlaybackRingBuffer,
    encoder: Box<dyn FrameEncoder>,
    /// Unspent credit in sample-nanoseconds
    credit: u128,
    scratch: Vec<f32>,
    frame: PcmFrame,
    encoded: EncodedFrame,
    recipients: Vec<Recipient>,
    stats: ConsumerStats,
}

impl PaceConsumer {
    pub fn new(ring_capacity: usize, encoder: Box<dyn FrameEncoder>) -> Result<Self> {
        Ok(Self {
            ring: PlaybackRingBuffer::new(ring_capacity)?,
            encoder,
            credit: 0,
            scratch: Vec::new(),
            frame: [0.0; FRAME_SAMPLES],
            encoded: EncodedFrame::new(),
            recipients: Vec::new(),
            stats: ConsumerStats::default(),
        })
    }

    /// Accumulated, not yet spent sample credit
    pub fn allowed_samples(&self) -> f64 {
        self.credit as f64 / NANOS_PER_SECOND as f64
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn ring_stats(&self) -> RingBufferStats {
        self.ring.stats()
    }

    /// Pace, frame, encode and deliver for one tick of `dt`
    pub fn tick(&mut self, session: &PlaybackSession, dt: Duration) -> Result<TickReport> {
        let settings = session.settings();
        let queue = session.queue();

        if !session.is_active() || session.is_closed() || !settings.should_play || queue.is_empty() {
            return Ok(TickReport::default());
        }
        self.stats.ticks += 1;

        self.credit += dt.as_nanos() * SAMPLES_PER_SECOND as u128;
        let due = (self.credit / NANOS_PER_SECOND).min(usize::MAX as u128) as usize;

        let verbose = settings.verbose_logging;
        self.log_pacing(verbose, "before", due, queue.len());

        let copied = queue.pop_scaled_into(&mut self.scratch, due, settings.gain());
        self.credit -= copied as u128 * NANOS_PER_SECOND;

        let mut report = TickReport {
            samples_paced: copied,
            ..Default::default()
        };

        // Interleave writes with frame drains so a bounded ring never drops
        // released samples
        let mut offset = 0;
        loop {
            offset += self.ring.write_slice(&self.scratch[offset..]);
            self.drain_frames(session, &settings.recipients, settings.channel, &mut report)?;
            if offset >= self.scratch.len() {
                break;
            }
        }

        self.stats.samples_paced += copied as u64;
        self.log_pacing(verbose, "after", due, queue.len());
        Ok(report)
    }

    fn drain_frames(
        &mut self,
        session: &PlaybackSession,
        allow_list: &[voxstream_common::RecipientId],
        channel: voxstream_common::BroadcastChannel,
        report: &mut TickReport,
    ) -> Result<()> {
        if !self.ring.has_frame() {
            return Ok(());
        }

        let context = session.context();
        if report.frames_encoded == 0 {
            context.registry.snapshot(&mut self.recipients);
        }

        while self.ring.has_frame() {
            self.ring.read_to(&mut self.frame)?;

            let len = match self.encoder.encode(&self.frame, &mut self.encoded) {
                Ok(len) => len,
                Err(e) => {
                    self.stats.encode_errors += 1;
                    warn!(owner = %session.owner(), "Dropping frame, encode failed: {}", e);
                    continue;
                }
            };
            report.frames_encoded += 1;
            self.stats.frames_encoded += 1;

            let payload = &self.encoded.as_bytes()[..len];
            for recipient in self.recipients.iter().filter(|r| is_eligible(r, allow_list)) {
                match context.sink.send(recipient.id, session.owner(), channel, payload) {
                    Ok(()) => {
                        report.deliveries += 1;
                        self.stats.frames_delivered += 1;
                    }
                    Err(e) => {
                        self.stats.delivery_errors += 1;
                        trace!("Delivery to {} failed: {}", recipient.id, e);
                    }
                }
            }
        }
        Ok(())
    }

    fn log_pacing(&self, verbose: bool, phase: &str, due: usize, queued: usize) {
        if verbose {
            debug!(
                phase,
                due,
                allowed = self.allowed_samples(),
                queued,
                ring = self.ring.len(),
                write_head = self.ring.write_head(),
                "Pacing"
            );
        } else {
            trace!(
                phase,
                due,
                allowed = self.allowed_samples(),
                queued,
                ring = self.ring.len(),
                write_head = self.ring.write_head(),
                "Pacing"
            );
        }
    }
}

impl std::fmt::Debug for PaceConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaceConsumer")
            .field("allowed_samples", &self.allowed_samples())
            .field("ring", &self.ring.stats())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::test_support::{test_context_with, RecordingAudience};
    use crate::playback::session::SessionSettings;
    use std::sync::Arc;
    use voxstream_common::{OwnerId, RecipientId};

    fn session_with(audience: Arc<RecordingAudience>, settings: SessionSettings) -> Arc<PlaybackSession> {
        let context = test_context_with(audience);
        let session = PlaybackSession::new(OwnerId(9), Arc::new(context), settings).unwrap();
        session.mark_active();
        session
    }

    #[test]
    fn test_inactive_session_is_a_no_op() {
        let audience = Arc::new(RecordingAudience::with_ready(&[1]));
        let context = test_context_with(Arc::clone(&audience));
        let session =
            PlaybackSession::new(OwnerId(9), Arc::new(context), SessionSettings::default()).unwrap();
        session.queue().push_block(&[0.1; 960]);

        let report = session.tick(Duration::from_millis(10)).unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(session.queue().len(), 960);
    }

    #[test]
    fn test_one_frame_per_10ms() {
        let audience = Arc::new(RecordingAudience::with_ready(&[1, 2]));
        let session = session_with(Arc::clone(&audience), SessionSettings::default());
        session.queue().push_block(&[0.25; 4800]);

        let report = session.tick(Duration::from_millis(10)).unwrap();
        assert_eq!(report.samples_paced, 480);
        assert_eq!(report.frames_encoded, 1);
        assert_eq!(report.deliveries, 2);
        assert_eq!(audience.sent().len(), 2);
    }

    #[test]
    fn test_fractional_credit_carries_over() {
        let audience = Arc::new(RecordingAudience::with_ready(&[]));
        let session = session_with(audience, SessionSettings::default());
        session.queue().push_block(&[0.0; 48_000]);

        // 1/30 s is 1600 samples; over three ticks of 11.111..ms nothing is lost
        let dt = Duration::from_nanos(11_111_111);
        let mut total = 0;
        for _ in 0..3 {
            total += session.tick(dt).unwrap().samples_paced;
        }
        let expected = (3 * dt.as_nanos() * 48_000 / 1_000_000_000) as usize;
        assert_eq!(total, expected);
    }

    #[test]
    fn test_paused_session_holds_samples() {
        let audience = Arc::new(RecordingAudience::with_ready(&[1]));
        let session = session_with(audience, SessionSettings::default());
        session.queue().push_block(&[0.5; 960]);
        session.pause();

        let report = session.tick(Duration::from_millis(20)).unwrap();
        assert_eq!(report.samples_paced, 0);
        assert_eq!(session.queue().len(), 960);
    }

    #[test]
    fn test_allow_list_restricts_fan_out() {
        let audience = Arc::new(RecordingAudience::with_ready(&[1, 2, 3]));
        let settings = SessionSettings {
            recipients: vec![RecipientId(2)],
            ..Default::default()
        };
        let session = session_with(Arc::clone(&audience), settings);
        session.queue().push_block(&[0.1; 480]);

        session.tick(Duration::from_millis(10)).unwrap();
        let sent = audience.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, RecipientId(2));
        assert_eq!(sent[0].owner, OwnerId(9));
    }

    #[test]
    fn test_remainder_stays_in_ring() {
        let audience = Arc::new(RecordingAudience::with_ready(&[1]));
        let session = session_with(Arc::clone(&audience), SessionSettings::default());
        session.queue().push_block(&[0.1; 700]);

        let report = session.tick(Duration::from_millis(100)).unwrap();
        assert_eq!(report.samples_paced, 700);
        assert_eq!(report.frames_encoded, 1);
        assert_eq!(session.status().ring.occupied, 220);
    }

    #[test]
    fn test_large_release_with_small_ring_loses_nothing() {
        let audience = Arc::new(RecordingAudience::with_ready(&[1]));
        let mut context = test_context_with(Arc::clone(&audience));
        context.stream.ring_capacity = FRAME_SAMPLES;
        let session =
            PlaybackSession::new(OwnerId(9), Arc::new(context), SessionSettings::default()).unwrap();
        session.mark_active();
        session.queue().push_block(&[0.1; 4800]);

        let report = session.tick(Duration::from_millis(100)).unwrap();
        assert_eq!(report.samples_paced, 4800);
        assert_eq!(report.frames_encoded, 10);
    }
}
