//! Paced PCM ring buffer
//!
//! Fixed-capacity circular store sitting between the pace consumer's
//! rate-limited copy and the frame chunker. Samples are read back oldest
//! first in exact frame-sized reads.
//!
//! Design:
//! - Owned by exactly one pace consumer (no sharing, no locking)
//! - Backed by `ringbuf::HeapRb`
//! - Writes never overwrite unread samples; a full buffer rejects the write
//! - Reading more than is available is a caller contract violation and
//!   returns an error instead of truncating

use crate::audio::types::FRAME_SAMPLES;
use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};

/// Default capacity: one second of 48 kHz mono
pub const DEFAULT_RING_CAPACITY: usize = 48_000;

/// Ring buffer of paced samples awaiting framing
pub struct PlaybackRingBuffer {
    buffer: HeapRb<f32>,

    /// Total samples ever written (running write cursor)
    write_head: u64,

    /// Samples rejected because the buffer was full
    rejected_writes: u64,
}

impl PlaybackRingBuffer {
    /// Create a ring buffer holding `capacity` samples
    ///
    /// The capacity must fit at least one encoder frame, otherwise the
    /// chunker could never make progress.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < FRAME_SAMPLES {
            return Err(Error::Config(format!(
                "ring buffer capacity {} is smaller than one frame ({} samples)",
                capacity, FRAME_SAMPLES
            )));
        }

        debug!("Creating playback ring buffer with capacity: {} samples", capacity);

        Ok(Self {
            buffer: HeapRb::new(capacity),
            write_head: 0,
            rejected_writes: 0,
        })
    }

    /// Written-but-unread samples
    pub fn len(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Free space in samples
    pub fn vacant_len(&self) -> usize {
        self.buffer.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity().into()
    }

    /// Running count of samples written since creation
    pub fn write_head(&self) -> u64 {
        self.write_head
    }

    /// Whether a full frame can be read
    pub fn has_frame(&self) -> bool {
        self.len() >= FRAME_SAMPLES
    }

    /// Write as many samples as fit; returns how many were written
    pub fn write_slice(&mut self, samples: &[f32]) -> usize {
        let written = self.buffer.push_slice(samples);
        self.write_head += written as u64;
        if written < samples.len() {
            self.rejected_writes += (samples.len() - written) as u64;
            trace!(
                "Playback ring buffer full, {} samples deferred (total: {})",
                samples.len() - written,
                self.rejected_writes
            );
        }
        written
    }

    /// Read exactly `out.len()` of the oldest unread samples
    ///
    /// Fails without consuming anything if fewer samples are available.
    pub fn read_to(&mut self, out: &mut [f32]) -> Result<()> {
        let available = self.len();
        if out.len() > available {
            return Err(Error::RingBuffer(format!(
                "read of {} samples exceeds {} available",
                out.len(),
                available
            )));
        }
        let read = self.buffer.pop_slice(out);
        debug_assert_eq!(read, out.len());
        Ok(())
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            capacity: self.capacity(),
            occupied: self.len(),
            write_head: self.write_head,
            rejected_writes: self.rejected_writes,
        }
    }
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RingBufferStats {
    /// Buffer capacity in samples
    pub capacity: usize,

    /// Current unread samples
    pub occupied: usize,

    /// Total samples written
    pub write_head: u64,

    /// Samples rejected because the buffer was full
    pub rejected_writes: u64,
}

impl RingBufferStats {
    /// Fill level (0.0 to 1.0)
    pub fn fill_percent(&self) -> f32 {
        self.occupied as f32 / self.capacity as f32
    }
}
