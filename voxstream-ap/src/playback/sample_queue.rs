//! Decoded-sample FIFO between the decode producer and the pace consumer
//!
//! The queue itself is unbounded; memory is bounded by the producer, which
//! refuses to push while `len() >= block_size` (see `is_saturated`).
//! Pushes and pops each happen under a single lock acquisition, so a block
//! is either entirely visible to the consumer or not at all.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// FIFO of normalized f32 PCM samples
#[derive(Debug, Default)]
pub struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
    pushed_total: AtomicU64,
    popped_total: AtomicU64,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Samples currently queued
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Backpressure predicate: true while the producer must hold its block
    pub fn is_saturated(&self, block_size: usize) -> bool {
        self.len() >= block_size
    }

    /// Append a whole block
    pub fn push_block(&self, block: &[f32]) {
        self.lock().extend(block.iter().copied());
        self.pushed_total.fetch_add(block.len() as u64, Ordering::Relaxed);
    }

    /// Append a whole block unless `cancelled()` reports true.
    ///
    /// The check runs under the queue lock, so once a run is cancelled no
    /// later push from it can become visible to the consumer.
    pub fn push_block_unless(&self, block: &[f32], cancelled: impl FnOnce() -> bool) -> bool {
        let mut samples = self.lock();
        if cancelled() {
            return false;
        }
        samples.extend(block.iter().copied());
        self.pushed_total.fetch_add(block.len() as u64, Ordering::Relaxed);
        true
    }

    /// Pop up to `max` samples into `out` (cleared first), each multiplied by `gain`.
    ///
    /// Returns the number of samples popped.
    pub fn pop_scaled_into(&self, out: &mut Vec<f32>, max: usize, gain: f32) -> usize {
        out.clear();
        let mut samples = self.lock();
        let n = max.min(samples.len());
        out.extend(samples.drain(..n).map(|s| s * gain));
        drop(samples);
        self.popped_total.fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    /// Discard everything queued; returns how many samples were dropped
    pub fn clear(&self) -> usize {
        let mut samples = self.lock();
        let n = samples.len();
        samples.clear();
        n
    }

    /// Lifetime count of samples pushed
    pub fn pushed_total(&self) -> u64 {
        self.pushed_total.load(Ordering::Relaxed)
    }

    /// Lifetime count of samples popped
    pub fn popped_total(&self) -> u64 {
        self.popped_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_preserved() {
        let queue = SampleQueue::new();
        queue.push_block(&[0.1, 0.2, 0.3]);
        queue.push_block(&[0.4, 0.5]);

        let mut out = Vec::new();
        assert_eq!(queue.pop_scaled_into(&mut out, 4, 1.0), 4);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_is_limited_by_len() {
        let queue = SampleQueue::new();
        queue.push_block(&[1.0; 10]);

        let mut out = Vec::new();
        assert_eq!(queue.pop_scaled_into(&mut out, 100, 1.0), 10);
        assert!(queue.is_empty());
        assert_eq!(queue.pushed_total(), 10);
        assert_eq!(queue.popped_total(), 10);
    }

    #[test]
    fn test_gain_applied_per_sample() {
        let queue = SampleQueue::new();
        queue.push_block(&[0.8, -0.4]);

        let mut out = Vec::new();
        queue.pop_scaled_into(&mut out, 2, 0.5);
        assert_eq!(out, vec![0.4, -0.2]);
    }

    #[test]
    fn test_saturation_threshold() {
        let queue = SampleQueue::new();
        queue.push_block(&[0.0; 99]);
        assert!(!queue.is_saturated(100));
        queue.push_block(&[0.0; 1]);
        assert!(queue.is_saturated(100));
    }

    #[test]
    fn test_cancelled_push_is_dropped() {
        let queue = SampleQueue::new();
        assert!(!queue.push_block_unless(&[1.0; 8], || true));
        assert!(queue.is_empty());
        assert!(queue.push_block_unless(&[1.0; 8], || false));
        assert_eq!(queue.len(), 8);
        assert_eq!(queue.clear(), 8);
    }
}
