//! Playlist and selection policy
//!
//! An ordered list of track references (local paths or URLs, classified at
//! load time). Selecting an index consumes the entry; with loop enabled the
//! consumed entry goes back on the end.

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Reserved playlist index: play the staged out-of-band track instead of
/// consuming a playlist entry
pub const DIRECT_PLAY_INDEX: i32 = -1;

/// Ordered, mutable sequence of track references
#[derive(Debug, Clone, Default, Serialize)]
pub struct Playlist {
    tracks: Vec<String>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    /// Add a track.
    ///
    /// `position == DIRECT_PLAY_INDEX` appends; any other position inserts
    /// before that index and must lie in `0..=len`.
    pub fn enqueue(&mut self, track: impl Into<String>, position: i32) -> Result<()> {
        let track = track.into();
        if position == DIRECT_PLAY_INDEX {
            self.tracks.push(track);
            return Ok(());
        }
        match usize::try_from(position) {
            Ok(index) if index <= self.tracks.len() => {
                self.tracks.insert(index, track);
                Ok(())
            }
            _ => Err(Error::OutOfRange {
                index: position,
                len: self.tracks.len(),
            }),
        }
    }

    /// Remove the entry at `index`
    pub fn remove_at(&mut self, index: usize) -> Result<String> {
        if index >= self.tracks.len() {
            return Err(Error::OutOfRange {
                index: i32::try_from(index).unwrap_or(i32::MAX),
                len: self.tracks.len(),
            });
        }
        Ok(self.tracks.remove(index))
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Randomize order in place; the multiset of entries is unchanged
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.tracks.shuffle(rng);
    }

    /// Consume the entry at `index` for playback.
    ///
    /// With `shuffle` the list is randomized first, so `index` refers to the
    /// shuffled order. With `looping` the consumed entry is appended again.
    pub fn select<R: Rng + ?Sized>(
        &mut self,
        index: i32,
        shuffle: bool,
        looping: bool,
        rng: &mut R,
    ) -> Result<String> {
        if self.tracks.is_empty() {
            return Err(Error::EmptySelection(format!(
                "index {} requested on an empty playlist",
                index
            )));
        }
        let position = match usize::try_from(index) {
            Ok(i) if i < self.tracks.len() => i,
            _ => {
                return Err(Error::OutOfRange {
                    index,
                    len: self.tracks.len(),
                })
            }
        };

        if shuffle {
            self.shuffle(rng);
        }

        let track = self.tracks.remove(position);
        if looping {
            self.tracks.push(track.clone());
        }
        Ok(track)
    }
}
