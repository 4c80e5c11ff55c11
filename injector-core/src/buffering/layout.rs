//! Session geometry shared by both sides of the handshake.
//!
//! The wire form mirrors the init payload's `config` object:
//!
//! ```json
//! {
//!   "stateIndexMap": { "READ_INDEX": 0, "SAMPLES_AVAILABLE": 1, "REQUEST_RENDER": 2 },
//!   "bufferCapacityFrames": 88200,
//!   "channels": 1
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of atomic state slots allocated alongside every ring.
pub const STATE_SLOTS: usize = 4;

fn default_underrun_slot() -> usize {
    3
}

fn default_channels() -> usize {
    1
}

/// Symbolic names → slot offsets in the ring's state array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StateIndexMap {
    pub read_index: usize,
    pub samples_available: usize,
    pub request_render: usize,
    /// Wrapping count of frames rendered while nothing was available.
    #[serde(default = "default_underrun_slot")]
    pub underrun_frames: usize,
}

impl Default for StateIndexMap {
    fn default() -> Self {
        Self {
            read_index: 0,
            samples_available: 1,
            request_render: 2,
            underrun_frames: default_underrun_slot(),
        }
    }
}

impl StateIndexMap {
    fn slots(&self) -> [usize; STATE_SLOTS] {
        [
            self.read_index,
            self.samples_available,
            self.request_render,
            self.underrun_frames,
        ]
    }

    /// Every slot must be in range and no two names may share a slot.
    pub fn validate(&self, slot_count: usize) -> Result<(), LayoutMismatch> {
        let slots = self.slots();
        for (i, &slot) in slots.iter().enumerate() {
            if slot >= slot_count {
                return Err(LayoutMismatch::SlotOutOfRange {
                    slot,
                    slots: slot_count,
                });
            }
            if slots[..i].contains(&slot) {
                return Err(LayoutMismatch::DuplicateSlot(slot));
            }
        }
        Ok(())
    }
}

/// Immutable snapshot handed to the render callback exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub state_index_map: StateIndexMap,
    pub buffer_capacity_frames: usize,
    #[serde(default = "default_channels")]
    pub channels: usize,
}

impl SessionConfig {
    pub fn new(buffer_capacity_frames: usize, channels: usize) -> Self {
        Self {
            state_index_map: StateIndexMap::default(),
            buffer_capacity_frames,
            channels,
        }
    }

    /// Total interleaved samples the storage must hold.
    pub fn sample_len(&self) -> usize {
        self.buffer_capacity_frames * self.channels
    }

    /// Check this config against the storage it is supposed to describe.
    ///
    /// Runs on the render thread during the handshake, so it neither allocates
    /// nor panics.
    pub fn check_geometry(
        &self,
        storage_samples: usize,
        state_slots: usize,
    ) -> Result<(), LayoutMismatch> {
        if self.buffer_capacity_frames == 0 {
            return Err(LayoutMismatch::ZeroCapacity);
        }
        if self.channels == 0 {
            return Err(LayoutMismatch::ZeroChannels);
        }
        let expected = self
            .buffer_capacity_frames
            .checked_mul(self.channels)
            .ok_or(LayoutMismatch::ZeroCapacity)?;
        if expected != storage_samples {
            return Err(LayoutMismatch::StorageLength {
                expected,
                actual: storage_samples,
            });
        }
        self.state_index_map.validate(state_slots)
    }
}

/// Why a config does not fit a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutMismatch {
    #[error("buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("channel count must be non-zero")]
    ZeroChannels,

    #[error("config describes {expected} samples but storage holds {actual}")]
    StorageLength { expected: usize, actual: usize },

    #[error("state slot {0} is mapped twice")]
    DuplicateSlot(usize),

    #[error("state slot {slot} is outside the {slots}-slot state array")]
    SlotOutOfRange { slot: usize, slots: usize },
}
