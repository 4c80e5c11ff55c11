//! Shared ring buffer and the queues that feed it.
//!
//! ```text
//! decoder thread ──push──► staging (ringbuf::HeapRb) ──feeder──► AudioRingBuffer ──render──► host
//! ```
//!
//! The staging queue is a plain `ringbuf` SPSC queue. The shared ring is the
//! session-lifetime buffer read by the real-time render callback; its
//! synchronization state lives in a small array of atomic slots addressed
//! through a [`StateIndexMap`].

pub mod chunk;
pub mod layout;
pub mod ring;
pub mod signal;

use ringbuf::{traits::Split, HeapRb};

pub use layout::{LayoutMismatch, SessionConfig, StateIndexMap, STATE_SLOTS};
pub use ring::{AudioRingBuffer, RingConsumer, RingProducer, SharedRing};
pub use ringbuf::traits::{Consumer, Observer, Producer};
pub use signal::RenderSignal;

/// Producer half of the staging queue, held by the ingest side.
pub type StagingProducer<S> = ringbuf::HeapProd<S>;

/// Consumer half of the staging queue, held by the feeder thread.
pub type StagingConsumer<S> = ringbuf::HeapCons<S>;

/// A sample type that can live in the shared ring.
///
/// Slots are stored as `AtomicU32` bit patterns so both contexts can touch the
/// storage without `unsafe`.
pub trait Sample: Copy + Send + Sync + 'static {
    /// The "silent" value.
    const EQUILIBRIUM: Self;

    fn to_bits(self) -> u32;

    fn from_bits(bits: u32) -> Self;
}

impl Sample for f32 {
    const EQUILIBRIUM: Self = 0.0;

    #[inline]
    fn to_bits(self) -> u32 {
        f32::to_bits(self)
    }

    #[inline]
    fn from_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }
}

impl Sample for i32 {
    const EQUILIBRIUM: Self = 0;

    #[inline]
    fn to_bits(self) -> u32 {
        self as u32
    }

    #[inline]
    fn from_bits(bits: u32) -> Self {
        bits as i32
    }
}

/// Create a matched staging producer/consumer pair holding `capacity_samples`.
pub fn create_staging_queue<S: Sample>(
    capacity_samples: usize,
) -> (StagingProducer<S>, StagingConsumer<S>) {
    HeapRb::<S>::new(capacity_samples.max(1)).split()
}
