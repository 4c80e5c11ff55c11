//! Fixed-capacity SPSC ring shared between the feeder and the render callback.
//!
//! # Memory ordering
//!
//! | Field | Writer | Ordering |
//! |-------|--------|----------|
//! | sample slots | producer | `Relaxed`, published by the `SAMPLES_AVAILABLE` increment |
//! | `READ_INDEX` | consumer | store `Release`, load `Acquire` |
//! | `SAMPLES_AVAILABLE` | producer `+`, consumer `-` | RMW `Release`, load `Acquire` |
//! | `REQUEST_RENDER` | consumer sets, producer clears | store `Release`, load `Acquire` |
//! | `UNDERRUN_FRAMES` | consumer | `Relaxed` (diagnostic) |
//!
//! Each field has exactly one writer per direction, so per-field atomicity is
//! enough; no compound transaction or lock is needed.

use std::marker::PhantomData;
use std::sync::{
    atomic::{fence, AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc,
};

use super::{
    layout::{LayoutMismatch, SessionConfig, STATE_SLOTS},
    signal::RenderSignal,
    Sample,
};

/// Handle type passed through the handshake.
pub type SharedRing<S> = Arc<AudioRingBuffer<S>>;

/// Raw shared storage: interleaved sample slots plus the state array.
///
/// Carries no notion of which state slot means what. Both halves learn that
/// from the [`SessionConfig`] they are built with.
pub struct AudioRingBuffer<S: Sample> {
    samples: Box<[AtomicU32]>,
    states: Box<[AtomicUsize]>,
    signal: RenderSignal,
    _sample: PhantomData<fn() -> S>,
}

impl<S: Sample> std::fmt::Debug for AudioRingBuffer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRingBuffer")
            .field("sample_len", &self.samples.len())
            .field("states", &self.states)
            .finish()
    }
}

impl<S: Sample> AudioRingBuffer<S> {
    /// Allocate silent storage for `config` with all state slots zeroed.
    pub fn new(config: &SessionConfig) -> Result<Self, LayoutMismatch> {
        let sample_len = config
            .buffer_capacity_frames
            .checked_mul(config.channels)
            .ok_or(LayoutMismatch::ZeroCapacity)?;
        config.check_geometry(sample_len, STATE_SLOTS)?;

        let silent = S::EQUILIBRIUM.to_bits();
        Ok(Self {
            samples: (0..sample_len).map(|_| AtomicU32::new(silent)).collect(),
            states: (0..STATE_SLOTS).map(|_| AtomicUsize::new(0)).collect(),
            signal: RenderSignal::new(),
            _sample: PhantomData,
        })
    }

    /// Allocate and wrap in the shared handle.
    pub fn shared(config: &SessionConfig) -> Result<SharedRing<S>, LayoutMismatch> {
        Self::new(config).map(Arc::new)
    }

    pub fn sample_len(&self) -> usize {
        self.samples.len()
    }

    pub fn state_len(&self) -> usize {
        self.states.len()
    }

    /// Raw view of one state slot.
    pub fn state_slot(&self, slot: usize) -> Option<&AtomicUsize> {
        self.states.get(slot)
    }

    pub fn signal(&self) -> &RenderSignal {
        &self.signal
    }

    #[inline]
    fn state(&self, slot: usize) -> &AtomicUsize {
        // Slots are validated against `STATE_SLOTS` before either half exists.
        &self.states[slot]
    }

    #[inline]
    fn copy_out(&self, from: usize, dest: &mut [S]) {
        for (d, slot) in dest.iter_mut().zip(&self.samples[from..]) {
            *d = S::from_bits(slot.load(Ordering::Relaxed));
        }
    }

    #[inline]
    fn copy_in(&self, to: usize, src: &[S]) {
        for (slot, s) in self.samples[to..].iter().zip(src) {
            slot.store(s.to_bits(), Ordering::Relaxed);
        }
    }
}

/// Slot offsets resolved from the session's index map.
#[derive(Debug, Clone, Copy)]
struct Slots {
    read_index: usize,
    samples_available: usize,
    request_render: usize,
    underrun_frames: usize,
}

impl Slots {
    fn resolve<S: Sample>(
        ring: &AudioRingBuffer<S>,
        config: &SessionConfig,
    ) -> Result<Self, LayoutMismatch> {
        config.check_geometry(ring.sample_len(), ring.state_len())?;
        let map = config.state_index_map;
        Ok(Self {
            read_index: map.read_index,
            samples_available: map.samples_available,
            request_render: map.request_render,
            underrun_frames: map.underrun_frames,
        })
    }
}

// ---------------------------------------------------------------------------
// Consumer half
// ---------------------------------------------------------------------------

/// Render-side view of the ring. Exactly one exists per session.
///
/// Every method is wait-free, allocation-free and panic-free.
#[derive(Debug)]
pub struct RingConsumer<S: Sample> {
    ring: SharedRing<S>,
    slots: Slots,
    capacity: usize,
    channels: usize,
}

impl<S: Sample> RingConsumer<S> {
    /// Validate `config` against `ring` and build the consumer view.
    pub fn new(ring: SharedRing<S>, config: &SessionConfig) -> Result<Self, LayoutMismatch> {
        let slots = Slots::resolve(&ring, config)?;
        Ok(Self {
            ring,
            slots,
            capacity: config.buffer_capacity_frames,
            channels: config.channels,
        })
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn read_index(&self) -> usize {
        self.ring
            .state(self.slots.read_index)
            .load(Ordering::Acquire)
    }

    pub fn samples_available(&self) -> usize {
        self.ring
            .state(self.slots.samples_available)
            .load(Ordering::Acquire)
    }

    /// Copy `frames` frames starting at `READ_INDEX` into `dest` in logical
    /// order and advance `READ_INDEX`.
    ///
    /// `frames` is clamped to the capacity and to what `dest` can hold.
    /// Returns the number of frames copied.
    pub fn read(&mut self, dest: &mut [S], frames: usize) -> usize {
        let ch = self.channels;
        let capacity = self.capacity;
        let frames = frames.min(capacity).min(dest.len() / ch);
        if frames == 0 {
            return 0;
        }

        let read_idx = self.read_index() % capacity;
        let next_idx = read_idx + frames;
        let dest = &mut dest[..frames * ch];

        let new_idx = if next_idx < capacity {
            self.ring.copy_out(read_idx * ch, dest);
            next_idx
        } else {
            let overflow = next_idx - capacity;
            let (tail, head) = dest.split_at_mut((capacity - read_idx) * ch);
            self.ring.copy_out(read_idx * ch, tail);
            self.ring.copy_out(0, head);
            overflow
        };

        self.ring
            .state(self.slots.read_index)
            .store(new_idx, Ordering::Release);
        frames
    }

    /// Set `REQUEST_RENDER` and wake the producer when `observed_available`
    /// leaves room. Returns whether a request was raised.
    pub fn request_if_room(&self, observed_available: usize) -> bool {
        if observed_available < self.capacity {
            self.ring
                .state(self.slots.request_render)
                .store(1, Ordering::Release);
            // Pairs with the fence in `RingProducer::wait_for_request`.
            fence(Ordering::SeqCst);
            self.ring.signal().notify();
            true
        } else {
            false
        }
    }

    /// One render cycle: copy up to `frames` published frames into `output`,
    /// raise backpressure from the pre-decrement count, then retire them.
    ///
    /// Only frames counted in `SAMPLES_AVAILABLE` are read, so `READ_INDEX`
    /// advances by exactly the number retired and
    /// `READ_INDEX + SAMPLES_AVAILABLE` stays equal to the producer's write
    /// offset (mod C). Any shortfall is filled with silence and added to
    /// `UNDERRUN_FRAMES`. Returns the frames written to `output`, silence
    /// included.
    pub fn render_block(&mut self, output: &mut [S], frames: usize) -> usize {
        let available = self.samples_available();
        let ch = self.channels;

        let frames = frames.min(output.len() / ch);
        let take = frames.min(available);
        let done = self.read(&mut output[..take * ch], take);
        output[done * ch..frames * ch].fill(S::EQUILIBRIUM);

        self.request_if_room(available);

        if done > 0 {
            self.ring
                .state(self.slots.samples_available)
                .fetch_sub(done, Ordering::Release);
        }
        if frames > done {
            self.ring
                .state(self.slots.underrun_frames)
                .fetch_add(frames - done, Ordering::Relaxed);
        }
        frames
    }
}

// ---------------------------------------------------------------------------
// Producer half
// ---------------------------------------------------------------------------

/// Feeder-side view of the ring. Exactly one exists per session.
#[derive(Debug)]
pub struct RingProducer<S: Sample> {
    ring: SharedRing<S>,
    slots: Slots,
    capacity: usize,
    channels: usize,
    /// Next frame to fill. Private: only this half ever needs it.
    write_offset: usize,
}

impl<S: Sample> RingProducer<S> {
    pub fn new(ring: SharedRing<S>, config: &SessionConfig) -> Result<Self, LayoutMismatch> {
        let slots = Slots::resolve(&ring, config)?;
        Ok(Self {
            ring,
            slots,
            capacity: config.buffer_capacity_frames,
            channels: config.channels,
            write_offset: 0,
        })
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn write_offset(&self) -> usize {
        self.write_offset
    }

    pub fn samples_available(&self) -> usize {
        self.ring
            .state(self.slots.samples_available)
            .load(Ordering::Acquire)
    }

    /// Frames that can be written without overtaking the reader.
    pub fn free_frames(&self) -> usize {
        self.capacity.saturating_sub(self.samples_available())
    }

    pub fn underrun_frames(&self) -> usize {
        self.ring
            .state(self.slots.underrun_frames)
            .load(Ordering::Relaxed)
    }

    /// Append whole frames from interleaved `source` at the write offset,
    /// wrapping modulo the capacity, then publish them by incrementing
    /// `SAMPLES_AVAILABLE`.
    ///
    /// The count is clamped to the free room, so `SAMPLES_AVAILABLE` never
    /// exceeds the capacity. Returns the number of frames written.
    pub fn write(&mut self, source: &[S]) -> usize {
        let ch = self.channels;
        let frames = (source.len() / ch).min(self.free_frames());
        if frames == 0 {
            return 0;
        }

        let first = frames.min(self.capacity - self.write_offset);
        let second = frames - first;
        self.ring
            .copy_in(self.write_offset * ch, &source[..first * ch]);
        if second > 0 {
            self.ring.copy_in(0, &source[first * ch..frames * ch]);
        }

        self.write_offset = (self.write_offset + frames) % self.capacity;
        self.ring
            .state(self.slots.samples_available)
            .fetch_add(frames, Ordering::Release);
        frames
    }

    pub fn request_pending(&self) -> bool {
        self.ring
            .state(self.slots.request_render)
            .load(Ordering::Acquire)
            != 0
    }

    pub fn clear_request(&self) {
        self.ring
            .state(self.slots.request_render)
            .store(0, Ordering::Release);
    }

    /// Block until the render side raises `REQUEST_RENDER` or `running`
    /// drops. Returns `false` when the session has ended.
    pub fn wait_for_request(&self, running: &AtomicBool) -> bool {
        self.ring.signal().register();
        fence(Ordering::SeqCst);
        loop {
            if !running.load(Ordering::Acquire) {
                return false;
            }
            if self.request_pending() {
                return true;
            }
            self.ring.signal().park();
        }
    }

    /// Wake this producer's thread, e.g. after clearing `running`.
    pub fn wake(&self) {
        self.ring.signal().notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::StateIndexMap;
    use std::thread;

    fn pair(capacity: usize, channels: usize) -> (RingProducer<f32>, RingConsumer<f32>) {
        let config = SessionConfig::new(capacity, channels);
        let ring = AudioRingBuffer::shared(&config).expect("allocate ring");
        (
            RingProducer::new(Arc::clone(&ring), &config).expect("producer"),
            RingConsumer::new(ring, &config).expect("consumer"),
        )
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn wraparound_splits_tail_and_head() {
        // C=10, READ_INDEX=8, L=4 → tail [8,10) ++ head [0,2), new index 2.
        let (mut prod, mut cons) = pair(10, 1);
        assert_eq!(prod.write(&ramp(10)), 10);

        let mut skip = [0.0f32; 8];
        assert_eq!(cons.read(&mut skip, 8), 8);
        assert_eq!(cons.read_index(), 8);

        let mut out = [-1.0f32; 4];
        assert_eq!(cons.read(&mut out, 4), 4);
        assert_eq!(out, [8.0, 9.0, 0.0, 1.0]);
        assert_eq!(cons.read_index(), 2);
    }

    #[test]
    fn exact_end_boundary_wraps_to_zero_with_empty_head() {
        let (mut prod, mut cons) = pair(8, 1);
        prod.write(&ramp(8));

        let mut first = [0.0f32; 5];
        cons.read(&mut first, 5);

        let mut out = [-1.0f32; 4];
        assert_eq!(cons.read(&mut out[..3], 3), 3);
        assert_eq!(&out[..3], &[5.0, 6.0, 7.0]);
        assert_eq!(out[3], -1.0, "nothing written past the request");
        assert_eq!(cons.read_index(), 0);
    }

    #[test]
    fn read_yields_logical_order_for_every_start_and_length() {
        for capacity in 1..=9usize {
            for start in 0..capacity {
                for len in 1..=capacity {
                    let (mut prod, mut cons) = pair(capacity, 1);
                    prod.write(&ramp(capacity));
                    let mut scratch = vec![0.0f32; capacity];
                    if start > 0 {
                        cons.read(&mut scratch, start);
                    }

                    let mut out = vec![0.0f32; len];
                    assert_eq!(cons.read(&mut out, len), len);
                    let expected: Vec<f32> =
                        (0..len).map(|k| ((start + k) % capacity) as f32).collect();
                    assert_eq!(out, expected, "C={capacity} r={start} L={len}");
                    assert_eq!(cons.read_index(), (start + len) % capacity);
                }
            }
        }
    }

    #[test]
    fn interleaved_frames_stay_together_across_the_wrap() {
        let (mut prod, mut cons) = pair(3, 2);
        assert_eq!(prod.write(&[0.0, 0.5, 1.0, 1.5, 2.0, 2.5]), 3);

        let mut out = [0.0f32; 4];
        cons.render_block(&mut out, 2);
        assert_eq!(out, [0.0, 0.5, 1.0, 1.5]);

        assert_eq!(prod.write(&[3.0, 3.5, 4.0, 4.5]), 2);
        let mut out = [0.0f32; 6];
        cons.render_block(&mut out, 3);
        assert_eq!(out, [2.0, 2.5, 3.0, 3.5, 4.0, 4.5]);
    }

    #[test]
    fn backpressure_uses_count_before_decrement() {
        let (mut prod, mut cons) = pair(4, 1);
        prod.write(&ramp(4));
        let mut out = [0.0f32; 2];

        // Full at the start of the cycle: no request even though 2 frames drain.
        cons.render_block(&mut out, 2);
        assert!(!prod.request_pending());
        assert_eq!(prod.samples_available(), 2);

        cons.render_block(&mut out, 2);
        assert!(prod.request_pending());
        assert_eq!(prod.samples_available(), 0);

        prod.clear_request();
        assert!(!prod.request_pending());
    }

    #[test]
    fn decrement_is_clamped_and_shortfall_counted() {
        let (mut prod, mut cons) = pair(8, 1);
        prod.write(&[5.0]);

        let mut out = [9.0f32; 4];
        assert_eq!(cons.render_block(&mut out, 4), 4);
        assert_eq!(out, [5.0, 0.0, 0.0, 0.0]);
        assert_eq!(cons.samples_available(), 0);
        assert_eq!(cons.read_index(), 1, "only the published frame is retired");
        assert_eq!(prod.underrun_frames(), 3);

        // Nothing available: no decrement, no movement, whole block counted.
        cons.render_block(&mut out, 4);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(cons.samples_available(), 0);
        assert_eq!(cons.read_index(), 1);
        assert_eq!(prod.underrun_frames(), 7);
    }

    #[test]
    fn stream_stays_in_order_after_an_underrun() {
        let (mut prod, mut cons) = pair(8, 1);
        let mut out = [9.0f32; 4];

        // Host starts pulling before anything is published.
        cons.render_block(&mut out, 4);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(cons.read_index(), 0);
        assert_eq!(prod.write_offset(), 0);

        assert_eq!(prod.write(&[10.0, 11.0, 12.0, 13.0]), 4);
        cons.render_block(&mut out, 4);
        assert_eq!(out, [10.0, 11.0, 12.0, 13.0]);

        // Partial block, then the rest arrives and follows on directly.
        prod.write(&[14.0]);
        cons.render_block(&mut out, 4);
        assert_eq!(out, [14.0, 0.0, 0.0, 0.0]);
        prod.write(&[15.0, 16.0, 17.0, 18.0, 19.0]);
        cons.render_block(&mut out, 4);
        assert_eq!(out, [15.0, 16.0, 17.0, 18.0]);
        cons.render_block(&mut out, 4);
        assert_eq!(out, [19.0, 0.0, 0.0, 0.0]);

        assert_eq!(
            (cons.read_index() + cons.samples_available()) % 8,
            prod.write_offset()
        );
        assert_eq!(prod.underrun_frames(), 4 + 3 + 3);
    }

    #[test]
    fn fixed_cadence_host_recovers_order_across_underruns() {
        const TOTAL: usize = 5_000;
        const BLOCK: usize = 32;
        let (mut prod, mut cons) = pair(64, 1);
        // Non-zero samples so silence is distinguishable.
        let source: Vec<f32> = (1..=TOTAL).map(|i| i as f32).collect();
        let expected = source.clone();

        let producer = thread::spawn(move || {
            let mut sent = 0;
            while sent < TOTAL {
                let end = (sent + 7).min(TOTAL);
                sent += prod.write(&source[sent..end]);
                thread::yield_now();
            }
        });

        let mut received = Vec::with_capacity(TOTAL);
        let mut block = [0.0f32; BLOCK];
        while received.len() < TOTAL {
            // Renders whatever the fill level; starved blocks are padded.
            cons.render_block(&mut block, BLOCK);
            received.extend(block.iter().copied().filter(|&s| s != 0.0));
        }
        producer.join().expect("producer thread panicked");

        assert_eq!(received, expected);
    }

    #[test]
    fn producer_increment_never_exceeds_capacity() {
        let (mut prod, _cons) = pair(512, 1);
        assert_eq!(prod.write(&ramp(600)), 512);
        assert_eq!(prod.samples_available(), 512);
        assert_eq!(prod.write(&ramp(88)), 0);
        assert_eq!(prod.samples_available(), 512);
    }

    #[test]
    fn corrupted_over_capacity_count_blocks_further_writes() {
        let config = SessionConfig::new(512, 1);
        let ring = AudioRingBuffer::<f32>::shared(&config).expect("ring");
        let mut prod = RingProducer::new(Arc::clone(&ring), &config).expect("producer");

        ring.state_slot(config.state_index_map.samples_available)
            .expect("slot")
            .store(600, Ordering::Release);
        assert_eq!(prod.free_frames(), 0);
        assert_eq!(prod.write(&ramp(16)), 0);
        assert_eq!(prod.samples_available(), 600);
    }

    #[test]
    fn oversized_request_never_replays_retired_frames() {
        let (mut prod, mut cons) = pair(4, 1);
        prod.write(&ramp(4));

        let mut out = [9.0f32; 6];
        assert_eq!(cons.render_block(&mut out, 6), 6);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 0.0, 0.0]);
        assert_eq!(cons.read_index(), 0);
        assert_eq!(prod.underrun_frames(), 2);
    }

    #[test]
    fn short_destination_never_panics() {
        let (_prod, mut cons) = pair(4, 2);
        let mut out = [0.0f32; 3];
        assert_eq!(cons.render_block(&mut out, 128), 1);
    }

    #[test]
    fn custom_index_map_addresses_the_right_slots() {
        let mut config = SessionConfig::new(4, 1);
        config.state_index_map = StateIndexMap {
            read_index: 3,
            samples_available: 2,
            request_render: 1,
            underrun_frames: 0,
        };
        let ring = AudioRingBuffer::<f32>::shared(&config).expect("ring");
        let mut prod = RingProducer::new(Arc::clone(&ring), &config).expect("producer");
        let mut cons = RingConsumer::new(Arc::clone(&ring), &config).expect("consumer");

        prod.write(&ramp(3));
        let mut out = [0.0f32; 2];
        cons.render_block(&mut out, 2);

        let slot = |i| ring.state_slot(i).expect("slot").load(Ordering::Acquire);
        assert_eq!(slot(3), 2, "read index");
        assert_eq!(slot(2), 1, "samples available");
        assert_eq!(slot(1), 1, "request render");
    }

    #[test]
    fn spsc_round_trip_preserves_order_exactly_once() {
        const TOTAL: usize = 20_000;
        const BLOCK: usize = 64;
        let (mut prod, mut cons) = pair(256, 1);
        let source = ramp(TOTAL);

        let producer = thread::spawn(move || {
            let mut sent = 0;
            while sent < TOTAL {
                let end = (sent + BLOCK).min(TOTAL);
                sent += prod.write(&source[sent..end]);
                thread::yield_now();
            }
        });

        let mut received = Vec::with_capacity(TOTAL);
        let mut block = [0.0f32; BLOCK];
        while received.len() < TOTAL {
            // Paced host: only render once a full block is published.
            if cons.samples_available() < BLOCK {
                thread::yield_now();
                continue;
            }
            cons.render_block(&mut block, BLOCK);
            received.extend_from_slice(&block);
        }
        producer.join().expect("producer thread panicked");

        assert_eq!(received, ramp(TOTAL));
    }

    #[test]
    fn wait_for_request_returns_on_render_and_on_stop() {
        let (prod, mut cons) = pair(4, 1);
        let running = Arc::new(AtomicBool::new(true));

        let waiter = {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let first = prod.wait_for_request(&running);
                prod.clear_request();
                let second = prod.wait_for_request(&running);
                (first, second)
            })
        };

        let mut out = [0.0f32; 1];
        cons.render_block(&mut out, 1);

        // Give the waiter time to clear, then end the session.
        while cons.ring.state(cons.slots.request_render).load(Ordering::Acquire) != 0 {
            thread::yield_now();
        }
        running.store(false, Ordering::Release);
        cons.ring.signal().notify();

        let (first, second) = waiter.join().expect("waiter panicked");
        assert!(first);
        assert!(!second);
    }
}
