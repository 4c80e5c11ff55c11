//! Blocking producer loop.
//!
//! ## Per wake-up
//!
//! ```text
//! 1. Move staged whole frames into the ring, up to its free room
//! 2. Clear REQUEST_RENDER
//! 3. Note underrun transitions reported by the render side
//! 4. Park until the render side raises REQUEST_RENDER again (or the session stops)
//! ```
//!
//! Runs inside `spawn_blocking`; the render thread never waits on it.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use tracing::{debug, info, info_span, warn};

use crate::buffering::{Consumer, Observer, RingProducer, Sample, StagingConsumer};

/// Counters shared by the sink, the feeder and the session.
#[derive(Debug, Default)]
pub struct FeederDiagnostics {
    pub wakeups: AtomicUsize,
    pub starved_wakeups: AtomicUsize,
    pub frames_staged: AtomicUsize,
    pub frames_dropped: AtomicUsize,
    pub frames_written: AtomicUsize,
}

/// Point-in-time view of the session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub wakeups: usize,
    pub starved_wakeups: usize,
    pub frames_staged: usize,
    pub frames_dropped: usize,
    pub frames_written: usize,
    /// Wrapping count kept by the render side in the ring's state array.
    pub underrun_frames: usize,
    pub buffer_level_frames: usize,
    pub read_index: usize,
}

/// Everything the feeder owns, passed as one struct so the closure stays tidy.
pub struct FeederContext<S: Sample> {
    pub producer: RingProducer<S>,
    pub staging: StagingConsumer<S>,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<FeederDiagnostics>,
}

/// Run until `ctx.running` becomes false.
pub fn run<S: Sample>(mut ctx: FeederContext<S>) {
    let span = info_span!(
        "feeder",
        capacity_frames = ctx.producer.capacity_frames(),
        channels = ctx.producer.channels()
    );
    let _guard = span.enter();
    info!("feeder started");

    // Sized for one full ring so a single pass can always top it up.
    let scratch_len = ctx.producer.capacity_frames() * ctx.producer.channels();
    let mut scratch = vec![S::EQUILIBRIUM; scratch_len];
    let mut underrun_seen = ctx.producer.underrun_frames();
    let mut in_underrun = false;

    loop {
        fill(&mut ctx, &mut scratch);
        ctx.producer.clear_request();

        let underrun = ctx.producer.underrun_frames();
        if underrun != underrun_seen {
            if !in_underrun {
                warn!(
                    missing_frames = underrun.wrapping_sub(underrun_seen),
                    "render side ran dry"
                );
            }
            in_underrun = true;
            underrun_seen = underrun;
        } else if in_underrun {
            info!(total_underrun_frames = underrun, "render side recovered");
            in_underrun = false;
        }

        if !ctx.producer.wait_for_request(&ctx.running) {
            break;
        }
        ctx.diagnostics.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    info!(
        frames_written = ctx.diagnostics.frames_written.load(Ordering::Relaxed),
        wakeups = ctx.diagnostics.wakeups.load(Ordering::Relaxed),
        "feeder stopped"
    );
}

/// One top-up pass. Returns frames written.
fn fill<S: Sample>(ctx: &mut FeederContext<S>, scratch: &mut [S]) -> usize {
    let ch = ctx.producer.channels();
    let room = ctx.producer.free_frames();
    let staged = ctx.staging.occupied_len() / ch;
    let frames = room.min(staged);

    if frames == 0 {
        if staged == 0 {
            ctx.diagnostics
                .starved_wakeups
                .fetch_add(1, Ordering::Relaxed);
        }
        return 0;
    }

    let popped = ctx.staging.pop_slice(&mut scratch[..frames * ch]);
    let written = ctx.producer.write(&scratch[..popped]);
    if written * ch != popped {
        // Room only grows between the check above and the write.
        warn!(popped, written, "feeder wrote fewer frames than it staged");
    }
    debug!(written, room, staged, "ring topped up");
    ctx.diagnostics
        .frames_written
        .fetch_add(written, Ordering::Relaxed);
    written
}
