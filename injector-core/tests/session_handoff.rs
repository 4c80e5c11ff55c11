use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use injector_core::{
    DecodedChunk, InjectorConfig, InjectorError, InjectorProcessor, InjectorSession,
    RenderCallback, SessionStatus, SessionStatusEvent,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

const QUANTUM: usize = 128;

fn config() -> InjectorConfig {
    InjectorConfig {
        capacity_frames: 512,
        channels: 1,
        render_quantum: QUANTUM,
        staging_capacity_frames: 8_192,
        init_timeout_ms: 2_000,
    }
}

/// A host that only pulls a quantum once the ring can serve it in full.
///
/// Before `ready` it makes zero-frame calls so the init message is
/// picked up without retiring anything.
fn paced_host(
    session: Arc<InjectorSession>,
    mut processor: InjectorProcessor,
    wanted: usize,
) -> thread::JoinHandle<Vec<f32>> {
    thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut out = [0.0f32; QUANTUM];
        let mut collected = Vec::with_capacity(wanted);
        loop {
            assert!(Instant::now() < deadline, "host timed out");
            if !processor.is_ready() {
                processor.render(&mut out, 0);
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            if collected.len() >= wanted {
                break;
            }
            if session.buffer_level_frames() < QUANTUM {
                thread::yield_now();
                continue;
            }
            assert!(processor.render(&mut out, QUANTUM));
            collected.extend_from_slice(&out);
        }
        collected
    })
}

fn recv_status_with_timeout(
    rx: &mut broadcast::Receiver<SessionStatusEvent>,
    timeout: Duration,
) -> SessionStatusEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for status event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("status channel closed unexpectedly"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streamed_samples_arrive_in_order_exactly_once() {
    let session = Arc::new(InjectorSession::<f32>::new(config()).expect("session"));
    let processor = session.take_processor().expect("processor");
    let mut sink = session.take_sink().expect("sink");

    // Several ring-fulls, so the write offset wraps repeatedly.
    let source: Vec<f32> = (0..4_096).map(|i| i as f32).collect();
    for block in source.chunks(1_000) {
        let chunk = DecodedChunk::new(block.to_vec(), 1, 44_100);
        sink.push_chunk(&chunk).expect("staging has room");
    }

    let host = paced_host(Arc::clone(&session), processor, source.len());
    session.initialize().expect("handshake");
    session.start().expect("start");

    let collected = host.join().expect("host panicked");
    assert_eq!(collected, source);

    let diag = session.diagnostics_snapshot();
    assert_eq!(diag.frames_staged, 4_096);
    assert_eq!(diag.frames_written, 4_096);
    assert_eq!(diag.frames_dropped, 0);
    assert_eq!(diag.underrun_frames, 0);
    assert_eq!(diag.buffer_level_frames, 0);
    assert_eq!(diag.read_index, 4_096 % 512);

    session.stop().expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_events_follow_the_lifecycle() {
    let session = Arc::new(InjectorSession::<f32>::new(config()).expect("session"));
    let mut rx = session.subscribe_status();
    assert_eq!(session.status(), SessionStatus::Idle);

    let processor = session.take_processor().expect("processor");
    let host = paced_host(Arc::clone(&session), processor, 0);
    session.initialize().expect("handshake");
    session.start().expect("start");
    session.stop().expect("stop");

    let timeout = Duration::from_secs(1);
    for expected in [
        SessionStatus::Initializing,
        SessionStatus::Ready,
        SessionStatus::Streaming,
        SessionStatus::Stopped,
    ] {
        assert_eq!(recv_status_with_timeout(&mut rx, timeout).status, expected);
    }
    assert_eq!(session.status(), SessionStatus::Stopped);

    // Zero-frame host exits immediately; the session is single-use.
    host.join().expect("host panicked");
    assert!(matches!(session.start(), Err(InjectorError::SessionEnded)));
}

/// Drive the handshake from a helper thread and hand the ready processor back.
fn handshake(session: &InjectorSession) -> InjectorProcessor {
    let mut processor = session.take_processor().expect("processor");
    let host = thread::spawn(move || {
        let mut out = [0.0f32; QUANTUM];
        while !processor.is_ready() {
            processor.render(&mut out, 0);
            thread::sleep(Duration::from_millis(1));
        }
        processor
    });
    session.initialize().expect("handshake");
    host.join().expect("host panicked")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rendering_an_empty_ring_is_counted_as_underrun() {
    let session = InjectorSession::<f32>::new(config()).expect("session");
    let mut processor = handshake(&session);
    session.start().expect("start");

    // Nothing staged: the ring stays empty and the block is all silence.
    let mut out = [9.0f32; QUANTUM];
    processor.render(&mut out, QUANTUM);
    assert!(out.iter().all(|&s| s == 0.0));

    // Nothing was retired, so the read side still sits at the write offset.
    let diag = session.diagnostics_snapshot();
    assert_eq!(diag.underrun_frames, QUANTUM);
    assert_eq!(diag.read_index, 0);
    assert_eq!(diag.buffer_level_frames, 0);
}

/// A host that renders a full quantum on a fixed cadence, whatever the ring
/// holds, the way a real device period does. Returns the non-silent samples.
fn fixed_cadence_host(
    mut processor: InjectorProcessor,
    wanted: usize,
) -> thread::JoinHandle<Vec<f32>> {
    thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut out = [0.0f32; QUANTUM];
        let mut heard = Vec::with_capacity(wanted);
        while heard.len() < wanted {
            assert!(Instant::now() < deadline, "host timed out");
            out.fill(0.0);
            assert!(processor.render(&mut out, QUANTUM));
            heard.extend(out.iter().copied().filter(|&s| s != 0.0));
            thread::sleep(Duration::from_micros(500));
        }
        heard
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fixed_cadence_host_hears_every_sample_in_order_despite_gaps() {
    let session = Arc::new(InjectorSession::<f32>::new(config()).expect("session"));
    let processor = session.take_processor().expect("processor");
    let mut sink = session.take_sink().expect("sink");

    // Non-zero values, so silence padding is distinguishable from audio.
    let source: Vec<f32> = (1..=4_096).map(|i| i as f32).collect();
    let host = fixed_cadence_host(processor, source.len());

    session.initialize().expect("handshake");
    session.start().expect("start");

    // Let the host run dry before anything is staged, then feed in bursts
    // that are shorter than the gaps between them.
    tokio::time::sleep(Duration::from_millis(20)).await;
    for block in source.chunks(300) {
        let chunk = DecodedChunk::new(block.to_vec(), 1, 44_100);
        sink.push_chunk(&chunk).expect("staging has room");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let heard = host.join().expect("host panicked");
    assert_eq!(heard, source);

    let diag = session.diagnostics_snapshot();
    assert!(diag.underrun_frames > 0);
    assert_eq!(diag.frames_written, source.len());
    assert_eq!(
        (diag.read_index + diag.buffer_level_frames) % 512,
        diag.frames_written % 512
    );

    session.stop().expect("stop");
}

#[test]
fn start_outside_a_runtime_is_an_error() {
    let session = InjectorSession::<f32>::new(config()).expect("session");
    let _processor = handshake(&session);

    assert!(matches!(session.start(), Err(InjectorError::Other(_))));
    assert!(!session.is_running());
}
