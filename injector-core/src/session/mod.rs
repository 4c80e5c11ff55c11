//! `InjectorSession`: owning context and lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! InjectorSession::new()
//!     ├─► take_processor()  → register with the host output (render starts polling)
//!     ├─► take_sink()       → hand to the decoder thread
//!     └─► initialize()      → init sent, blocks for "ready", status = Ready
//!         └─► start()       → feeder spawned, status = Streaming
//!             └─► stop()    → feeder woken and exits, status = Stopped
//! ```
//!
//! The session owns the shared ring for its whole life. Detach the processor
//! from the host (drop the output stream) before dropping the session.

pub mod feeder;
pub mod sink;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    buffering::{
        create_staging_queue, AudioRingBuffer, RingProducer, Sample, SessionConfig, SharedRing,
    },
    error::{InjectorError, Result},
    ipc::{
        control_channel,
        events::{SessionStatus, SessionStatusEvent},
        OwnerPort, ProcessorEvent, ProcessorMessage,
    },
    render::InjectorProcessor,
};

use feeder::{DiagnosticsSnapshot, FeederContext, FeederDiagnostics};
use sink::SampleSink;

/// Status broadcast capacity.
const BROADCAST_CAP: usize = 64;

/// Configuration for `InjectorSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct InjectorConfig {
    /// Shared ring capacity in frames. Default: 88 200 (2 s at 44.1 kHz).
    pub capacity_frames: usize,
    /// Interleaved channels per frame. Default: 1.
    pub channels: usize,
    /// Frames the host requests per render call. Informational; the
    /// processor serves whatever the host asks for. Default: 128.
    pub render_quantum: usize,
    /// Decoded frames that may wait in the staging queue. Default: 2^18.
    pub staging_capacity_frames: usize,
    /// How long `initialize()` waits for the processor's `ready`. Default: 2000.
    pub init_timeout_ms: u64,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            capacity_frames: 44_100 * 2,
            channels: 1,
            render_quantum: 128,
            staging_capacity_frames: 1 << 18,
            init_timeout_ms: 2_000,
        }
    }
}

impl InjectorConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.capacity_frames, self.channels)
    }

    pub fn validate(&self) -> Result<()> {
        if self.render_quantum == 0 {
            return Err(InjectorError::InvalidConfig(
                "render quantum must be non-zero".into(),
            ));
        }
        if self.render_quantum > self.capacity_frames {
            return Err(InjectorError::InvalidConfig(format!(
                "render quantum {} exceeds ring capacity {}",
                self.render_quantum, self.capacity_frames
            )));
        }
        if self.staging_capacity_frames == 0 {
            return Err(InjectorError::InvalidConfig(
                "staging capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// The owning side of one streaming session.
///
/// `Send + Sync`; wrap in `Arc` to share with status-forwarding tasks.
pub struct InjectorSession<S: Sample = f32> {
    config: InjectorConfig,
    session_config: SessionConfig,
    ring: SharedRing<S>,
    port: OwnerPort<S>,
    processor: Mutex<Option<InjectorProcessor<S>>>,
    sink: Mutex<Option<SampleSink<S>>>,
    /// Held until `start()` moves it onto the feeder thread.
    feeder: Mutex<Option<FeederContext<S>>>,
    running: Arc<AtomicBool>,
    initialized: AtomicBool,
    status: Arc<Mutex<SessionStatus>>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    diagnostics: Arc<FeederDiagnostics>,
}

impl<S: Sample> InjectorSession<S> {
    /// Allocate the shared ring, the session config and the control channel.
    pub fn new(config: InjectorConfig) -> Result<Self> {
        config.validate()?;
        let session_config = config.session_config();
        let ring = AudioRingBuffer::<S>::shared(&session_config)?;

        let (port, processor_port) = control_channel::<S>();
        let (staging_tx, staging_rx) =
            create_staging_queue::<S>(config.staging_capacity_frames * config.channels);
        let diagnostics = Arc::new(FeederDiagnostics::default());
        let running = Arc::new(AtomicBool::new(false));

        let feeder = FeederContext {
            producer: RingProducer::new(Arc::clone(&ring), &session_config)?,
            staging: staging_rx,
            running: Arc::clone(&running),
            diagnostics: Arc::clone(&diagnostics),
        };
        let sink = SampleSink::new(staging_tx, config.channels, Arc::clone(&diagnostics));
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        info!(
            capacity_frames = session_config.buffer_capacity_frames,
            channels = session_config.channels,
            "session buffers allocated"
        );

        Ok(Self {
            config,
            session_config,
            ring,
            port,
            processor: Mutex::new(Some(InjectorProcessor::new(processor_port))),
            sink: Mutex::new(Some(sink)),
            feeder: Mutex::new(Some(feeder)),
            running,
            initialized: AtomicBool::new(false),
            status: Arc::new(Mutex::new(SessionStatus::Idle)),
            status_tx,
            diagnostics,
        })
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    pub fn session_config(&self) -> SessionConfig {
        self.session_config
    }

    /// Hand out the render callback for registration with the host.
    pub fn take_processor(&self) -> Result<InjectorProcessor<S>> {
        self.processor
            .lock()
            .take()
            .ok_or(InjectorError::AlreadyTaken { what: "processor" })
    }

    /// Hand out the ingest handle for the decoder thread.
    pub fn take_sink(&self) -> Result<SampleSink<S>> {
        self.sink
            .lock()
            .take()
            .ok_or(InjectorError::AlreadyTaken { what: "sample sink" })
    }

    /// Send `init` and block until the processor answers `ready`.
    ///
    /// The processor only reads its port while the host is invoking it, so
    /// register it and start the host stream first. Idempotent once ready.
    ///
    /// # Errors
    /// - `HandshakeTimeout` if no `ready` arrives within `init_timeout_ms`.
    /// - `ChannelClosed` if the processor was dropped.
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        self.set_status(SessionStatus::Initializing, None);
        if let Err(e) = self.port.post(ProcessorMessage::init(
            Arc::clone(&self.ring),
            self.session_config,
        )) {
            self.set_status(SessionStatus::Error, Some(e.to_string()));
            return Err(e);
        }

        let timeout = Duration::from_millis(self.config.init_timeout_ms);
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.port.recv_timeout(remaining) {
                Ok(Some(ProcessorEvent::Ready)) => {
                    self.initialized.store(true, Ordering::Release);
                    self.set_status(SessionStatus::Ready, None);
                    info!(
                        capacity_frames = self.session_config.buffer_capacity_frames,
                        channels = self.session_config.channels,
                        "processor acknowledged init"
                    );
                    return Ok(());
                }
                Ok(Some(ProcessorEvent::Unknown)) => {
                    warn!("session: unhandled processor event");
                }
                Ok(None) => {
                    let refused = self.port.reclaim();
                    let err = if refused.is_empty() {
                        InjectorError::HandshakeTimeout {
                            timeout_ms: self.config.init_timeout_ms,
                        }
                    } else {
                        InjectorError::InvalidConfig("processor refused the session layout".into())
                    };
                    self.set_status(SessionStatus::Error, Some(err.to_string()));
                    return Err(err);
                }
                Err(e) => {
                    self.set_status(SessionStatus::Error, Some(e.to_string()));
                    return Err(e);
                }
            }
        }
    }

    /// Spawn the feeder on Tokio's blocking pool.
    ///
    /// # Errors
    /// - `NotInitialized` before a successful `initialize()`.
    /// - `AlreadyRunning` / `SessionEnded` on a second start.
    pub fn start(&self) -> Result<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(InjectorError::NotInitialized);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(InjectorError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("start() needs a Tokio runtime: {e}"))?;
        let ctx = self.feeder.lock().take().ok_or(InjectorError::SessionEnded)?;

        self.running.store(true, Ordering::SeqCst);
        runtime.spawn_blocking(move || feeder::run(ctx));

        self.set_status(SessionStatus::Streaming, None);
        info!("session streaming");
        Ok(())
    }

    /// Stop the feeder. The render side keeps running until the host
    /// detaches it.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(InjectorError::NotRunning);
        }
        self.running.store(false, Ordering::SeqCst);
        self.ring.signal().notify();
        self.set_status(SessionStatus::Stopped, None);
        info!("session stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Frames written but not yet rendered.
    pub fn buffer_level_frames(&self) -> usize {
        self.state(self.session_config.state_index_map.samples_available)
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        let map = self.session_config.state_index_map;
        DiagnosticsSnapshot {
            wakeups: self.diagnostics.wakeups.load(Ordering::Relaxed),
            starved_wakeups: self.diagnostics.starved_wakeups.load(Ordering::Relaxed),
            frames_staged: self.diagnostics.frames_staged.load(Ordering::Relaxed),
            frames_dropped: self.diagnostics.frames_dropped.load(Ordering::Relaxed),
            frames_written: self.diagnostics.frames_written.load(Ordering::Relaxed),
            underrun_frames: self.state(map.underrun_frames),
            buffer_level_frames: self.state(map.samples_available),
            read_index: self.state(map.read_index),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn state(&self, slot: usize) -> usize {
        self.ring
            .state_slot(slot)
            .map(|s| s.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    fn set_status(&self, new_status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(SessionStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl<S: Sample> Drop for InjectorSession<S> {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.ring.signal().notify();
        }
    }
}
