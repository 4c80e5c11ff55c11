//! Real-time render side.
//!
//! # Design constraints
//!
//! [`RenderCallback::render`] runs on the host's audio thread under a hard
//! deadline. It **must not**:
//! - Allocate heap memory
//! - Block on a mutex, condvar or channel
//! - Panic
//!
//! A violation shows up as an audible dropout, not a crash. The processor
//! satisfies this by reading through [`RingConsumer`] (atomics only) and by
//! polling its control port with `try_recv`.

use std::sync::Arc;

use tracing::warn;

use crate::{
    buffering::{RingConsumer, Sample},
    ipc::{InitPayload, ProcessorEvent, ProcessorMessage, ProcessorPort},
};

/// The single capability a host needs from a render entry point.
pub trait RenderCallback<S: Sample = f32>: Send + 'static {
    /// Fill `output` with `frames` interleaved frames.
    ///
    /// Returns the keep-alive signal; `true` means "keep invoking me".
    fn render(&mut self, output: &mut [S], frames: usize) -> bool;
}

/// Processor lifecycle. There is no way back from `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Uninitialized,
    Ready,
}

/// Drains the shared ring into the host's output buffer.
///
/// Starts `Uninitialized`; the first valid `init` message from its port moves
/// it to `Ready` and sends `ready` back.
pub struct InjectorProcessor<S: Sample = f32> {
    port: ProcessorPort<S>,
    consumer: Option<RingConsumer<S>>,
}

impl<S: Sample> InjectorProcessor<S> {
    pub fn new(port: ProcessorPort<S>) -> Self {
        Self {
            port,
            consumer: None,
        }
    }

    pub fn state(&self) -> ProcessorState {
        if self.consumer.is_some() {
            ProcessorState::Ready
        } else {
            ProcessorState::Uninitialized
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ProcessorState::Ready
    }

    /// Channel count agreed at init, if initialised.
    pub fn channels(&self) -> Option<usize> {
        self.consumer.as_ref().map(RingConsumer::channels)
    }

    /// Apply every message waiting on the port.
    pub fn drain_port(&mut self) {
        while let Some(message) = self.port.try_recv() {
            self.handle_message(message);
        }
    }

    pub fn handle_message(&mut self, message: ProcessorMessage<S>) {
        match message {
            ProcessorMessage::Init(payload) => self.initialize(payload),
            ProcessorMessage::Unknown { kind } => {
                warn!(kind = kind.as_str(), "processor: unhandled message type");
            }
        }
    }

    fn initialize(&mut self, payload: InitPayload<S>) {
        if self.consumer.is_some() {
            warn!("processor: ignoring second init, session config is fixed");
            self.refuse(payload);
            return;
        }

        match RingConsumer::new(Arc::clone(&payload.shared_buffers), &payload.config) {
            Ok(consumer) => {
                self.consumer = Some(consumer);
                if !self.port.post(ProcessorEvent::Ready) {
                    warn!("processor: could not queue ready acknowledgement");
                }
            }
            Err(mismatch) => {
                warn!(error = %mismatch, "processor: rejected init message");
                self.refuse(payload);
            }
        }
    }

    /// Send a refused payload back so its buffers are released off this thread.
    fn refuse(&self, payload: InitPayload<S>) {
        if let Some(payload) = self.port.give_back(payload) {
            warn!("processor: return queue full, releasing refused init here");
            drop(payload);
        }
    }
}

impl<S: Sample> RenderCallback<S> for InjectorProcessor<S> {
    fn render(&mut self, output: &mut [S], frames: usize) -> bool {
        self.drain_port();

        // Not initialised: leave the output exactly as the host gave it.
        if let Some(consumer) = self.consumer.as_mut() {
            consumer.render_block(output, frames);
        }
        true
    }
}
