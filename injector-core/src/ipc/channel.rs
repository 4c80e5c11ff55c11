//! Bounded two-way control channel between the owning context and the
//! render processor.
//!
//! Both directions are `crossbeam_channel::bounded` (array flavour): `try_send`
//! and `try_recv` never block and never allocate, so the processor side can be
//! polled from the render callback.
//!
//! A third queue carries rejected `init` payloads back to the owner, so the
//! buffer handles they hold are never released on the render thread.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::{
    buffering::Sample,
    error::{InjectorError, Result},
    ipc::messages::{InitPayload, ProcessorEvent, ProcessorMessage},
};

/// Messages that may be queued in either direction before the peer drains them.
pub const CONTROL_QUEUE_DEPTH: usize = 8;

/// Create a connected pair of ports.
pub fn control_channel<S: Sample>() -> (OwnerPort<S>, ProcessorPort<S>) {
    let (to_processor, from_owner) = bounded(CONTROL_QUEUE_DEPTH);
    let (to_owner, from_processor) = bounded(CONTROL_QUEUE_DEPTH);
    let (give_back, returned) = bounded(CONTROL_QUEUE_DEPTH);
    (
        OwnerPort {
            to_processor,
            from_processor,
            returned,
        },
        ProcessorPort {
            from_owner,
            to_owner,
            give_back,
        },
    )
}

/// Non-real-time end, held by the session.
#[derive(Debug)]
pub struct OwnerPort<S: Sample> {
    to_processor: Sender<ProcessorMessage<S>>,
    from_processor: Receiver<ProcessorEvent>,
    returned: Receiver<InitPayload<S>>,
}

impl<S: Sample> OwnerPort<S> {
    /// Queue a message for the processor.
    ///
    /// # Errors
    /// `ChannelClosed` when the processor was dropped, or when it has stopped
    /// draining and the queue is full.
    pub fn post(&self, message: ProcessorMessage<S>) -> Result<()> {
        self.to_processor.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) | TrySendError::Disconnected(_) => InjectorError::ChannelClosed,
        })
    }

    /// Wait up to `timeout` for the next event. `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ProcessorEvent>> {
        match self.from_processor.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(InjectorError::ChannelClosed),
        }
    }

    /// Take back init payloads the processor refused. Dropping them here
    /// keeps buffer deallocation on the owner's thread.
    pub fn reclaim(&self) -> Vec<InitPayload<S>> {
        self.returned.try_iter().collect()
    }
}

/// Real-time end, owned by the processor.
#[derive(Debug)]
pub struct ProcessorPort<S: Sample> {
    from_owner: Receiver<ProcessorMessage<S>>,
    to_owner: Sender<ProcessorEvent>,
    give_back: Sender<InitPayload<S>>,
}

impl<S: Sample> ProcessorPort<S> {
    /// Next pending message, if any. Never blocks.
    #[inline]
    pub fn try_recv(&self) -> Option<ProcessorMessage<S>> {
        self.from_owner.try_recv().ok()
    }

    /// Send an event without blocking. Returns `false` if it could not be queued.
    #[inline]
    pub fn post(&self, event: ProcessorEvent) -> bool {
        self.to_owner.try_send(event).is_ok()
    }

    /// Hand a refused payload back to the owner without blocking.
    ///
    /// Returns the payload if the queue is full or the owner is gone; the
    /// caller decides where it gets dropped.
    #[inline]
    pub fn give_back(&self, payload: InitPayload<S>) -> Option<InitPayload<S>> {
        self.give_back.try_send(payload).err().map(|e| e.into_inner())
    }
}
