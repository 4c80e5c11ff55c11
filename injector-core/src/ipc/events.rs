//! Session status events for UI / host glue.
//!
//! Emitted on the session's `tokio::sync::broadcast` channel. Rendering them
//! (status labels, alerts) is the subscriber's business.

use serde::{Deserialize, Serialize};

/// Emitted whenever the session changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle of an injector session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Buffers allocated, processor not yet initialised.
    Idle,
    /// Init message sent, waiting for the processor's acknowledgement.
    Initializing,
    /// Processor acknowledged; feeder not running yet.
    Ready,
    /// Feeder running.
    Streaming,
    /// Feeder stopped; the session cannot be restarted.
    Stopped,
    /// Handshake failed.
    Error,
}
