//! Messages exchanged over the control channel.
//!
//! | Direction | Message | Wire form |
//! |-----------|---------|-----------|
//! | owner → processor | [`ProcessorMessage::Init`] | `{"type":"init","payload":{"sharedBuffers":…,"config":…}}` |
//! | processor → owner | [`ProcessorEvent::Ready`] | `{"type":"ready"}` |
//!
//! The init payload carries live `Arc` handles and therefore only travels
//! in-process; its `config` half has a JSON form (see [`SessionConfig`]).
//! Acknowledgements are plain JSON so a foreign processor can answer too.

use serde::{Deserialize, Serialize};

use crate::buffering::{Sample, SessionConfig, SharedRing};

/// Buffer handles plus the geometry that describes them.
pub struct InitPayload<S: Sample> {
    pub shared_buffers: SharedRing<S>,
    pub config: SessionConfig,
}

impl<S: Sample> std::fmt::Debug for InitPayload<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitPayload")
            .field("sample_len", &self.shared_buffers.sample_len())
            .field("config", &self.config)
            .finish()
    }
}

/// Owner → processor.
#[derive(Debug)]
pub enum ProcessorMessage<S: Sample> {
    Init(InitPayload<S>),
    /// Anything this build does not understand. Logged and ignored.
    Unknown { kind: String },
}

impl<S: Sample> ProcessorMessage<S> {
    pub fn init(shared_buffers: SharedRing<S>, config: SessionConfig) -> Self {
        Self::Init(InitPayload {
            shared_buffers,
            config,
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Init(_) => "init",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Processor → owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProcessorEvent {
    /// One-time acknowledgement that the processor applied the init config.
    Ready,
    #[serde(other)]
    Unknown,
}

impl ProcessorEvent {
    /// Decode an acknowledgement from its JSON wire form.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
