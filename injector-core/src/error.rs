use thiserror::Error;

use crate::buffering::LayoutMismatch;

/// All errors produced by injector-core.
#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Layout(#[from] LayoutMismatch),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("staging queue is full, producer cannot keep up")]
    StagingFull,

    #[error("chunk has {got} channels, session expects {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("render processor did not acknowledge init within {timeout_ms} ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("control channel closed")]
    ChannelClosed,

    #[error("{what} was already taken from this session")]
    AlreadyTaken { what: &'static str },

    #[error("session is not initialized")]
    NotInitialized,

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is not running")]
    NotRunning,

    #[error("session has ended and cannot be restarted")]
    SessionEnded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, InjectorError>;
