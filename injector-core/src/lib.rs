//! # injector-core
//!
//! Lock-free handoff of streamed, decoded audio into a real-time render callback.
//!
//! ## Architecture
//!
//! ```text
//! decoder → SampleSink → staging queue → feeder(spawn_blocking) → AudioRingBuffer
//!                                              ▲                         │
//!                                     REQUEST_RENDER               InjectorProcessor
//!                                              └──────── render ◄────────┘
//!                                                          │
//!                                                    host output (cpal)
//! ```
//!
//! The render callback is zero-alloc and lock-free. The two sides share only
//! the ring storage and a handful of atomic state slots; the session's control
//! channel carries the one-time `init`/`ready` handshake.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod ipc;
pub mod render;
pub mod session;

// Convenience re-exports for downstream crates
pub use audio::{device::list_output_devices, AudioOutput};
pub use buffering::{chunk::DecodedChunk, Sample, SessionConfig, StateIndexMap};
pub use error::InjectorError;
pub use ipc::events::{SessionStatus, SessionStatusEvent};
pub use render::{InjectorProcessor, RenderCallback};
pub use session::{feeder::DiagnosticsSnapshot, sink::SampleSink, InjectorConfig, InjectorSession};
