//! Control channel between the owning context and the render processor,
//! plus the status events the session broadcasts.

pub mod channel;
pub mod events;
pub mod messages;

pub use channel::{control_channel, OwnerPort, ProcessorPort};
pub use messages::{InitPayload, ProcessorEvent, ProcessorMessage};
