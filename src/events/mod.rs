//! Event layer: names, payloads, and the listener registry.
//!
//! Embedding code reacts to connection lifecycle and inbound game messages
//! through listeners registered here; it never touches the transport.

pub mod bus;
pub mod types;

pub use bus::{EventBus, Listener};
pub use types::{DisconnectReason, EventName, RelayEvent, StatusPhase};
