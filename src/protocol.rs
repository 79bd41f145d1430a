//! Wire protocol: the double-nested `{id, data}` envelope.
//!
//! Every frame between relay and server is a JSON text message shaped
//! `{"id": <string>, "data": <any>}`. Frames with id `gm` carry a second
//! `{id, data}` envelope in their data: the application message forwarded
//! verbatim to or from the game server. The nesting is deliberate: it lets
//! the relay separate frames addressed to itself (`auth`, `chan_cfg`,
//! `server_info`) from game traffic without the server parsing relay-control
//! frames.
//!
//! Outbound frames are serialized from structs, not [`serde_json::Value`]
//! maps, so the `id` key always precedes `data` on the wire.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Transport ids the relay recognizes. Anything else is ignored so the
/// server side can extend the protocol independently of deployed clients.
pub mod frame_id {
    /// Client → server: authenticate this connection.
    pub const AUTH: &str = "auth";
    /// Both directions: forwarded game message, opaque to the relay.
    pub const GAME_MESSAGE: &str = "gm";
    /// Server → client: broadcaster customization and session metadata.
    pub const CHANNEL_CONFIG: &str = "chan_cfg";
    /// Server → client: connection/session metadata.
    pub const SERVER_INFO: &str = "server_info";
}

/// Outer wire envelope between relay and server, as received.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportEnvelope {
    /// Frame discriminator, see [`frame_id`].
    pub id: String,
    /// Frame payload; shape depends on `id`.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Inner envelope carried in a `gm` frame: one game-level message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEnvelope {
    /// Game-level message id.
    pub id: String,
    /// Game-level payload, never interpreted by the relay.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outbound frame with a borrowed id and a typed payload.
#[derive(Debug, Serialize)]
struct OutboundFrame<'a, T: Serialize> {
    id: &'a str,
    data: T,
}

/// Encodes the `auth` frame carrying the raw credential string:
/// `{"id":"auth","data":"<credential>"}`.
///
/// # Errors
///
/// Returns [`RelayError::ProtocolViolation`] if serialization fails, which
/// cannot happen for string payloads.
pub fn encode_auth_frame(raw_credential: &str) -> Result<String, RelayError> {
    encode(&OutboundFrame {
        id: frame_id::AUTH,
        data: raw_credential,
    })
}

/// Encodes one game message in both envelopes:
/// `{"id":"gm","data":{"id":<message_id>,"data":<data>}}`.
///
/// # Errors
///
/// Returns [`RelayError::ProtocolViolation`] if serialization fails, which
/// cannot happen for JSON payloads.
pub fn encode_game_frame(message_id: &str, data: serde_json::Value) -> Result<String, RelayError> {
    encode(&OutboundFrame {
        id: frame_id::GAME_MESSAGE,
        data: AppEnvelope {
            id: message_id.to_string(),
            data,
        },
    })
}

fn encode<T: Serialize>(frame: &T) -> Result<String, RelayError> {
    serde_json::to_string(frame)
        .map_err(|e| RelayError::ProtocolViolation(format!("frame encode: {e}")))
}

/// Parses an inbound text frame into the outer envelope.
///
/// # Errors
///
/// Returns [`RelayError::ProtocolViolation`] when the text is not a valid
/// `{id, data}` object. Callers treat this as transport noise, not a fault.
pub fn parse_frame(text: &str) -> Result<TransportEnvelope, RelayError> {
    serde_json::from_str(text)
        .map_err(|e| RelayError::ProtocolViolation(format!("frame decode: {e}")))
}
