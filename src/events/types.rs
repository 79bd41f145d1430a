//! Event names and payloads published to registered listeners.

use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

/// Fixed set of event names the facade exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Fired once per connection when the server announces itself
    /// (`server_info` frame) after accepting the auth frame.
    Connect,
    /// Fired whenever the transport closes, whatever the cause.
    Disconnect,
    /// Fired for every game message forwarded from the game server.
    Message,
    /// Fired for handshake and platform failures.
    Error,
    /// Fired on lifecycle phase changes (`init`, `connecting`, `connected`).
    Status,
}

impl EventName {
    /// All recognized event names, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::Connect,
        Self::Disconnect,
        Self::Message,
        Self::Error,
        Self::Status,
    ];

    /// The wire/facade spelling of this event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Message => "message",
            Self::Error => "error",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "disconnect" => Ok(Self::Disconnect),
            "message" => Ok(Self::Message),
            "error" => Ok(Self::Error),
            "status" => Ok(Self::Status),
            other => Err(RelayError::UnknownEvent(other.to_string())),
        }
    }
}

/// Lifecycle phase carried by `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPhase {
    /// The facade was constructed and is awaiting authorization.
    Init,
    /// A credential was accepted and the transport is being dialed.
    Connecting,
    /// The transport is open and the auth frame was queued.
    Connected,
}

impl StatusPhase {
    /// The facade spelling of this phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for StatusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transport connection closed, best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code when the peer supplied one
    /// (1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Creates a reason with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a reason with a message and a close code.
    #[must_use]
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Payload published to listeners.
///
/// Each variant corresponds to one [`EventName`]; listeners registered for
/// a name only ever observe that variant.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Server accepted the session; carries the `server_info` payload.
    Connect {
        /// Connection/session metadata as sent by the server.
        server_info: serde_json::Value,
    },
    /// The transport closed.
    Disconnect {
        /// Best-effort close reason.
        reason: DisconnectReason,
    },
    /// A game message forwarded from the game server.
    Message {
        /// Application-level message id.
        id: String,
        /// Application-level payload, opaque to the relay.
        data: serde_json::Value,
    },
    /// A handshake or platform failure.
    Error {
        /// Short machine-readable reason code (e.g. `user_id`).
        reason: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// A lifecycle phase change.
    Status {
        /// The phase entered.
        phase: StatusPhase,
    },
}

impl RelayEvent {
    /// The event name this payload dispatches under.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::Connect { .. } => EventName::Connect,
            Self::Disconnect { .. } => EventName::Disconnect,
            Self::Message { .. } => EventName::Message,
            Self::Error { .. } => EventName::Error,
            Self::Status { .. } => EventName::Status,
        }
    }
}
