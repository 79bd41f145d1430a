//! Relay error types with recoverability and reason-code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Facade misuse
//! (bad event names, duplicate listeners) is returned synchronously to the
//! caller; handshake and transport failures are additionally surfaced on the
//! `error` / `status` / `disconnect` event channels so embedding code can
//! react without catching anything.

use crate::events::EventName;

/// Client-side error enum for the relay.
///
/// # Reason Codes
///
/// | Variant               | Reason code | Recoverable |
/// |-----------------------|-------------|-------------|
/// | `MalformedCredential` | `token`     | no          |
/// | `MissingIdentityGrant`| `user_id`   | yes         |
/// | `UnknownEvent`        | `event`     | no          |
/// | `DuplicateListener`   | `listener`  | no          |
/// | `ListenerNotFound`    | `listener`  | no          |
/// | `NotConnected`        | `transport` | no          |
/// | `Transport`           | `transport` | no          |
/// | `InvalidEndpoint`     | `config`    | no          |
/// | `ProtocolViolation`   | `protocol`  | no          |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The credential string could not be decoded into header/payload/signature.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// The credential carries no anonymized user identifier; the viewer has
    /// not granted identity sharing. The relay re-requests the grant and
    /// resumes when the platform re-authorizes.
    #[error("credential lacks an opaque user id; identity grant requested")]
    MissingIdentityGrant,

    /// Event name outside the fixed set `connect`, `disconnect`, `message`,
    /// `error`, `status`.
    #[error("unknown event name: {0}")]
    UnknownEvent(String),

    /// The exact callback is already registered for this event.
    #[error("listener already registered for `{0}` event")]
    DuplicateListener(EventName),

    /// The callback is not currently registered for this event.
    #[error("listener not registered for `{0}` event")]
    ListenerNotFound(EventName),

    /// `send` was invoked while the transport is not open.
    #[error("not connected to the game server")]
    NotConnected,

    /// Error propagated from the WebSocket transport.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The configured endpoint URL could not be used to open a connection.
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    /// A wire frame could not be encoded or decoded as a `{id, data}`
    /// envelope. Inbound violations are logged and dropped, never fatal.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl RelayError {
    /// Returns the short reason code used in published `error` events.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MalformedCredential(_) => "token",
            Self::MissingIdentityGrant => "user_id",
            Self::UnknownEvent(_) => "event",
            Self::DuplicateListener(_) | Self::ListenerNotFound(_) => "listener",
            Self::NotConnected | Self::Transport(_) => "transport",
            Self::InvalidEndpoint(_) => "config",
            Self::ProtocolViolation(_) => "protocol",
        }
    }

    /// Returns `true` if the condition resolves itself once the host platform
    /// delivers a fresh authorization callback.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissingIdentityGrant)
    }
}
