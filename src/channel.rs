//! Server-pushed channel configuration.
//!
//! `chan_cfg` frames carry broadcaster customization and game/session
//! metadata. The relay stores the latest value for the embedding UI to read;
//! it does not publish an external event for it.

use serde::Deserialize;

/// Broadcaster customization and session metadata from a `chan_cfg` frame.
///
/// The schema is owned by the game server; unrecognized fields are kept in
/// [`ChannelConfig::extra`] so a newer server does not break older clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Broadcaster-chosen customization (colors, layout, labels).
    #[serde(default)]
    pub customization: serde_json::Value,
    /// Game/session metadata for the current broadcast.
    #[serde(default)]
    pub session: serde_json::Value,
    /// Fields this client version does not recognize.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
