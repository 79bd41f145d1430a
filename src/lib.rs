//! # twitch-game-relay
//!
//! Client-side relay bridging a sandboxed Twitch extension front-end to a
//! game server over a WebSocket connection. The extension iframe has no
//! direct network access of its own design; the relay authenticates with
//! the platform-issued signed credential, forwards the double-nested
//! `{id, data}` message envelope in both directions, and exposes a small
//! publish/subscribe surface so embedding code reacts to lifecycle and
//! game messages without knowing protocol details.
//!
//! ## Architecture
//!
//! ```text
//! Host platform (authorization, identity actions)
//!     │
//!     ├── GameProxy (proxy/)            public facade
//!     │       ├── EventBus (events/)    connect/disconnect/message/error/status
//!     │       └── ConnectionController (connection/)
//!     │               ├── TokenReader (token/)   credential → claims
//!     │               ├── Envelopes (protocol/)  auth / gm / chan_cfg / server_info
//!     │               └── WebSocket transport (tokio-tungstenite)
//!     │
//!     └── Game server EBS
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use twitch_game_relay::{
//!     Credential, EventName, GameProxy, NoopPlatform, ProxyOptions, RelayConfig, RelayEvent,
//! };
//!
//! # async fn example() -> Result<(), twitch_game_relay::RelayError> {
//! let proxy = GameProxy::new(
//!     Arc::new(NoopPlatform),
//!     RelayConfig::new("wss://ebs.example.com/relay").with_query("state=testing"),
//!     ProxyOptions::new().listener(
//!         EventName::Message,
//!         Arc::new(|event: &RelayEvent| {
//!             if let RelayEvent::Message { id, data } = event {
//!                 println!("game message {id}: {data}");
//!             }
//!         }),
//!     ),
//! )?;
//!
//! // Delivered by the host platform's authorization callback.
//! proxy.on_authorized(Credential::new("aaa.bbb.ccc")).await?;
//! proxy.send("move", serde_json::json!({"x": 1}))?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod platform;
pub mod protocol;
pub mod proxy;
pub mod token;

pub use channel::ChannelConfig;
pub use config::RelayConfig;
pub use connection::{ConnectionController, ConnectionState};
pub use error::RelayError;
pub use events::{DisconnectReason, EventBus, EventName, Listener, RelayEvent, StatusPhase};
pub use platform::{HostPlatform, NoopPlatform};
pub use proxy::{GameProxy, ProxyOptions};
pub use token::{Claims, Credential, DecodedToken, PubSubPerms, Role};
