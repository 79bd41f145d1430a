//! Connection controller: handshake state machine and transport ownership.
//!
//! One controller owns at most one WebSocket connection. The host platform's
//! authorization callback drives the handshake: decode the credential, check
//! the identity claims, dial the endpoint, forward the raw credential as an
//! `auth` frame, then route inbound frames to bus events or internal
//! handlers. Authorization attempts are serialized and a re-authorization
//! closes any prior transport before dialing, so two connections never
//! coexist.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::channel::ChannelConfig;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::events::{DisconnectReason, EventBus, RelayEvent, StatusPhase};
use crate::platform::HostPlatform;
use crate::protocol::{self, frame_id};
use crate::token::{Claims, Credential};

/// Lifecycle state of the relay's single connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, lifecycle hooks not yet announced.
    Uninitialized,
    /// `status(init)` published; waiting for the platform to authorize.
    AwaitingAuthorization,
    /// Credential received; claims being validated (or re-requested).
    Authorizing,
    /// Claims accepted; dialing the endpoint.
    Connecting,
    /// Transport open; auth frame sent, server traffic flowing.
    Connected,
    /// Transport closed. A fresh authorization callback starts over.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingAuthorization => "awaiting_authorization",
            Self::Authorizing => "authorizing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Handles to one live transport.
#[derive(Debug)]
struct LiveTransport {
    /// Queue into the writer task. Dropping it ends the writer.
    outbound: mpsc::UnboundedSender<Message>,
    /// Set by whichever side observes the close first; the winner of the
    /// swap publishes the single `disconnect` event.
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Mutable controller state behind the lock.
#[derive(Debug)]
struct ConnState {
    state: ConnectionState,
    credential: Option<Credential>,
    claims: Option<Claims>,
    server_info: Option<serde_json::Value>,
    channel_config: Option<ChannelConfig>,
    live: Option<LiveTransport>,
}

#[derive(Debug)]
struct Shared {
    config: RelayConfig,
    bus: EventBus,
    platform: Arc<dyn HostPlatform>,
    conn: Mutex<ConnState>,
    /// Held across the whole authorization flow, dial included, so two
    /// concurrent callbacks cannot each open a transport.
    handshake: tokio::sync::Mutex<()>,
}

/// Owns the WebSocket lifecycle, the authentication handshake, and inbound
/// frame routing.
///
/// Cheap to clone; clones share the same connection slot.
#[derive(Debug, Clone)]
pub struct ConnectionController {
    shared: Arc<Shared>,
}

impl ConnectionController {
    /// Creates a controller in the `Uninitialized` state.
    #[must_use]
    pub fn new(config: RelayConfig, bus: EventBus, platform: Arc<dyn HostPlatform>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                bus,
                platform,
                conn: Mutex::new(ConnState {
                    state: ConnectionState::Uninitialized,
                    credential: None,
                    claims: None,
                    server_info: None,
                    channel_config: None,
                    live: None,
                }),
                handshake: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Announces the relay to its listeners: publishes `status(init)` and
    /// moves to `AwaitingAuthorization`. Called once by the facade after
    /// constructor-time listeners are in place.
    pub fn announce_init(&self) {
        {
            let mut conn = self.lock_conn();
            conn.state = ConnectionState::AwaitingAuthorization;
        }
        tracing::debug!(endpoint = %self.shared.config.endpoint, "relay initialized");
        self.shared.bus.publish(&RelayEvent::Status {
            phase: StatusPhase::Init,
        });
    }

    /// Host lifecycle hook: the platform delivered (or re-delivered) a
    /// signed credential.
    ///
    /// Authorization attempts are serialized: a callback arriving while a
    /// previous one is still dialing waits its turn, then closes whatever
    /// transport that attempt opened before dialing itself. Failures are
    /// returned *and* published on the `error` / `disconnect` channels.
    ///
    /// # Errors
    ///
    /// - [`RelayError::MalformedCredential`]: credential did not decode;
    ///   fatal to this attempt, no connection is opened.
    /// - [`RelayError::MissingIdentityGrant`]: no anonymized user id in the
    ///   claims; an identity grant is requested from the platform and the
    ///   flow resumes on the next authorization callback.
    /// - [`RelayError::Transport`]: dialing the endpoint failed.
    pub async fn on_authorized(&self, credential: Credential) -> Result<(), RelayError> {
        let _handshake = self.shared.handshake.lock().await;
        self.supersede_live_transport();

        let claims = {
            let mut conn = self.lock_conn();
            conn.state = ConnectionState::Authorizing;
            conn.credential = Some(credential.clone());
            conn.claims = None;

            match credential.decode() {
                Ok(decoded) => decoded.claims,
                Err(e) => {
                    conn.state = ConnectionState::AwaitingAuthorization;
                    drop(conn);
                    tracing::warn!(error = %e, "credential failed to decode");
                    self.shared.bus.publish(&RelayEvent::Error {
                        reason: e.reason(),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            }
        };

        if claims.opaque_user_id.is_none() {
            // Recoverable: the platform prompts the viewer and calls back
            // with fresh claims once identity sharing is granted.
            tracing::info!("claims lack opaque_user_id; requesting identity grant");
            self.shared.bus.publish(&RelayEvent::Error {
                reason: RelayError::MissingIdentityGrant.reason(),
                message: "viewer identity is not shared; requesting the grant".to_string(),
            });
            self.shared.platform.request_id_share();
            return Err(RelayError::MissingIdentityGrant);
        }

        {
            let mut conn = self.lock_conn();
            conn.claims = Some(claims);
            conn.state = ConnectionState::Connecting;
        }
        tracing::info!(endpoint = %self.shared.config.endpoint, "connecting to game server");
        self.shared.bus.publish(&RelayEvent::Status {
            phase: StatusPhase::Connecting,
        });

        let stream = match connect_async(self.shared.config.endpoint.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                {
                    let mut conn = self.lock_conn();
                    conn.state = ConnectionState::Disconnected;
                }
                tracing::warn!(error = %e, "dial failed");
                self.shared.bus.publish(&RelayEvent::Disconnect {
                    reason: DisconnectReason::new(format!("dial failed: {e}")),
                });
                return Err(RelayError::Transport(e));
            }
        };

        self.attach_transport(stream, &credential);
        Ok(())
    }

    /// Wires a freshly opened transport: publishes `status(connected)`,
    /// queues the `auth` frame, and spawns the reader/writer tasks.
    fn attach_transport(
        &self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        credential: &Credential,
    ) {
        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let closed = Arc::new(AtomicBool::new(false));
        let connect_once = Arc::new(AtomicBool::new(false));

        // The auth frame goes out before any caller can reach `send`,
        // because the writer queue is not published until `live` is set.
        match protocol::encode_auth_frame(credential.as_str()) {
            Ok(text) => {
                let _ = outbound.send(Message::text(text));
            }
            Err(e) => {
                tracing::warn!(error = %e, "auth frame failed to encode; nothing queued");
            }
        }

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let controller = self.clone();
            let closed = Arc::clone(&closed);
            let connect_once = Arc::clone(&connect_once);
            tokio::spawn(async move {
                let reason = loop {
                    match source.next().await {
                        Some(Ok(Message::Text(text))) => {
                            controller.route_frame(text.as_str(), &connect_once);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break match frame {
                                Some(f) => DisconnectReason::with_code(
                                    f.reason.to_string(),
                                    u16::from(f.code),
                                ),
                                None => DisconnectReason::new("closed by server"),
                            };
                        }
                        Some(Ok(Message::Binary(_))) => {
                            tracing::warn!("ignoring binary frame; protocol is text-only");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            break DisconnectReason::new(format!("transport error: {e}"));
                        }
                        None => break DisconnectReason::new("transport stream ended"),
                    }
                };
                controller.finish_connection(&closed, reason);
            })
        };

        {
            let mut conn = self.lock_conn();
            conn.state = ConnectionState::Connected;
            conn.server_info = None;
            conn.channel_config = None;
            conn.live = Some(LiveTransport {
                outbound,
                closed,
                reader,
                writer,
            });
        }
        tracing::info!("transport open; auth frame queued");
        self.shared.bus.publish(&RelayEvent::Status {
            phase: StatusPhase::Connected,
        });
    }

    /// Demultiplexes one inbound text frame by its transport id.
    fn route_frame(&self, text: &str, connect_once: &Arc<AtomicBool>) {
        let frame = match protocol::parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable frame");
                return;
            }
        };

        match frame.id.as_str() {
            frame_id::GAME_MESSAGE => match serde_json::from_value::<protocol::AppEnvelope>(
                frame.data,
            ) {
                Ok(app) => {
                    self.shared.bus.publish(&RelayEvent::Message {
                        id: app.id,
                        data: app.data,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "gm frame without application envelope");
                }
            },
            frame_id::CHANNEL_CONFIG => {
                match serde_json::from_value::<ChannelConfig>(frame.data) {
                    Ok(config) => {
                        tracing::debug!("channel configuration updated");
                        self.lock_conn().channel_config = Some(config);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable channel configuration");
                    }
                }
            }
            frame_id::SERVER_INFO => {
                {
                    let mut conn = self.lock_conn();
                    conn.server_info = Some(frame.data.clone());
                }
                // First server_info per connection doubles as the server's
                // acceptance of the auth frame.
                if !connect_once.swap(true, Ordering::SeqCst) {
                    self.shared.bus.publish(&RelayEvent::Connect {
                        server_info: frame.data,
                    });
                }
            }
            other => {
                // Unknown ids are a forward-compatibility no-op.
                tracing::debug!(id = other, "ignoring unrecognized transport frame");
            }
        }
    }

    /// Marks the connection closed and publishes the single `disconnect`.
    /// Loses to any earlier close observation via the `closed` swap.
    fn finish_connection(&self, closed: &Arc<AtomicBool>, reason: DisconnectReason) {
        if closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut conn = self.lock_conn();
            // Clear the slot only if it still holds this connection; a
            // re-authorization may already have installed a newer one.
            let still_ours = conn
                .live
                .as_ref()
                .is_some_and(|live| Arc::ptr_eq(&live.closed, closed));
            if still_ours {
                conn.state = ConnectionState::Disconnected;
                conn.live = None;
            }
        }
        tracing::info!(reason = %reason, "disconnected");
        self.shared.bus.publish(&RelayEvent::Disconnect { reason });
    }

    /// Closes a live transport ahead of a re-authorization.
    fn supersede_live_transport(&self) {
        let live = {
            let mut conn = self.lock_conn();
            conn.live.take()
        };
        let Some(live) = live else { return };

        if !live.closed.swap(true, Ordering::SeqCst) {
            let _ = live.outbound.send(Message::Close(None));
            live.reader.abort();
            // Dropping `outbound` ends the writer once the close frame has
            // been flushed; abort is the backstop for a wedged sink.
            drop(live.outbound);
            live.writer.abort();
            {
                let mut conn = self.lock_conn();
                conn.state = ConnectionState::Disconnected;
            }
            tracing::info!("closing previous transport before re-authorization");
            self.shared.bus.publish(&RelayEvent::Disconnect {
                reason: DisconnectReason::new("superseded by re-authorization"),
            });
        }
    }

    /// Wraps and queues one game message:
    /// `{"id":"gm","data":{"id":<message_id>,"data":<data>}}`.
    ///
    /// Fire-and-forget relative to the caller; delivery is ordered behind
    /// previously queued frames.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] while the transport is not open.
    pub fn send(&self, message_id: &str, data: serde_json::Value) -> Result<(), RelayError> {
        let text = protocol::encode_game_frame(message_id, data)?;
        let conn = self.lock_conn();
        let live = match (&conn.state, &conn.live) {
            (ConnectionState::Connected, Some(live)) => live,
            _ => return Err(RelayError::NotConnected),
        };
        live.outbound
            .send(Message::text(text))
            .map_err(|_| RelayError::NotConnected)
    }

    /// Host lifecycle hook: the viewed context changed.
    pub fn on_context_changed(&self, context: serde_json::Value, changed: &[String]) {
        tracing::debug!(?changed, ?context, "context changed");
    }

    /// Host lifecycle hook: the extension became visible or hidden.
    pub fn on_visibility_changed(&self, visible: bool, context: serde_json::Value) {
        tracing::debug!(visible, ?context, "visibility changed");
    }

    /// Host lifecycle hook: the viewer followed (or unfollowed) a channel.
    pub fn on_follow(&self, followed: bool, channel_id: &str) {
        tracing::debug!(followed, channel_id, "follow state changed");
    }

    /// Host lifecycle hook: the platform reported an error outside the
    /// relay's own flow. Surfaced to listeners on the `error` channel.
    pub fn on_platform_error(&self, message: &str) {
        tracing::warn!(message, "host platform error");
        self.shared.bus.publish(&RelayEvent::Error {
            reason: "platform",
            message: message.to_string(),
        });
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock_conn().state
    }

    /// Claims decoded from the most recent accepted credential.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.lock_conn().claims.clone()
    }

    /// Latest channel configuration pushed by the server, if any.
    #[must_use]
    pub fn channel_config(&self) -> Option<ChannelConfig> {
        self.lock_conn().channel_config.clone()
    }

    /// Latest `server_info` payload, if any arrived on this connection.
    #[must_use]
    pub fn server_info(&self) -> Option<serde_json::Value> {
        self.lock_conn().server_info.clone()
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, ConnState> {
        self.shared
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
