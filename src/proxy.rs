//! Public facade the embedding extension code programs against.
//!
//! [`GameProxy`] hides the handshake and wire protocol behind four calls:
//! `send`, `add_event_listener`, `remove_event_listener`, and
//! `request_id_share`, plus the host lifecycle hook passthroughs the
//! platform glue invokes.

use std::sync::Arc;

use crate::channel::ChannelConfig;
use crate::config::RelayConfig;
use crate::connection::{ConnectionController, ConnectionState};
use crate::error::RelayError;
use crate::events::{EventBus, EventName, Listener};
use crate::platform::HostPlatform;
use crate::token::{Claims, Credential};

/// Constructor-time options for [`GameProxy`].
///
/// Listeners registered here are in place before the `status(init)`
/// publish, so embedding code can observe the very first event.
#[derive(Default)]
pub struct ProxyOptions {
    listeners: Vec<(EventName, Listener)>,
}

impl ProxyOptions {
    /// Empty options: no pre-registered listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener to register during construction.
    #[must_use]
    pub fn listener(mut self, event: EventName, listener: Listener) -> Self {
        self.listeners.push((event, listener));
        self
    }
}

impl std::fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Client-side relay between a sandboxed extension front-end and a game
/// server.
#[derive(Debug, Clone)]
pub struct GameProxy {
    controller: ConnectionController,
    bus: EventBus,
    platform: Arc<dyn HostPlatform>,
    test_mode: bool,
}

impl GameProxy {
    /// Builds the proxy: registers constructor-option listeners, publishes
    /// `status(init)`, and starts awaiting the platform's authorization
    /// callback. No network traffic happens until then.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateListener`] if the options register
    /// the same listener twice for one event.
    pub fn new(
        platform: Arc<dyn HostPlatform>,
        config: RelayConfig,
        options: ProxyOptions,
    ) -> Result<Self, RelayError> {
        let bus = EventBus::new();
        for (event, listener) in options.listeners {
            bus.subscribe(event, listener)?;
        }

        let test_mode = config.is_test_mode();
        let controller =
            ConnectionController::new(config, bus.clone(), Arc::clone(&platform));
        controller.announce_init();

        Ok(Self {
            controller,
            bus,
            platform,
            test_mode,
        })
    }

    /// Sends one game message to the server, double-enveloped as a `gm`
    /// frame. Fire-and-forget once queued.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] while the transport is not open.
    pub fn send(&self, message_id: &str, data: serde_json::Value) -> Result<(), RelayError> {
        self.controller.send(message_id, data)
    }

    /// Registers `listener` for the named event.
    ///
    /// # Errors
    ///
    /// - [`RelayError::UnknownEvent`] if `name` is not one of `connect`,
    ///   `disconnect`, `message`, `error`, `status`.
    /// - [`RelayError::DuplicateListener`] if this exact listener is
    ///   already registered for that event.
    pub fn add_event_listener(&self, name: &str, listener: Listener) -> Result<(), RelayError> {
        let event: EventName = name.parse()?;
        self.bus.subscribe(event, listener)
    }

    /// Removes a previously registered listener.
    ///
    /// # Errors
    ///
    /// - [`RelayError::UnknownEvent`] if `name` is unrecognized.
    /// - [`RelayError::ListenerNotFound`] if this exact listener is not
    ///   registered for that event.
    pub fn remove_event_listener(&self, name: &str, listener: &Listener) -> Result<(), RelayError> {
        let event: EventName = name.parse()?;
        self.bus.unsubscribe(event, listener)
    }

    /// Asks the host platform to prompt the viewer for identity sharing.
    pub fn request_id_share(&self) {
        self.platform.request_id_share();
    }

    /// Whether the platform marked this session as a test page
    /// (`state=testing` or `state=hosted_test`).
    #[must_use]
    pub const fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Current lifecycle state of the connection slot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    /// Claims decoded from the most recent accepted credential.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.controller.claims()
    }

    /// Latest server-pushed channel configuration, if any.
    #[must_use]
    pub fn channel_config(&self) -> Option<ChannelConfig> {
        self.controller.channel_config()
    }

    /// Latest `server_info` payload, if any arrived on this connection.
    #[must_use]
    pub fn server_info(&self) -> Option<serde_json::Value> {
        self.controller.server_info()
    }

    /// Host lifecycle hook: authorization granted (or re-granted).
    ///
    /// # Errors
    ///
    /// See [`ConnectionController::on_authorized`].
    pub async fn on_authorized(&self, credential: Credential) -> Result<(), RelayError> {
        self.controller.on_authorized(credential).await
    }

    /// Host lifecycle hook: viewed context changed.
    pub fn on_context_changed(&self, context: serde_json::Value, changed: &[String]) {
        self.controller.on_context_changed(context, changed);
    }

    /// Host lifecycle hook: extension visibility changed.
    pub fn on_visibility_changed(&self, visible: bool, context: serde_json::Value) {
        self.controller.on_visibility_changed(visible, context);
    }

    /// Host lifecycle hook: follow state changed.
    pub fn on_follow(&self, followed: bool, channel_id: &str) {
        self.controller.on_follow(followed, channel_id);
    }

    /// Host lifecycle hook: the platform reported an error.
    pub fn on_platform_error(&self, message: &str) {
        self.controller.on_platform_error(message);
    }
}
