//! End-to-end tests for the relay against an in-process game server.
//!
//! Each test binds a real tokio-tungstenite server on a random port, drives
//! the relay through the host lifecycle hooks, and asserts on both sides:
//! the exact frames the server receives and the exact events the relay
//! publishes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use twitch_game_relay::{
    ConnectionState, Credential, EventName, GameProxy, HostPlatform, ProxyOptions, RelayConfig,
    RelayError, RelayEvent,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Host platform fake that counts identity-share requests.
#[derive(Debug, Default)]
struct FakePlatform {
    id_share_requests: std::sync::atomic::AtomicUsize,
}

impl HostPlatform for FakePlatform {
    fn request_id_share(&self) {
        self.id_share_requests
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

/// One accepted server-side WebSocket.
struct ServerSide {
    ws: WebSocketStream<TcpStream>,
}

impl ServerSide {
    async fn recv_text(&mut self) -> String {
        let msg = timeout(TIMEOUT, self.ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("transport error");
        match msg {
            Message::Text(text) => text.to_string(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    async fn send_text(&mut self, text: impl Into<String>) {
        self.ws.send(Message::text(text.into())).await.unwrap();
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Mock game server accepting one connection at a time.
struct MockServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockServer {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    fn endpoint(&self) -> String {
        format!("ws://{}/relay", self.addr)
    }

    async fn accept(&self) -> ServerSide {
        let (stream, _) = timeout(TIMEOUT, self.listener.accept())
            .await
            .expect("timed out waiting for a connection")
            .unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ServerSide { ws }
    }

    /// Asserts that no client dials within `window`.
    async fn expect_no_connection(&self, window: Duration) {
        assert!(
            timeout(window, self.listener.accept()).await.is_err(),
            "unexpected connection attempt"
        );
    }
}

fn encode_segment(value: &serde_json::Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
}

fn make_credential(payload: &serde_json::Value) -> Credential {
    Credential::new(format!(
        "{}.{}.server-checks-this",
        encode_segment(&json!({"alg": "HS256", "typ": "JWT"})),
        encode_segment(payload)
    ))
}

fn viewer_credential() -> Credential {
    make_credential(&json!({
        "channel_id": "44322889",
        "exp": 4_102_444_800_i64,
        "opaque_user_id": "U-viewer-1",
        "role": "viewer",
        "pubsub_perms": {"listen": ["broadcast"]}
    }))
}

/// Builds a proxy whose every published event is forwarded to a channel.
fn proxy_with_events(
    platform: Arc<dyn HostPlatform>,
    endpoint: &str,
) -> (GameProxy, mpsc::UnboundedReceiver<RelayEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut options = ProxyOptions::new();
    for name in EventName::ALL {
        let tx = tx.clone();
        options = options.listener(
            name,
            Arc::new(move |event: &RelayEvent| {
                let _ = tx.send(event.clone());
            }),
        );
    }
    let proxy = GameProxy::new(platform, RelayConfig::new(endpoint), options).unwrap();
    (proxy, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<RelayEvent>) -> RelayEvent {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

fn status_phase(event: &RelayEvent) -> &'static str {
    match event {
        RelayEvent::Status { phase } => phase.as_str(),
        other => panic!("expected a status event, got {other:?}"),
    }
}

/// Drives the proxy through a successful handshake and returns the accepted
/// server side, after consuming init/connecting/connected and the auth frame.
async fn handshake(
    proxy: &GameProxy,
    server: &MockServer,
    rx: &mut mpsc::UnboundedReceiver<RelayEvent>,
    credential: &Credential,
) -> ServerSide {
    assert_eq!(status_phase(&next_event(rx).await), "init");

    let (result, mut server_side) =
        tokio::join!(proxy.on_authorized(credential.clone()), server.accept());
    result.unwrap();

    assert_eq!(status_phase(&next_event(rx).await), "connecting");
    assert_eq!(status_phase(&next_event(rx).await), "connected");

    let auth = server_side.recv_text().await;
    let frame: serde_json::Value = serde_json::from_str(&auth).unwrap();
    assert_eq!(frame["id"], "auth");
    assert_eq!(frame["data"], credential.as_str());

    server_side
}

#[tokio::test]
async fn successful_handshake_sends_auth_and_reports_status() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());

    let credential = viewer_credential();
    let _server_side = handshake(&proxy, &server, &mut rx, &credential).await;

    assert_eq!(proxy.state(), ConnectionState::Connected);
    let claims = proxy.claims().unwrap();
    assert_eq!(claims.channel_id, "44322889");
    assert_eq!(claims.opaque_user_id.as_deref(), Some("U-viewer-1"));
}

#[tokio::test]
async fn missing_identity_grant_never_dials_and_requests_share() {
    init_tracing();
    let server = MockServer::bind().await;
    let platform = Arc::new(FakePlatform::default());
    let (proxy, mut rx) = proxy_with_events(
        Arc::clone(&platform) as Arc<dyn HostPlatform>,
        &server.endpoint(),
    );
    assert_eq!(status_phase(&next_event(&mut rx).await), "init");

    let anonymous = make_credential(&json!({
        "channel_id": "44322889",
        "exp": 4_102_444_800_i64,
        "role": "viewer"
    }));
    let err = proxy.on_authorized(anonymous).await.unwrap_err();
    assert!(matches!(err, RelayError::MissingIdentityGrant));

    let event = next_event(&mut rx).await;
    let RelayEvent::Error { reason, message } = event else {
        panic!("expected an error event, got {event:?}");
    };
    assert_eq!(reason, "user_id");
    assert!(!message.is_empty());

    assert_eq!(
        platform
            .id_share_requests
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    server.expect_no_connection(Duration::from_millis(300)).await;

    // The flow resumes when the platform re-authorizes with full claims.
    let credential = viewer_credential();
    let _server_side = handshake_after_init(&proxy, &server, &mut rx, &credential).await;
    assert_eq!(proxy.state(), ConnectionState::Connected);
}

/// Like [`handshake`] but without consuming a leading `init` event.
async fn handshake_after_init(
    proxy: &GameProxy,
    server: &MockServer,
    rx: &mut mpsc::UnboundedReceiver<RelayEvent>,
    credential: &Credential,
) -> ServerSide {
    let (result, mut server_side) =
        tokio::join!(proxy.on_authorized(credential.clone()), server.accept());
    result.unwrap();

    assert_eq!(status_phase(&next_event(rx).await), "connecting");
    assert_eq!(status_phase(&next_event(rx).await), "connected");

    let auth = server_side.recv_text().await;
    let frame: serde_json::Value = serde_json::from_str(&auth).unwrap();
    assert_eq!(frame["id"], "auth");
    server_side
}

#[tokio::test]
async fn send_produces_exact_double_nested_frame() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    let credential = viewer_credential();
    let mut server_side = handshake(&proxy, &server, &mut rx, &credential).await;

    proxy.send("move", json!({"x": 1})).unwrap();
    let wire = server_side.recv_text().await;
    assert_eq!(wire, r#"{"id":"gm","data":{"id":"move","data":{"x":1}}}"#);
}

#[tokio::test]
async fn inbound_game_frame_publishes_one_message_event() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    let credential = viewer_credential();
    let mut server_side = handshake(&proxy, &server, &mut rx, &credential).await;

    server_side
        .send_text(r#"{"id":"gm","data":{"id":"chat","data":"hello"}}"#)
        .await;

    let event = next_event(&mut rx).await;
    let RelayEvent::Message { id, data } = event else {
        panic!("expected a message event, got {event:?}");
    };
    assert_eq!(id, "chat");
    assert_eq!(data, json!("hello"));
}

#[tokio::test]
async fn server_info_publishes_connect_once_and_chan_cfg_stays_internal() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    let credential = viewer_credential();
    let mut server_side = handshake(&proxy, &server, &mut rx, &credential).await;

    server_side
        .send_text(r#"{"id":"chan_cfg","data":{"customization":{"theme":"dark"},"session":{"game":"arena"}}}"#)
        .await;
    server_side
        .send_text(r#"{"id":"server_info","data":{"name":"ebs-1","version":"2.3"}}"#)
        .await;
    // A repeat announcement must not publish a second connect.
    server_side
        .send_text(r#"{"id":"server_info","data":{"name":"ebs-1","version":"2.3"}}"#)
        .await;
    // Sentinel so the test can prove nothing else was published in between.
    server_side
        .send_text(r#"{"id":"gm","data":{"id":"ping","data":null}}"#)
        .await;

    let event = next_event(&mut rx).await;
    let RelayEvent::Connect { server_info } = event else {
        panic!("expected a connect event, got {event:?}");
    };
    assert_eq!(server_info["name"], "ebs-1");

    let event = next_event(&mut rx).await;
    let RelayEvent::Message { id, .. } = event else {
        panic!("expected the sentinel message, got {event:?}");
    };
    assert_eq!(id, "ping");

    let config = proxy.channel_config().unwrap();
    assert_eq!(config.customization["theme"], "dark");
    assert_eq!(proxy.server_info().unwrap()["version"], "2.3");
}

#[tokio::test]
async fn unknown_and_malformed_frames_are_ignored() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    let credential = viewer_credential();
    let mut server_side = handshake(&proxy, &server, &mut rx, &credential).await;

    server_side
        .send_text(r#"{"id":"totally_new_frame","data":{"v":2}}"#)
        .await;
    server_side.send_text("this is not json").await;
    server_side
        .send_text(r#"{"id":"gm","data":{"id":"after","data":1}}"#)
        .await;

    // Only the well-formed gm frame surfaces; the connection stays up.
    let event = next_event(&mut rx).await;
    let RelayEvent::Message { id, .. } = event else {
        panic!("expected a message event, got {event:?}");
    };
    assert_eq!(id, "after");
    assert_eq!(proxy.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn server_close_publishes_one_disconnect_and_no_reconnect() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    let credential = viewer_credential();
    let server_side = handshake(&proxy, &server, &mut rx, &credential).await;

    server_side.close().await;

    let event = next_event(&mut rx).await;
    let RelayEvent::Disconnect { .. } = event else {
        panic!("expected a disconnect event, got {event:?}");
    };
    assert_eq!(proxy.state(), ConnectionState::Disconnected);

    // No automatic reconnection and no second disconnect.
    server.expect_no_connection(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());

    let err = proxy.send("move", json!({"x": 1})).unwrap_err();
    assert!(matches!(err, RelayError::NotConnected));
}

#[tokio::test]
async fn reauthorization_supersedes_the_live_transport() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    let credential = viewer_credential();
    let _first = handshake(&proxy, &server, &mut rx, &credential).await;

    let refreshed = make_credential(&json!({
        "channel_id": "44322889",
        "exp": 4_102_444_800_i64,
        "opaque_user_id": "U-viewer-1",
        "user_id": "12345",
        "role": "viewer"
    }));
    let (result, mut second) = tokio::join!(proxy.on_authorized(refreshed.clone()), server.accept());
    result.unwrap();

    // Old transport: exactly one disconnect naming the supersede.
    let event = next_event(&mut rx).await;
    let RelayEvent::Disconnect { reason } = event else {
        panic!("expected a disconnect event, got {event:?}");
    };
    assert!(reason.message.contains("re-authorization"));

    assert_eq!(status_phase(&next_event(&mut rx).await), "connecting");
    assert_eq!(status_phase(&next_event(&mut rx).await), "connected");

    let auth = second.recv_text().await;
    let frame: serde_json::Value = serde_json::from_str(&auth).unwrap();
    assert_eq!(frame["data"], refreshed.as_str());

    assert_eq!(proxy.state(), ConnectionState::Connected);
    assert_eq!(proxy.claims().unwrap().user_id.as_deref(), Some("12345"));
}

#[tokio::test]
async fn concurrent_authorizations_never_open_two_transports() {
    init_tracing();
    let server = MockServer::bind().await;
    let (proxy, mut rx) = proxy_with_events(Arc::new(FakePlatform::default()), &server.endpoint());
    assert_eq!(status_phase(&next_event(&mut rx).await), "init");

    let first = viewer_credential();
    let second = make_credential(&json!({
        "channel_id": "44322889",
        "exp": 4_102_444_800_i64,
        "opaque_user_id": "U-viewer-1",
        "user_id": "12345",
        "role": "viewer"
    }));

    // Whichever attempt wins the handshake lock connects first; the loser
    // must close that transport before its own dial, so the server never
    // holds two sockets at once.
    let server_task = async {
        let mut loser = server.accept().await;
        let loser_auth = loser.recv_text().await;
        let tail = timeout(TIMEOUT, loser.ws.next())
            .await
            .expect("timed out waiting for the first transport to close");
        assert!(
            !matches!(tail, Some(Ok(Message::Text(_)))),
            "first transport stayed live past the second authorization: {tail:?}"
        );
        let mut winner = server.accept().await;
        let winner_auth = winner.recv_text().await;
        (loser_auth, winner_auth, winner)
    };

    let (result_a, result_b, (loser_auth, winner_auth, mut survivor)) = tokio::join!(
        proxy.on_authorized(first.clone()),
        proxy.on_authorized(second.clone()),
        server_task
    );
    result_a.unwrap();
    result_b.unwrap();

    // One auth frame per accepted connection, one per credential.
    let auth_data = |text: &str| {
        let frame: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(frame["id"], "auth");
        frame["data"].as_str().unwrap().to_string()
    };
    let mut seen = vec![auth_data(&loser_auth), auth_data(&winner_auth)];
    seen.sort();
    let mut expected = vec![first.as_str().to_string(), second.as_str().to_string()];
    expected.sort();
    assert_eq!(seen, expected);

    // Exactly one supersede disconnect between the two handshakes.
    assert_eq!(status_phase(&next_event(&mut rx).await), "connecting");
    assert_eq!(status_phase(&next_event(&mut rx).await), "connected");
    let event = next_event(&mut rx).await;
    let RelayEvent::Disconnect { reason } = event else {
        panic!("expected a disconnect event, got {event:?}");
    };
    assert!(reason.message.contains("re-authorization"));
    assert_eq!(status_phase(&next_event(&mut rx).await), "connecting");
    assert_eq!(status_phase(&next_event(&mut rx).await), "connected");
    assert!(rx.try_recv().is_err());

    // Only the surviving transport carries traffic.
    assert_eq!(proxy.state(), ConnectionState::Connected);
    proxy.send("ping", json!(1)).unwrap();
    let wire = survivor.recv_text().await;
    assert_eq!(wire, r#"{"id":"gm","data":{"id":"ping","data":1}}"#);
}
