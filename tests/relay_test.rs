//! End-to-end tests against a running relay over real sockets.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use rendezvous_relay::{server, AppState, RelayConfig, RoomName};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

static WEB_ROOTS: AtomicUsize = AtomicUsize::new(0);

/// Fresh asset directory with an index page and one script
fn web_root() -> PathBuf {
    let n = WEB_ROOTS.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("relay-web-{}-{}", std::process::id(), n));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<html>relay index</html>").unwrap();
    std::fs::write(dir.join("core.js"), "console.log('core');").unwrap();
    dir
}

/// Start a relay on an ephemeral port
async fn start_server(config: RelayConfig) -> (SocketAddr, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(config);
    let app = server::router(state.clone(), &web_root());
    tokio::spawn(server::serve(listener, app));
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text message as JSON, skipping control frames
async fn recv(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection ended")
            .expect("read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(_) => panic!("connection closed while waiting for a message"),
            _ => {}
        }
    }
}

/// Wait until the relay closes this connection
async fn expect_closed(client: &mut Client) {
    let closed = tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection was not closed");
}

/// Poll until `check` holds for the registry
async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn creator_join(room: &str) -> Value {
    json!({
        "type": "join",
        "room": room,
        "quality": {"width": 1280, "height": 720, "fps": 30, "bitrate": 500, "codec": "vp8"}
    })
}

fn viewer_join(room: &str) -> Value {
    json!({
        "type": "join",
        "room": room,
        "quality": {"width": 0, "height": 0, "fps": 0, "bitrate": 0, "codec": ""}
    })
}

/// Creator and viewer paired in `room`, with their join traffic consumed
async fn paired(addr: SocketAddr, room: &str) -> (Client, Client) {
    let mut creator = connect(addr).await;
    send(&mut creator, creator_join(room)).await;
    assert_eq!(recv(&mut creator).await["type"], "joined");

    let mut viewer = connect(addr).await;
    send(&mut viewer, viewer_join(room)).await;
    assert_eq!(recv(&mut viewer).await["type"], "ready");
    assert_eq!(recv(&mut viewer).await["type"], "joined");
    assert_eq!(recv(&mut creator).await["type"], "ready");

    (creator, viewer)
}

#[tokio::test]
async fn test_create_pair_and_busy() {
    let (addr, state) = start_server(RelayConfig::default()).await;

    let mut creator = connect(addr).await;
    send(&mut creator, creator_join("abc")).await;
    assert_eq!(recv(&mut creator).await, json!({"type": "joined", "room": "abc"}));

    let mut viewer = connect(addr).await;
    send(&mut viewer, viewer_join("abc")).await;

    let expected_ready = json!({
        "type": "ready",
        "room": "abc",
        "quality": {"width": 1280, "height": 720, "fps": 30, "bitrate": 500, "codec": "vp8"}
    });
    assert_eq!(recv(&mut viewer).await, expected_ready);
    assert_eq!(recv(&mut viewer).await, json!({"type": "joined", "room": "abc"}));
    assert_eq!(recv(&mut creator).await, expected_ready);

    let mut third = connect(addr).await;
    send(&mut third, viewer_join("abc")).await;
    assert_eq!(recv(&mut third).await, json!({"type": "error", "text": "room busy"}));
    expect_closed(&mut third).await;

    let snapshot = state.registry.lookup(&RoomName::new("abc")).await.unwrap();
    assert!(snapshot.has_creator);
    assert!(snapshot.has_viewer);
    assert_eq!(snapshot.quality.bitrate, 500);
}

#[tokio::test]
async fn test_viewer_cannot_create_room() {
    let (addr, state) = start_server(RelayConfig::default()).await;

    let mut viewer = connect(addr).await;
    send(&mut viewer, viewer_join("nobody-here")).await;
    assert_eq!(recv(&mut viewer).await, json!({"type": "error", "text": "not a creator"}));
    expect_closed(&mut viewer).await;

    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn test_explicit_roles() {
    let (addr, _state) = start_server(RelayConfig::default()).await;

    let mut creator = connect(addr).await;
    send(&mut creator, json!({"type": "join", "room": "r", "role": "create"})).await;
    assert_eq!(recv(&mut creator).await["type"], "joined");

    let mut rival = connect(addr).await;
    send(
        &mut rival,
        json!({"type": "join", "room": "r", "role": "create", "quality": {"bitrate": 900}}),
    )
    .await;
    assert_eq!(recv(&mut rival).await, json!({"type": "error", "text": "room busy"}));

    let mut viewer = connect(addr).await;
    send(
        &mut viewer,
        json!({"type": "join", "room": "r", "role": "view", "quality": {"bitrate": 900}}),
    )
    .await;
    let ready = recv(&mut viewer).await;
    assert_eq!(ready["type"], "ready");
    // Canonical quality comes from the creator, which sent none
    assert_eq!(ready["quality"]["bitrate"], 0);
}

#[tokio::test]
async fn test_relay_is_ordered_and_excludes_sender() {
    let (addr, _state) = start_server(RelayConfig::default()).await;
    let (mut creator, mut viewer) = paired(addr, "relay").await;

    let sent: Vec<Value> = (0..20)
        .map(|i| {
            json!({
                "type": "candidate",
                "room": "relay",
                "candidate": {"candidate": format!("candidate:{} 1 udp 1 10.0.0.1 {} typ host", i, 5000 + i)}
            })
        })
        .collect();
    for msg in &sent {
        send(&mut creator, msg.clone()).await;
    }
    for msg in &sent {
        assert_eq!(&recv(&mut viewer).await, msg);
    }

    // Nothing was echoed back: the creator's next message is the viewer's answer
    let answer = json!({"type": "answer", "room": "relay", "answer": {"type": "answer", "sdp": "v=0"}});
    send(&mut viewer, answer.clone()).await;
    assert_eq!(recv(&mut creator).await, answer);
}

#[tokio::test]
async fn test_payload_relayed_byte_for_byte() {
    let (addr, _state) = start_server(RelayConfig::default()).await;
    let (mut creator, mut viewer) = paired(addr, "raw").await;

    // Unusual spacing and key order must survive untouched
    let raw = "{ \"sdp\" : \"v=0\\r\\n\",\"type\":\"offer\",   \"room\":\"raw\" }";
    creator.send(Message::text(raw)).await.unwrap();

    let received = loop {
        match tokio::time::timeout(RECV_TIMEOUT, viewer.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => break text.as_str().to_owned(),
            Some(Ok(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    };
    assert_eq!(received, raw);
}

#[tokio::test]
async fn test_unknown_and_malformed_messages_keep_connection() {
    let (addr, _state) = start_server(RelayConfig::default()).await;
    let (mut creator, mut viewer) = paired(addr, "noise").await;

    creator.send(Message::text("{definitely not json")).await.unwrap();
    send(&mut creator, json!({"type": "wave", "room": "noise"})).await;
    send(&mut creator, json!({"type": "state", "room": "noise", "state": "connected"})).await;

    assert_eq!(
        recv(&mut viewer).await,
        json!({"type": "state", "room": "noise", "state": "connected"})
    );
}

#[tokio::test]
async fn test_creator_disconnect_destroys_room() {
    let (addr, state) = start_server(RelayConfig::default()).await;
    let (creator, mut viewer) = paired(addr, "gone").await;

    drop(creator);

    assert_eq!(recv(&mut viewer).await, json!({"type": "leave", "room": "gone"}));
    let registry = state.registry.clone();
    wait_for(|| {
        let registry = registry.clone();
        async move { registry.lookup(&RoomName::new("gone")).await.is_none() }
    })
    .await;

    // The room name is free for a new creator
    let mut next = connect(addr).await;
    send(&mut next, creator_join("gone")).await;
    assert_eq!(recv(&mut next).await["type"], "joined");
}

#[tokio::test]
async fn test_viewer_replacement() {
    let (addr, state) = start_server(RelayConfig::default()).await;
    let (mut creator, viewer) = paired(addr, "swap").await;
    let room = RoomName::new("swap");

    // Viewer vanishes out-of-band
    drop(viewer);
    let registry = state.registry.clone();
    wait_for(|| {
        let registry = registry.clone();
        let room = room.clone();
        async move {
            registry
                .lookup(&room)
                .await
                .is_some_and(|r| !r.has_viewer && r.viewer_left)
        }
    })
    .await;

    // Relay without a viewer is a no-op and keeps the creator connected
    send(&mut creator, json!({"type": "offer", "room": "swap", "offer": {}})).await;

    let mut replacement = connect(addr).await;
    send(&mut replacement, viewer_join("swap")).await;

    assert_eq!(recv(&mut creator).await, json!({"type": "peer-replaced", "room": "swap"}));
    let ready = recv(&mut replacement).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["quality"]["bitrate"], 500);
    assert_eq!(recv(&mut replacement).await["type"], "joined");

    // The stale offer was never delivered; fresh traffic flows
    let offer = json!({"type": "offer", "room": "swap", "offer": {"sdp": "v=0"}});
    send(&mut creator, offer.clone()).await;
    assert_eq!(recv(&mut replacement).await, offer);
}

#[tokio::test]
async fn test_creator_leave_request() {
    let (addr, state) = start_server(RelayConfig::default()).await;
    let (mut creator, mut viewer) = paired(addr, "bye").await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/leave", addr))
        .body(r#"{"type":"creator","room":"bye"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(recv(&mut viewer).await, json!({"type": "leave", "room": "bye"}));
    expect_closed(&mut viewer).await;
    expect_closed(&mut creator).await;
    assert!(state.registry.lookup(&RoomName::new("bye")).await.is_none());
}

#[tokio::test]
async fn test_leave_request_validation() {
    let (addr, state) = start_server(RelayConfig::default()).await;
    let http = reqwest::Client::new();
    let url = format!("http://{}/leave", addr);

    // Absent room: success, no side effects
    let response = http
        .post(&url)
        .body(r#"{"type":"creator","room":"never-existed"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(state.registry.is_empty().await);

    // Viewer leave is informational
    let (_creator, _viewer) = paired(addr, "stay").await;
    let response = http
        .post(&url)
        .body(r#"{"type":"viewer","room":"stay"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let snapshot = state.registry.lookup(&RoomName::new("stay")).await.unwrap();
    assert!(snapshot.has_creator && snapshot.has_viewer);

    let response = http.post(&url).body("not json").send().await.unwrap();
    assert_eq!(response.status(), 400);

    let response = http.post(&url).body(r#"{"type":"creator"}"#).send().await.unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_connection_id_from_query() {
    let (addr, _state) = start_server(RelayConfig::default()).await;

    let (mut client, _) = connect_async(format!("ws://{}/ws?id=my-viewer", addr))
        .await
        .unwrap();
    send(&mut client, creator_join("query")).await;
    assert_eq!(recv(&mut client).await["type"], "joined");
}

#[tokio::test]
async fn test_missed_heartbeat_closes_connection() {
    let config = RelayConfig {
        ping_period: Duration::from_millis(50),
        pong_wait: Duration::from_millis(300),
        ..RelayConfig::default()
    };
    let (addr, state) = start_server(config).await;

    // Join, then never read again: pings go unanswered
    let mut silent = connect(addr).await;
    send(&mut silent, creator_join("quiet")).await;

    let registry = state.registry.clone();
    wait_for(|| {
        let registry = registry.clone();
        async move { registry.lookup(&RoomName::new("quiet")).await.is_some() }
    })
    .await;
    wait_for(|| {
        let registry = registry.clone();
        async move { registry.is_empty().await }
    })
    .await;
}

#[tokio::test]
async fn test_answered_heartbeats_keep_connection() {
    let config = RelayConfig {
        ping_period: Duration::from_millis(50),
        pong_wait: Duration::from_millis(300),
        ..RelayConfig::default()
    };
    let (addr, state) = start_server(config).await;

    let mut client = connect(addr).await;
    send(&mut client, creator_join("alive")).await;
    assert_eq!(recv(&mut client).await["type"], "joined");

    // Reading answers pings with pongs
    let reader = tokio::spawn(async move {
        let _ = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(Ok(_)) = client.next().await {}
        })
        .await;
        client
    });
    let _client = reader.await.unwrap();

    assert!(state.registry.lookup(&RoomName::new("alive")).await.is_some());
}

#[tokio::test]
async fn test_oversized_message_closes_connection() {
    let config = RelayConfig {
        max_message_size: 1024,
        ..RelayConfig::default()
    };
    let (addr, state) = start_server(config).await;
    let (mut creator, mut viewer) = paired(addr, "big").await;

    let huge = json!({"type": "offer", "room": "big", "sdp": "x".repeat(4096)});
    let _ = creator.send(Message::text(huge.to_string())).await;

    // Creator is dropped, so the viewer is told to leave
    assert_eq!(recv(&mut viewer).await, json!({"type": "leave", "room": "big"}));
    assert!(state.registry.lookup(&RoomName::new("big")).await.is_none());
}

#[tokio::test]
async fn test_static_assets_with_index_fallback() {
    let (addr, _state) = start_server(RelayConfig::default()).await;
    let http = reqwest::Client::new();

    let script = http
        .get(format!("http://{}/core.js", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(script.status(), 200);
    assert_eq!(script.text().await.unwrap(), "console.log('core');");

    for path in ["/", "/room/abc", "/no/such/file.txt"] {
        let page = http.get(format!("http://{}{}", addr, path)).send().await.unwrap();
        assert_eq!(page.status(), 200, "{}", path);
        assert_eq!(page.text().await.unwrap(), "<html>relay index</html>", "{}", path);
    }
}
