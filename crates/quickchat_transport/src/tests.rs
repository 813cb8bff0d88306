use crate::message::{ClientEvent, InboundEnvelope};
use crate::protocol::{self, CONTROL_TOPIC, REPLY_EVENT, SYSTEM_EVENT};
use crate::session::{SessionOptions, run_session};
use futures_util::{SinkExt, StreamExt};
use quickchat_hub::Hub;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::{Message as WsMessage, Role};

fn inbound(value: Value) -> InboundEnvelope {
    serde_json::from_value(value).unwrap()
}

fn decode(frame: WsMessage) -> Value {
    match frame {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

fn drain(rx: &mut Receiver<WsMessage>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(decode(frame));
    }
    out
}

// ---- protocol ----

#[test]
fn test_event_aliases() {
    let kind = |event: &str| inbound(json!({ "topic": "t", "event": event })).kind();
    assert_eq!(kind("phx_join"), ClientEvent::Join);
    assert_eq!(kind("join"), ClientEvent::Join);
    assert_eq!(kind("phx_leave"), ClientEvent::Leave);
    assert_eq!(kind("leave"), ClientEvent::Leave);
    assert_eq!(kind("heartbeat"), ClientEvent::Heartbeat);
    assert_eq!(kind("access_token"), ClientEvent::Other);
}

#[test]
fn test_inbound_defaults() {
    let msg = inbound(json!({ "topic": "phoenix", "event": "heartbeat" }));
    assert_eq!(msg.payload, Value::Null);
    assert_eq!(msg.reference, None);

    let msg = inbound(json!({ "topic": "phoenix", "event": "heartbeat", "ref": "7" }));
    assert_eq!(msg.reference.as_deref(), Some("7"));
}

#[test]
fn test_missing_topic_and_event_decode_as_empty() {
    let msg = inbound(json!({ "event": "heartbeat", "ref": "R1" }));
    assert_eq!(msg.topic, "");
    assert_eq!(msg.kind(), ClientEvent::Heartbeat);

    let msg = inbound(json!({ "topic": "room" }));
    assert_eq!(msg.event, "");
    assert_eq!(msg.kind(), ClientEvent::Other);
}

#[test]
fn test_join_subscribes_and_replies_twice() {
    let hub = Hub::new();
    let (id, mut rx) = hub.register_session(8);

    protocol::dispatch(
        &hub,
        id,
        inbound(json!({
            "topic": "realtime:messages:S1",
            "event": "phx_join",
            "payload": {},
            "ref": "1"
        })),
    );

    assert!(hub.subscribers("realtime:messages:S1").contains(&id));

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 2);

    let reply = &frames[0];
    assert_eq!(reply["topic"], "realtime:messages:S1");
    assert_eq!(reply["event"], REPLY_EVENT);
    assert_eq!(reply["ref"], "1");
    assert_eq!(reply["payload"]["status"], "ok");
    assert_eq!(reply["payload"]["response"]["filter"], "session_id=eq.S1");
    assert_eq!(reply["payload"]["response"]["event"], "INSERT");
    assert_eq!(reply["payload"]["response"]["schema"], "public");
    assert_eq!(reply["payload"]["response"]["table"], "messages");

    let notice = &frames[1];
    assert_eq!(notice["topic"], "realtime:messages:S1");
    assert_eq!(notice["event"], SYSTEM_EVENT);
    assert_eq!(notice["payload"]["channel"], "messages:S1");
    assert_eq!(notice["payload"]["status"], "ok");
    assert_eq!(notice["payload"]["extension"], "postgres_changes");
    assert!(notice.get("ref").is_none());
}

#[test]
fn test_join_unprefixed_topic_has_empty_filter() {
    let hub = Hub::new();
    let (id, mut rx) = hub.register_session(8);

    protocol::dispatch(&hub, id, inbound(json!({ "topic": "lobby", "event": "join" })));

    assert!(hub.subscribers("lobby").contains(&id));
    let frames = drain(&mut rx);
    assert_eq!(frames[0]["payload"]["response"]["filter"], "");
    assert_eq!(frames[1]["payload"]["channel"], "lobby");
}

#[test]
fn test_filter_key_and_channel_name() {
    assert_eq!(protocol::filter_key("realtime:messages:abc"), Some("abc"));
    assert_eq!(protocol::filter_key("realtime:messages:"), None);
    assert_eq!(protocol::filter_key("realtime:presence"), None);
    assert_eq!(protocol::channel_name("realtime:messages:abc"), "messages:abc");
    assert_eq!(protocol::channel_name("plain"), "plain");
}

#[test]
fn test_heartbeat_echoes_ref_on_control_topic() {
    let hub = Hub::new();
    let (id, mut rx) = hub.register_session(8);

    protocol::dispatch(
        &hub,
        id,
        inbound(json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "42" })),
    );

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["topic"], CONTROL_TOPIC);
    assert_eq!(frames[0]["event"], REPLY_EVENT);
    assert_eq!(frames[0]["ref"], "42");
    assert_eq!(frames[0]["payload"], json!({ "status": "ok", "response": {} }));
    // Heartbeats never create topics.
    assert_eq!(hub.topic_count(), 0);
}

#[test]
fn test_leave_unsubscribes_and_replies() {
    let hub = Hub::new();
    let (id, mut rx) = hub.register_session(8);
    hub.join(id, "room");

    protocol::dispatch(
        &hub,
        id,
        inbound(json!({ "topic": "room", "event": "phx_leave", "ref": "9" })),
    );

    assert!(!hub.subscribers("room").contains(&id));
    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["topic"], "room");
    assert_eq!(frames[0]["ref"], "9");
}

#[test]
fn test_unknown_event_is_ignored() {
    let hub = Hub::new();
    let (id, mut rx) = hub.register_session(8);

    protocol::dispatch(
        &hub,
        id,
        inbound(json!({ "topic": "room", "event": "access_token", "payload": {"token": "x"} })),
    );

    assert!(drain(&mut rx).is_empty());
    assert_eq!(hub.topic_count(), 0);
    assert!(hub.is_live(id));
}

// ---- connection pumps over an in-memory socket ----

struct Harness {
    hub: Hub,
    client: WebSocketStream<DuplexStream>,
    server: JoinHandle<()>,
}

async fn connect(options: SessionOptions) -> Harness {
    let hub = Hub::new();
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let server = tokio::spawn(run_session(hub.clone(), server_ws, options));
    Harness {
        hub,
        client,
        server,
    }
}

fn quick_options() -> SessionOptions {
    SessionOptions {
        queue_capacity: 64,
        write_wait: Duration::from_secs(1),
        pong_wait: Duration::from_secs(5),
        ping_period: Duration::from_secs(4),
    }
}

async fn send_json(client: &mut WebSocketStream<DuplexStream>, value: Value) {
    client
        .send(WsMessage::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame from the server, skipping keepalive pings.
async fn next_text(client: &mut WebSocketStream<DuplexStream>) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        match frame {
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => return decode(other),
        }
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_heartbeat_round_trip() {
    let mut h = connect(quick_options()).await;

    send_json(
        &mut h.client,
        json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "1" }),
    )
    .await;

    let reply = next_text(&mut h.client).await;
    assert_eq!(reply["topic"], "phoenix");
    assert_eq!(reply["event"], "phx_reply");
    assert_eq!(reply["ref"], "1");
}

#[tokio::test]
async fn test_heartbeat_without_topic_is_answered() {
    let mut h = connect(quick_options()).await;

    send_json(&mut h.client, json!({ "event": "heartbeat", "ref": "R1" })).await;

    let reply = next_text(&mut h.client).await;
    assert_eq!(reply["topic"], "phoenix");
    assert_eq!(reply["event"], "phx_reply");
    assert_eq!(reply["ref"], "R1");
    assert_eq!(reply["payload"]["status"], "ok");
}

#[tokio::test]
async fn test_undecodable_frame_keeps_connection() {
    let mut h = connect(quick_options()).await;

    h.client
        .send(WsMessage::Text("this is not json".into()))
        .await
        .unwrap();
    send_json(&mut h.client, json!({ "topic": "only-a-topic" })).await;
    send_json(
        &mut h.client,
        json!({ "topic": "phoenix", "event": "heartbeat", "ref": "2" }),
    )
    .await;

    let reply = next_text(&mut h.client).await;
    assert_eq!(reply["ref"], "2");
    assert_eq!(h.hub.session_count(), 1);
}

#[tokio::test]
async fn test_join_then_receive_broadcast() {
    let mut h = connect(quick_options()).await;

    send_json(
        &mut h.client,
        json!({ "topic": "realtime:messages:S1", "event": "phx_join", "payload": {}, "ref": "1" }),
    )
    .await;
    assert_eq!(next_text(&mut h.client).await["event"], "phx_reply");
    assert_eq!(next_text(&mut h.client).await["event"], "system");

    let delivered = h
        .hub
        .publish("realtime:messages:S1", "postgres_changes", json!({ "n": 1 }));
    assert_eq!(delivered, 1);

    let event = next_text(&mut h.client).await;
    assert_eq!(event["topic"], "realtime:messages:S1");
    assert_eq!(event["event"], "postgres_changes");
    assert_eq!(event["payload"], json!({ "n": 1 }));
}

#[tokio::test]
async fn test_broadcasts_arrive_in_order() {
    let mut h = connect(quick_options()).await;

    send_json(&mut h.client, json!({ "topic": "room", "event": "phx_join", "ref": "1" })).await;
    next_text(&mut h.client).await;
    next_text(&mut h.client).await;

    for n in 0..20 {
        h.hub.publish("room", "msg", json!({ "n": n }));
    }
    for n in 0..20 {
        assert_eq!(next_text(&mut h.client).await["payload"]["n"], n);
    }
}

#[tokio::test]
async fn test_server_sends_keepalive_pings() {
    let mut h = connect(SessionOptions {
        ping_period: Duration::from_millis(50),
        ..quick_options()
    })
    .await;

    let got_ping = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(frame)) = h.client.next().await {
            if let WsMessage::Ping(_) = frame {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(got_ping);
}

#[tokio::test]
async fn test_silent_client_is_dropped_after_read_deadline() {
    let h = connect(SessionOptions {
        pong_wait: Duration::from_millis(150),
        ping_period: Duration::from_secs(10),
        ..quick_options()
    })
    .await;

    wait_until(|| h.hub.session_count() == 1).await;
    wait_until(|| h.hub.session_count() == 0).await;
    tokio::time::timeout(Duration::from_secs(2), h.server)
        .await
        .unwrap()
        .unwrap();
    drop(h.client);
}

#[tokio::test]
async fn test_responsive_client_stays_connected() {
    let Harness {
        hub,
        mut client,
        server: _server,
    } = connect(SessionOptions {
        pong_wait: Duration::from_millis(300),
        ping_period: Duration::from_millis(100),
        ..quick_options()
    })
    .await;

    // Reading is enough: pings are answered with pongs automatically.
    let reader = tokio::spawn(async move { while let Some(Ok(_)) = client.next().await {} });

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(hub.session_count(), 1);
    reader.abort();
}

#[tokio::test]
async fn test_unregister_closes_connection() {
    let mut h = connect(quick_options()).await;

    send_json(&mut h.client, json!({ "topic": "room", "event": "phx_join", "ref": "1" })).await;
    next_text(&mut h.client).await;
    next_text(&mut h.client).await;

    let id = *h.hub.subscribers("room").iter().next().unwrap();
    assert!(h.hub.unregister_session(id));

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match h.client.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
    tokio::time::timeout(Duration::from_secs(2), h.server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_stalled_writes_end_session_after_write_deadline() {
    // A tiny socket buffer and a client that never reads: writes stall once
    // the buffer is full. The queue is large enough that eviction cannot be
    // what ends the session.
    let hub = Hub::new();
    let (server_io, client_io) = tokio::io::duplex(256);
    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let server = tokio::spawn(run_session(
        hub.clone(),
        server_ws,
        SessionOptions {
            queue_capacity: 1024,
            write_wait: Duration::from_millis(500),
            ..quick_options()
        },
    ));

    send_json(&mut client, json!({ "topic": "room", "event": "phx_join", "ref": "1" })).await;
    wait_until(|| hub.topic_count() == 1).await;

    let padding = "x".repeat(100);
    for n in 0..200 {
        hub.publish("room", "msg", json!({ "n": n, "padding": padding }));
    }

    wait_until(|| hub.session_count() == 0).await;
    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hub.topic_count(), 0);
    drop(client);
}

#[tokio::test]
async fn test_client_disconnect_unregisters_session() {
    let mut h = connect(quick_options()).await;

    send_json(&mut h.client, json!({ "topic": "room", "event": "phx_join", "ref": "1" })).await;
    next_text(&mut h.client).await;
    assert_eq!(h.hub.session_count(), 1);

    h.client.close(None).await.unwrap();
    drop(h.client);

    wait_until(|| h.hub.session_count() == 0).await;
    assert_eq!(h.hub.topic_count(), 0);
}
