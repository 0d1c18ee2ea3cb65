//! Drives a [`Shard`] against a scripted local gateway: handshake, identify, ready, session
//! invalidation, resume, and fatal closes.

use std::num::NonZeroU16;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use tempest::gateway::{
    ConnectionStage,
    GatewayError,
    IdentifyProperties,
    ReconnectType,
    Shard,
    ShardAction,
    ShardOptions,
};
use tempest::model::event::{Event, GatewayEvent};
use tempest::model::gateway::{GatewayIntents, ShardInfo};
use tempest::model::id::ShardId;
use tempest::Error;

const TOKEN: &str = "aaa.bbb.ccc";

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.expect("accept");
    tokio_tungstenite::accept_async(stream).await.expect("ws handshake")
}

async fn send_frame(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.expect("send frame");
}

async fn send_hello(ws: &mut WebSocketStream<TcpStream>) {
    send_frame(ws, json!({"op": 10, "d": {"heartbeat_interval": 45000}})).await;
}

/// Reads frames until a text payload arrives, skipping pings and the like.
async fn read_payload(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.expect("connection open").expect("frame") {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json"),
            _ => continue,
        }
    }
}

fn ready_frame(addr: &str, seq: u64) -> Value {
    json!({
        "op": 0,
        "s": seq,
        "t": "READY",
        "d": {
            "v": 10,
            "user": {"id": "2", "username": "shardbot", "bot": true},
            "session_id": "deadbeef",
            "resume_gateway_url": format!("ws://{addr}"),
            "shard": [0, 1],
            "guilds": []
        }
    })
}

async fn new_shard(addr: &str) -> Shard {
    Shard::new(ShardOptions {
        ws_url: Arc::from(format!("ws://{addr}")),
        token: SecretString::new(TOKEN.to_string()),
        shard_info: ShardInfo {
            id: ShardId(0),
            total: NonZeroU16::new(1).unwrap(),
        },
        intents: GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES,
        gateway_version: 10,
        large_threshold: 250,
        presence: None,
        properties: IdentifyProperties::default(),
    })
    .await
    .expect("shard connects")
}

/// Polls the shard's client until a frame (or connection error) arrives.
async fn next_event(shard: &mut Shard) -> tempest::Result<GatewayEvent> {
    // recv_json polls with an internal 500ms timeout and returns None on each miss.
    for _ in 0..40 {
        match shard.client.recv_json().await {
            Ok(Some(event)) => return Ok(event),
            Ok(None) => continue,
            Err(why) => return Err(why),
        }
    }

    panic!("no frame from the scripted gateway within 20 seconds");
}

#[tokio::test]
async fn handshake_identify_ready() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server_addr = addr.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_hello(&mut ws).await;

        let identify = read_payload(&mut ws).await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], TOKEN);
        assert_eq!(identify["d"]["shard"], json!([0, 1]));
        assert_eq!(identify["d"]["large_threshold"], 250);
        assert_eq!(identify["d"]["intents"], 513);
        assert!(identify["d"]["properties"]["os"].is_string());

        send_frame(&mut ws, ready_frame(&server_addr, 1)).await;

        // Hold the connection open until the client side is done with it.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut shard = new_shard(&addr).await;
    assert_eq!(shard.stage(), ConnectionStage::Handshake);
    assert_eq!(shard.seq(), 0);
    assert!(shard.session_id().is_none());

    // HELLO must arrive before anything is transmitted, and asks us to identify.
    let event = next_event(&mut shard).await;
    let (action, dispatched) = shard.handle_event(event).unwrap();
    assert!(matches!(action, Some(ShardAction::Identify)));
    assert!(dispatched.is_none());
    assert_eq!(shard.heartbeat_interval(), Some(Duration::from_millis(45000)));

    // The runner would wait for queue admission here; grant it directly.
    shard.identify().await.unwrap();
    assert_eq!(shard.stage(), ConnectionStage::Identifying);

    // READY adopts the session.
    let event = next_event(&mut shard).await;
    let (action, dispatched) = shard.handle_event(event).unwrap();
    assert!(action.is_none());
    assert!(matches!(dispatched, Some(Event::Ready(_))));
    assert_eq!(shard.stage(), ConnectionStage::Connected);
    assert_eq!(shard.session_id(), Some("deadbeef"));

    let session = shard.session().expect("session established");
    assert_eq!(session.session_id, "deadbeef");
    assert_eq!(session.seq, 1);

    drop(shard);
    server.await.unwrap();
}

#[tokio::test]
async fn dispatch_sequence_is_monotonic() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server_addr = addr.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_hello(&mut ws).await;
        let _identify = read_payload(&mut ws).await;
        send_frame(&mut ws, ready_frame(&server_addr, 1)).await;

        for seq in 2..=4u64 {
            send_frame(
                &mut ws,
                json!({
                    "op": 0,
                    "s": seq,
                    "t": "TYPING_START",
                    "d": {"channel_id": "10", "user_id": "20", "timestamp": 0}
                }),
            )
            .await;
        }

        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut shard = new_shard(&addr).await;

    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();
    shard.identify().await.unwrap();
    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();
    assert_eq!(shard.seq(), 1);

    for expected_seq in 2..=4u64 {
        let event = next_event(&mut shard).await;
        let (_, dispatched) = shard.handle_event(event).unwrap();
        assert!(matches!(dispatched, Some(Event::TypingStart(_))));
        assert_eq!(shard.seq(), expected_seq);
    }

    drop(shard);
    server.await.unwrap();
}

#[tokio::test]
async fn invalid_session_discards_and_asks_to_reidentify() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_hello(&mut ws).await;
        let _identify = read_payload(&mut ws).await;

        // Reject the identify outright.
        send_frame(&mut ws, json!({"op": 9, "d": false})).await;

        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut shard = new_shard(&addr).await;

    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();
    shard.identify().await.unwrap();

    let event = next_event(&mut shard).await;
    let (action, _) = shard.handle_event(event).unwrap();
    assert!(matches!(action, Some(ShardAction::Reidentify)));
    assert!(shard.session_id().is_none());
    assert_eq!(shard.seq(), 0);
    assert_eq!(shard.stage(), ConnectionStage::Handshake);

    drop(shard);
    server.await.unwrap();
}

#[tokio::test]
async fn reconnect_request_resumes_on_the_resume_url() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server_addr = addr.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_hello(&mut ws).await;
        let _identify = read_payload(&mut ws).await;
        send_frame(&mut ws, ready_frame(&server_addr, 1)).await;

        // Ask the shard to reconnect.
        send_frame(&mut ws, json!({"op": 7, "d": null})).await;

        // The shard opens a second connection and resumes the session on it.
        let mut resumed_ws = accept(&listener).await;
        let resume = read_payload(&mut resumed_ws).await;
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["session_id"], "deadbeef");
        assert_eq!(resume["d"]["seq"], 1);
        assert_eq!(resume["d"]["token"], TOKEN);

        send_frame(&mut resumed_ws, json!({"op": 0, "s": 2, "t": "RESUMED", "d": {}})).await;

        while let Some(Ok(_)) = resumed_ws.next().await {}
    });

    let mut shard = new_shard(&addr).await;

    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();
    shard.identify().await.unwrap();
    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();

    // RECONNECT means: preserve the session and resume.
    let event = next_event(&mut shard).await;
    let (action, _) = shard.handle_event(event).unwrap();
    assert!(matches!(action, Some(ShardAction::Reconnect(ReconnectType::Resume))));

    shard.resume().await.unwrap();
    assert_eq!(shard.stage(), ConnectionStage::Resuming);

    // RESUMED leaves the session in place; exactly one RESUME preceded this Ready state.
    let event = next_event(&mut shard).await;
    let (action, dispatched) = shard.handle_event(event).unwrap();
    assert!(action.is_none());
    assert!(matches!(dispatched, Some(Event::Resumed(_))));
    assert_eq!(shard.stage(), ConnectionStage::Connected);
    assert_eq!(shard.session_id(), Some("deadbeef"));

    drop(shard);
    server.await.unwrap();
}

#[tokio::test]
async fn fatal_close_code_surfaces_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_hello(&mut ws).await;
        let _identify = read_payload(&mut ws).await;

        // Disallowed intents: the shard must give up for good.
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4014),
            reason: "Disallowed intent(s).".into(),
        }))
        .await
        .expect("close");
    });

    let mut shard = new_shard(&addr).await;

    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();
    shard.identify().await.unwrap();

    let closed = next_event(&mut shard).await;
    assert!(matches!(closed, Err(Error::Gateway(GatewayError::Closed(_)))));

    let result = shard.handle_event(closed);
    assert!(matches!(result, Err(Error::Gateway(GatewayError::DisallowedGatewayIntents))));

    drop(shard);
    server.await.unwrap();
}

#[tokio::test]
async fn resumable_close_code_keeps_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server_addr = addr.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_hello(&mut ws).await;
        let _identify = read_payload(&mut ws).await;
        send_frame(&mut ws, ready_frame(&server_addr, 1)).await;

        ws.close(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "Unknown error.".into(),
        }))
        .await
        .expect("close");
    });

    let mut shard = new_shard(&addr).await;

    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();
    shard.identify().await.unwrap();
    let event = next_event(&mut shard).await;
    shard.handle_event(event).unwrap();

    let closed = next_event(&mut shard).await;
    let (action, _) = shard.handle_event(closed).unwrap();
    assert!(matches!(action, Some(ShardAction::Reconnect(ReconnectType::Resume))));
    assert_eq!(shard.session_id(), Some("deadbeef"));

    drop(shard);
    server.await.unwrap();
}
