mod support;

use std::time::Duration;

use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use support::{expect_silence, next_json, next_of_type, room_hash, send_json, send_raw, TestServer};

const QUIET: Duration = Duration::from_millis(300);

#[tokio::test]
async fn health_check_responds_ok() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write");

    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
}

#[tokio::test]
async fn upgrade_without_valid_session_is_rejected() {
    let server = TestServer::start().await;

    for url in [server.ws_url(), format!("{}?token=unknown", server.ws_url())] {
        match connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("upgrade should be rejected"),
        }
    }
    assert_eq!(server.registry.session_count().await, 0);
}

#[tokio::test]
async fn query_token_authenticates() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &[]).await;

    let (_ws, _) = connect_async(format!("{}?token=tok-alice", server.ws_url()))
        .await
        .expect("upgrade with query token");

    let registry = server.registry.clone();
    server
        .wait_until(|| {
            let registry = registry.clone();
            async move { registry.session_count().await == 1 }
        })
        .await;
}

#[tokio::test]
async fn message_reaches_other_room_members_only() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &["abc"]).await;
    server.login("tok-bob", 2, "bob", &["abc"]).await;
    server.login("tok-carol", 3, "carol", &["other"]).await;

    let mut alice = server.connect("tok-alice").await;
    let mut bob = server.connect("tok-bob").await;
    let mut carol = server.connect("tok-carol").await;
    server.join(&mut alice, "abc", 1).await;
    server.join(&mut bob, "abc", 2).await;
    server.join(&mut carol, "other", 3).await;

    send_json(
        &mut alice,
        json!({"type": "message", "payload": {"roomHash": "abc", "message": "hello bob"}}),
    )
    .await;

    let frame = next_json(&mut bob).await;
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["payload"]["roomHash"], "abc");
    assert_eq!(frame["payload"]["message"], "hello bob");
    assert_eq!(frame["payload"]["sender"], json!({"id": 1, "nickname": "alice"}));
    assert!(frame["payload"]["created_at"].is_string());

    expect_silence(&mut alice, QUIET).await;
    expect_silence(&mut carol, QUIET).await;

    let stored = server.store.messages_in(&room_hash("abc")).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sender_id, UserId(1));
    assert_eq!(stored[0].text, "hello bob");
}

#[tokio::test]
async fn typing_is_relayed_with_sender_id() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &["abc"]).await;
    server.login("tok-bob", 2, "bob", &["abc"]).await;

    let mut alice = server.connect("tok-alice").await;
    let mut bob = server.connect("tok-bob").await;
    server.join(&mut alice, "abc", 1).await;
    server.join(&mut bob, "abc", 2).await;

    send_json(&mut bob, json!({"type": "typing", "payload": {"roomHash": "abc"}})).await;

    let frame = next_json(&mut alice).await;
    assert_eq!(
        frame,
        json!({
            "type": "typing",
            "payload": {
                "roomHash": "abc",
                "sender": {"id": 2, "nickname": "bob"},
                "senderID": 2
            }
        })
    );
    expect_silence(&mut bob, QUIET).await;
    assert!(server.store.messages().await.is_empty());
}

#[tokio::test]
async fn denied_join_reports_error_and_keeps_connection_open() {
    let server = TestServer::start().await;
    server.login("tok-dave", 4, "dave", &[]).await;

    let mut dave = server.connect("tok-dave").await;
    send_json(&mut dave, json!({"type": "join_room", "payload": {"roomHash": "abc"}})).await;

    let frame = next_json(&mut dave).await;
    assert_eq!(
        frame,
        json!({"type": "error", "payload": {"message": "Access denied to room abc"}})
    );
    assert!(!server.registry.is_member(&room_hash("abc"), UserId(4)).await);
    assert_eq!(server.registry.active_room_count().await, 0);

    // 连接仍可继续使用
    send_json(&mut dave, json!({"type": "shout", "payload": {}})).await;
    let frame = next_json(&mut dave).await;
    assert_eq!(frame["payload"]["message"], "Unknown message type");
}

#[tokio::test]
async fn malformed_frames_are_reported_per_frame() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &["abc"]).await;
    let mut alice = server.connect("tok-alice").await;

    send_raw(&mut alice, "not json").await;
    assert_eq!(next_json(&mut alice).await["payload"]["message"], "Invalid message format");

    send_json(&mut alice, json!({"type": "join_room", "payload": {}})).await;
    assert_eq!(next_json(&mut alice).await["payload"]["message"], "Invalid join room message");

    send_json(&mut alice, json!({"type": "message", "payload": {"roomHash": "abc"}})).await;
    assert_eq!(next_json(&mut alice).await["payload"]["message"], "Invalid message message");

    alice
        .send(Message::Binary(vec![0xff, 0xfe].into()))
        .await
        .expect("send binary");
    assert_eq!(next_json(&mut alice).await["payload"]["message"], "Invalid message format");

    // UTF-8 二进制帧按文本处理
    alice
        .send(Message::Binary(
            br#"{"type":"join_room","payload":{"roomHash":"abc"}}"#.to_vec().into(),
        ))
        .await
        .expect("send binary");
    let registry = server.registry.clone();
    server
        .wait_until(|| {
            let registry = registry.clone();
            async move { registry.is_member(&room_hash("abc"), UserId(1)).await }
        })
        .await;
}

#[tokio::test]
async fn persistence_failure_still_delivers_and_notifies_sender() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &["abc"]).await;
    server.login("tok-bob", 2, "bob", &["abc"]).await;
    server.store.set_failing(true);

    let mut alice = server.connect("tok-alice").await;
    let mut bob = server.connect("tok-bob").await;
    server.join(&mut alice, "abc", 1).await;
    server.join(&mut bob, "abc", 2).await;

    send_json(
        &mut alice,
        json!({"type": "message", "payload": {"roomHash": "abc", "message": "unsaved"}}),
    )
    .await;

    let delivered = next_json(&mut bob).await;
    assert_eq!(delivered["payload"]["message"], "unsaved");

    let error = next_of_type(&mut alice, "error").await;
    assert_eq!(error["payload"]["message"], "Failed to save message");
}

#[tokio::test]
async fn rejoin_from_new_connection_supersedes_old_one() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &["abc"]).await;
    server.login("tok-bob", 2, "bob", &["abc"]).await;

    let mut old_tab = server.connect("tok-alice").await;
    let mut new_tab = server.connect("tok-alice").await;
    let mut bob = server.connect("tok-bob").await;
    server.join(&mut old_tab, "abc", 1).await;
    server.join(&mut new_tab, "abc", 1).await;
    server.join(&mut bob, "abc", 2).await;

    send_json(
        &mut bob,
        json!({"type": "message", "payload": {"roomHash": "abc", "message": "hi"}}),
    )
    .await;

    assert_eq!(next_json(&mut new_tab).await["payload"]["message"], "hi");
    expect_silence(&mut old_tab, QUIET).await;

    // 旧连接断开不影响新连接的成员身份
    old_tab.close(None).await.expect("close");
    let registry = server.registry.clone();
    server
        .wait_until(|| {
            let registry = registry.clone();
            async move { registry.session_count().await == 2 }
        })
        .await;
    assert!(server.registry.is_member(&room_hash("abc"), UserId(1)).await);
}

#[tokio::test]
async fn disconnect_removes_session_everywhere() {
    let server = TestServer::start().await;
    server.login("tok-alice", 1, "alice", &["abc", "def"]).await;

    let mut alice = server.connect("tok-alice").await;
    server.join(&mut alice, "abc", 1).await;
    server.join(&mut alice, "def", 1).await;
    assert_eq!(server.registry.active_room_count().await, 2);

    alice.close(None).await.expect("close");

    let registry = server.registry.clone();
    server
        .wait_until(|| {
            let registry = registry.clone();
            async move {
                registry.session_count().await == 0 && registry.active_room_count().await == 0
            }
        })
        .await;
}

#[tokio::test]
async fn keepalive_pings_arrive_on_interval() {
    let server = TestServer::start_with(Duration::from_millis(100), Duration::from_secs(60)).await;
    server.login("tok-alice", 1, "alice", &[]).await;
    let mut alice = server.connect("tok-alice").await;

    let ping = timeout(Duration::from_secs(3), async {
        loop {
            match alice.next().await {
                Some(Ok(Message::Ping(_))) => return true,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    })
    .await
    .expect("timed out waiting for ping");
    assert!(ping);
}
