#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatGateway, ChatGatewayDependencies, ConnectionRegistry, MemoryMessageStore,
    MemoryRoomAccessOracle, MemorySessionAuthenticator, RoomGate, SystemClock,
};
use config::AppConfig;
use domain::{Identity, RoomHash, UserId};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// 使用内存协作者在随机端口上运行完整路由
pub struct TestServer {
    pub addr: SocketAddr,
    pub authenticator: Arc<MemorySessionAuthenticator>,
    pub oracle: Arc<MemoryRoomAccessOracle>,
    pub store: Arc<MemoryMessageStore>,
    pub registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
}

impl TestServer {
    /// 心跳和在线广播都设得很长，避免干扰断言
    pub async fn start() -> Self {
        Self::start_with(Duration::from_secs(60), Duration::from_secs(60)).await
    }

    pub async fn start_with(ping_interval: Duration, presence_interval: Duration) -> Self {
        let config = AppConfig::default();
        let shutdown = CancellationToken::new();

        let authenticator = Arc::new(MemorySessionAuthenticator::new());
        let oracle = Arc::new(MemoryRoomAccessOracle::new());
        let store = Arc::new(MemoryMessageStore::new());
        let registry = ConnectionRegistry::start(
            RoomGate::new(oracle.clone()),
            presence_interval,
            shutdown.clone(),
        );

        let gateway = Arc::new(ChatGateway::new(ChatGatewayDependencies {
            authenticator: authenticator.clone(),
            registry: registry.clone(),
            message_store: store.clone(),
            clock: Arc::new(SystemClock),
        }));

        let state = AppState::new(gateway, config.auth.session_cookie, ping_interval);
        let app = router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .ok();
        });

        Self {
            addr,
            authenticator,
            oracle,
            store,
            registry,
            shutdown,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }

    /// 注册一个登录会话并授予若干房间的访问权
    pub async fn login(&self, token: &str, id: i64, nickname: &str, rooms: &[&str]) {
        self.authenticator
            .insert(token, Identity::new(id, nickname))
            .await;
        for room in rooms {
            self.oracle.grant(room_hash(room), UserId(id)).await;
        }
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let mut request = self.ws_url().into_client_request().expect("request");
        request.headers_mut().insert(
            "Cookie",
            format!("session_token={}", token).parse().expect("cookie header"),
        );
        let (ws, _) = connect_async(request).await.expect("websocket connect");
        ws
    }

    /// 发送 join_room，并确认其已处理完毕（加入成功没有回执帧）
    pub async fn join(&self, ws: &mut WsClient, room: &str, user_id: i64) {
        send_json(
            ws,
            serde_json::json!({"type": "join_room", "payload": {"roomHash": room}}),
        )
        .await;
        barrier(ws).await;
        assert!(
            self.registry.is_member(&room_hash(room), UserId(user_id)).await,
            "join was not accepted"
        );
    }

    pub async fn wait_until<F, Fut>(&self, mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = Instant::now() + RECV_TIMEOUT;
        while !condition().await {
            assert!(Instant::now() < deadline, "condition not met in time");
            sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn room_hash(value: &str) -> RoomHash {
    RoomHash::parse(value).expect("room hash")
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

pub async fn send_raw(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本帧，跳过控制帧
pub async fn next_json(ws: &mut WsClient) -> Value {
    timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).expect("json frame")
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

/// 读取下一条指定类型的帧
pub async fn next_of_type(ws: &mut WsClient, kind: &str) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

/// 同一连接的帧按到达顺序处理：未知类型的错误回执到达时，之前的帧都已处理完
pub async fn barrier(ws: &mut WsClient) {
    send_json(ws, serde_json::json!({"type": "barrier", "payload": {}})).await;
    loop {
        let frame = next_of_type(ws, "error").await;
        if frame["payload"]["message"] == "Unknown message type" {
            return;
        }
    }
}

/// 断言一段时间内没有收到文本帧
pub async fn expect_silence(ws: &mut WsClient, window: Duration) {
    let result = timeout(window, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = result {
        panic!("unexpected frame: {}", text);
    }
}
