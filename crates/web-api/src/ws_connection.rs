use std::sync::Arc;
use std::time::Duration;

use application::{ChatGateway, ClientSession, FrameSink, TransportError};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{Identity, ProtocolError};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

/// WebSocket 写出端
///
/// 心跳与广播共用同一把锁，保证帧不会交错写入。
pub struct WsSink {
    sender: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }

    async fn send(&self, message: WsMessage) -> Result<(), TransportError> {
        self.sender
            .lock()
            .await
            .send(message)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.send(WsMessage::Text(text.into())).await
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        self.send(WsMessage::Ping(Bytes::new())).await
    }

    async fn close(&self) {
        if let Err(err) = self.sender.lock().await.close().await {
            tracing::debug!(error = %err, "WebSocket already closed");
        }
    }
}

/// WebSocket 连接驱动
///
/// 升级完成后注册会话，并运行两个循环：
/// - 读循环：按到达顺序逐帧交给网关处理
/// - 心跳循环：固定间隔发送 Ping，写失败即拆除会话
///
/// 任一循环结束都会通过会话的取消信号通知另一个。
pub struct WebSocketConnection {
    gateway: Arc<ChatGateway>,
    identity: Identity,
    ping_interval: Duration,
}

impl WebSocketConnection {
    pub fn new(gateway: Arc<ChatGateway>, identity: Identity, ping_interval: Duration) -> Self {
        Self {
            gateway,
            identity,
            ping_interval,
        }
    }

    pub async fn run(self, socket: WebSocket) {
        let (sender, mut incoming) = socket.split();
        let sink: Arc<dyn FrameSink> = Arc::new(WsSink::new(sender));
        let session = self.gateway.open_session(self.identity, sink).await;
        let cancel = session.cancellation();

        tracing::info!(session_id = %session.id(), user_id = %session.identity().id, "WebSocket 连接已建立");

        let keepalive = tokio::spawn(Self::keepalive(
            self.gateway.clone(),
            session.clone(),
            self.ping_interval,
        ));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = incoming.next() => match frame {
                    Some(Ok(message)) => {
                        if !Self::handle_incoming(&self.gateway, &session, message).await {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(session_id = %session.id(), error = %err, "WebSocket read failed");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.gateway.close_session(&session).await;
        if let Err(err) = keepalive.await {
            tracing::warn!(session_id = %session.id(), error = %err, "Keepalive task failed");
        }

        tracing::info!(session_id = %session.id(), user_id = %session.identity().id, "WebSocket 连接已断开");
    }

    /// 返回 false 表示读循环应当结束
    async fn handle_incoming(
        gateway: &ChatGateway,
        session: &Arc<ClientSession>,
        message: WsMessage,
    ) -> bool {
        match message {
            WsMessage::Text(text) => {
                Self::dispatch(gateway, session, text.as_str()).await;
                true
            }
            WsMessage::Binary(data) => {
                match std::str::from_utf8(&data) {
                    Ok(text) => Self::dispatch(gateway, session, text).await,
                    Err(err) => {
                        let err = ProtocolError::MalformedEnvelope(err.to_string());
                        session.send_error(err.client_message()).await;
                    }
                }
                true
            }
            WsMessage::Ping(_) => {
                tracing::debug!(session_id = %session.id(), "Received ping");
                true
            }
            WsMessage::Pong(_) => {
                tracing::debug!(session_id = %session.id(), "Received pong");
                true
            }
            WsMessage::Close(frame) => {
                tracing::debug!(session_id = %session.id(), ?frame, "Client closed connection");
                false
            }
        }
    }

    /// 错误已由网关以 `error` 帧回报给客户端，连接继续
    async fn dispatch(gateway: &ChatGateway, session: &Arc<ClientSession>, text: &str) {
        if let Err(err) = gateway.handle_frame(session, text).await {
            tracing::trace!(session_id = %session.id(), error = %err, "Frame handled with error");
        }
    }

    async fn keepalive(gateway: Arc<ChatGateway>, session: Arc<ClientSession>, every: Duration) {
        let cancel = session.cancellation();
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 连接建立时不立即探测
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = session.send_ping().await {
                        tracing::warn!(
                            session_id = %session.id(),
                            user_id = %session.identity().id,
                            error = %err,
                            "Keepalive failed, closing connection"
                        );
                        gateway.close_session(&session).await;
                        break;
                    }
                }
            }
        }
    }
}
