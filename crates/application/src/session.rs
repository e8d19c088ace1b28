//! 客户端会话
//!
//! 每条物理连接对应一个 `ClientSession`。会话持有身份、写出端和取消信号，
//! 由连接自身的读/写循环独占；连接注册表只保存其引用用于广播。

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Identity, ServerMessage, SessionId};
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::ApplicationError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("connection closed")]
    Closed,
    #[error("write timed out")]
    Timeout,
}

/// 单次写帧的默认超时
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// 连接写出端
///
/// 实现方必须保证同一连接上的写操作串行执行（心跳与广播不能交错写帧）。
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// 发送传输层心跳探测
    async fn send_ping(&self) -> Result<(), TransportError>;

    async fn close(&self);
}

/// 会话生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registered,
    Active,
    Closing,
    Closed,
}

pub struct ClientSession {
    id: SessionId,
    identity: Identity,
    sink: Arc<dyn FrameSink>,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
    write_timeout: Duration,
}

impl ClientSession {
    pub fn new(identity: Identity, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            sink,
            state: Mutex::new(SessionState::Connecting),
            cancel: CancellationToken::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// 兄弟循环在此等待会话拆除信号
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 取消信号已发出，连接正在拆除
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Registered | SessionState::Active
        )
    }

    pub(crate) fn mark_registered(&self) {
        self.advance(SessionState::Connecting, SessionState::Registered);
    }

    pub(crate) fn mark_active(&self) {
        self.advance(SessionState::Registered, SessionState::Active);
    }

    /// 进入 Closing 并发出取消信号。只有第一次调用返回 true。
    pub(crate) fn begin_close(&self) -> bool {
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Closing | SessionState::Closed) {
            return false;
        }
        *state = SessionState::Closing;
        drop(state);
        self.cancel.cancel();
        true
    }

    pub(crate) fn mark_closed(&self) {
        *self.lock_state() = SessionState::Closed;
    }

    /// 关闭写出端；对端不再读取时不会无限等待
    pub(crate) async fn close_sink(&self) {
        if timeout(self.write_timeout, self.sink.close()).await.is_err() {
            tracing::warn!(session_id = %self.id, "Timed out closing connection");
        }
    }

    /// 发送已编码的帧
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.guarded_write(self.sink.send_text(text)).await
    }

    pub async fn send_ping(&self) -> Result<(), TransportError> {
        self.guarded_write(self.sink.send_ping()).await
    }

    pub async fn send(&self, frame: &ServerMessage) -> Result<(), ApplicationError> {
        let text = frame.encode()?;
        self.send_text(text).await?;
        Ok(())
    }

    /// 向本连接回报错误，写失败只记录日志
    pub async fn send_error(&self, message: impl Into<String>) {
        let frame = ServerMessage::error(message);
        if let Err(err) = self.send(&frame).await {
            tracing::warn!(
                session_id = %self.id,
                user_id = %self.identity.id,
                error = %err,
                "Failed to send error frame"
            );
        }
    }

    /// 写失败或超时都会发出取消信号，由连接自身的循环完成拆除
    async fn guarded_write<F>(&self, write: F) -> Result<(), TransportError>
    where
        F: Future<Output = Result<(), TransportError>>,
    {
        let result = match timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        if result.is_err() {
            self.cancel.cancel();
        }
        result
    }

    fn advance(&self, from: SessionState, to: SessionState) {
        let mut state = self.lock_state();
        if *state == from {
            *state = to;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}
