//! 聊天网关
//!
//! 连接层与注册表之间的用例服务：认证、会话开启/拆除，以及入站帧的解码与分发。

use std::sync::Arc;
use std::time::Duration;

use domain::{
    ChatMessagePayload, ClientMessage, Identity, JoinRoomPayload, OutgoingChatMessage,
    ServerMessage, TypingPayload,
};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::registry::{ConnectionRegistry, DeliveryReport};
use crate::repository::{MessageStore, SessionAuthenticator, SessionCredentials};
use crate::session::{ClientSession, FrameSink, DEFAULT_WRITE_TIMEOUT};

pub struct ChatGatewayDependencies {
    pub authenticator: Arc<dyn SessionAuthenticator>,
    pub registry: Arc<ConnectionRegistry>,
    pub message_store: Arc<dyn MessageStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatGateway {
    authenticator: Arc<dyn SessionAuthenticator>,
    registry: Arc<ConnectionRegistry>,
    message_store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    write_timeout: Duration,
}

impl ChatGateway {
    pub fn new(deps: ChatGatewayDependencies) -> Self {
        Self {
            authenticator: deps.authenticator,
            registry: deps.registry,
            message_store: deps.message_store,
            clock: deps.clock,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// 新会话的单次写帧超时
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 升级前校验会话凭据
    pub async fn authenticate(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Identity, ApplicationError> {
        match self.authenticator.authenticate(credentials).await? {
            Some(identity) => Ok(identity),
            None => Err(ApplicationError::Authentication),
        }
    }

    /// 创建会话并注册，返回后会话处于 Active
    pub async fn open_session(
        &self,
        identity: Identity,
        sink: Arc<dyn FrameSink>,
    ) -> Arc<ClientSession> {
        let session =
            Arc::new(ClientSession::new(identity, sink).with_write_timeout(self.write_timeout));
        self.registry.register(Arc::clone(&session)).await;
        session.mark_active();
        session
    }

    /// 拆除会话：取消兄弟循环、关闭连接、从注册表移除
    ///
    /// 无论哪个循环先发现故障，只有第一次调用生效。
    pub async fn close_session(&self, session: &Arc<ClientSession>) -> bool {
        if !session.begin_close() {
            return false;
        }

        session.close_sink().await;
        self.registry.remove(session).await;
        session.mark_closed();

        tracing::info!(session_id = %session.id(), user_id = %session.identity().id, "Session closed");
        true
    }

    /// 处理一条入站文本帧
    ///
    /// 任何错误都以 `error` 帧回报给本连接，连接保持打开。
    pub async fn handle_frame(
        &self,
        session: &Arc<ClientSession>,
        text: &str,
    ) -> Result<(), ApplicationError> {
        let result = match ClientMessage::decode(text) {
            Ok(message) => self.dispatch(session, message).await,
            Err(err) => Err(err.into()),
        };

        if let Err(err) = &result {
            tracing::debug!(session_id = %session.id(), error = %err, "Frame rejected");
            session.send_error(err.client_message()).await;
        }
        result
    }

    pub async fn dispatch(
        &self,
        session: &Arc<ClientSession>,
        message: ClientMessage,
    ) -> Result<(), ApplicationError> {
        match message {
            ClientMessage::JoinRoom(payload) => self.join_room(session, payload).await,
            ClientMessage::Message(payload) => self.send_message(session, payload).await.map(|_| ()),
            ClientMessage::Typing(payload) => {
                self.send_typing(session, payload).await;
                Ok(())
            }
        }
    }

    async fn join_room(
        &self,
        session: &Arc<ClientSession>,
        payload: JoinRoomPayload,
    ) -> Result<(), ApplicationError> {
        self.registry.add_to_room(session, payload.room_hash).await
    }

    /// 先持久化再投递；持久化失败不阻止投递，只向发送者报错
    async fn send_message(
        &self,
        session: &Arc<ClientSession>,
        payload: ChatMessagePayload,
    ) -> Result<DeliveryReport, ApplicationError> {
        let sender = session.identity().clone();
        let persisted = self
            .message_store
            .append(&payload.room_hash, sender.id, &payload.message)
            .await;
        if let Err(err) = &persisted {
            tracing::error!(
                user_id = %sender.id,
                room = %payload.room_hash,
                error = %err,
                "Error saving message to DB"
            );
        }

        let room = payload.room_hash.clone();
        let frame = ServerMessage::Message(OutgoingChatMessage {
            room_hash: payload.room_hash,
            sender,
            message: payload.message,
            created_at: self.clock.now(),
        });
        let report = self
            .registry
            .broadcast_to_room(&room, &frame, Some(session.id()))
            .await;

        persisted.map_err(ApplicationError::Persistence)?;
        Ok(report)
    }

    async fn send_typing(&self, session: &Arc<ClientSession>, payload: TypingPayload) -> DeliveryReport {
        let frame = ServerMessage::typing(payload.room_hash.clone(), session.identity().clone());
        self.registry
            .broadcast_to_room(&payload.room_hash, &frame, Some(session.id()))
            .await
    }
}
