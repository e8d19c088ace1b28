//! 领域实体定义
//!
//! 包含聊天子系统的核心实体：连接身份、WebSocket 消息信封。

pub mod identity;
pub mod websocket;

// 重新导出核心实体
pub use identity::Identity;
pub use websocket::{
    ChatMessagePayload, ClientMessage, JoinRoomPayload, OutgoingChatMessage, OutgoingTyping,
    ProtocolError, RawEnvelope, ServerMessage, TypingPayload,
};
