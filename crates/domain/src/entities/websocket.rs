//! WebSocket 消息信封
//!
//! 线上格式为 `{"type": <string>, "payload": <object>}`。入站消息分两步解码：
//! 先读取外层 `type`，再按类型解析 `payload`；出站消息直接按相邻标签序列化。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::identity::Identity;
use crate::value_objects::{RoomHash, Timestamp, UserId};

/// 消息类型标签
pub mod message_type {
    pub const JOIN_ROOM: &str = "join_room";
    pub const MESSAGE: &str = "message";
    pub const TYPING: &str = "typing";
    pub const ACTIVE_USERS: &str = "active_users";
    pub const ERROR: &str = "error";
}

/// 协议错误：只回报给出错的连接，连接本身保持打开
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// 返回给客户端的错误文本
    pub fn client_message(&self) -> String {
        match self {
            ProtocolError::MalformedEnvelope(_) => "Invalid message format".to_string(),
            ProtocolError::UnknownType(_) => "Unknown message type".to_string(),
            ProtocolError::InvalidPayload { kind, .. } => match *kind {
                message_type::JOIN_ROOM => "Invalid join room message".to_string(),
                message_type::MESSAGE => "Invalid message message".to_string(),
                message_type::TYPING => "Invalid typing message".to_string(),
                other => format!("Invalid {} message", other),
            },
            ProtocolError::Encode(_) => "Internal error".to_string(),
        }
    }
}

/// 外层信封：只解析类型标签，载荷保持原样
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEnvelope {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|err| ProtocolError::MalformedEnvelope(err.to_string()))
    }

    /// 第二阶段：按类型标签解析载荷
    pub fn into_client_message(self) -> Result<ClientMessage, ProtocolError> {
        match self.kind.as_str() {
            message_type::JOIN_ROOM => {
                Self::payload_as(message_type::JOIN_ROOM, self.payload).map(ClientMessage::JoinRoom)
            }
            message_type::MESSAGE => {
                Self::payload_as(message_type::MESSAGE, self.payload).map(ClientMessage::Message)
            }
            message_type::TYPING => {
                Self::payload_as(message_type::TYPING, self.payload).map(ClientMessage::Typing)
            }
            _ => Err(ProtocolError::UnknownType(self.kind)),
        }
    }

    fn payload_as<T: serde::de::DeserializeOwned>(
        kind: &'static str,
        payload: serde_json::Value,
    ) -> Result<T, ProtocolError> {
        serde_json::from_value(payload).map_err(|err| ProtocolError::InvalidPayload {
            kind,
            reason: err.to_string(),
        })
    }
}

/// `join_room` 载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoomPayload {
    #[serde(rename = "roomHash")]
    pub room_hash: RoomHash,
}

/// 入站 `message` 载荷；客户端携带的 sender / created_at 一律忽略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    #[serde(rename = "roomHash")]
    pub room_hash: RoomHash,
    pub message: String,
}

/// 入站 `typing` 载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    #[serde(rename = "roomHash")]
    pub room_hash: RoomHash,
}

/// 客户端消息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 加入房间
    JoinRoom(JoinRoomPayload),
    /// 发送聊天消息
    Message(ChatMessagePayload),
    /// 正在输入
    Typing(TypingPayload),
}

impl ClientMessage {
    /// 两阶段解码入站帧
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        RawEnvelope::decode(text)?.into_client_message()
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::Encode(err.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom(_) => message_type::JOIN_ROOM,
            ClientMessage::Message(_) => message_type::MESSAGE,
            ClientMessage::Typing(_) => message_type::TYPING,
        }
    }
}

/// 出站聊天消息，发送者和时间由服务端填写
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingChatMessage {
    #[serde(rename = "roomHash")]
    pub room_hash: RoomHash,
    pub sender: Identity,
    pub message: String,
    pub created_at: Timestamp,
}

/// 出站输入状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingTyping {
    #[serde(rename = "roomHash")]
    pub room_hash: RoomHash,
    pub sender: Identity,
    #[serde(rename = "senderID")]
    pub sender_id: UserId,
}

/// 服务器消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 房间聊天消息
    Message(OutgoingChatMessage),
    /// 输入状态
    Typing(OutgoingTyping),
    /// 当前在线用户快照
    ActiveUsers { users: Vec<Identity> },
    /// 错误消息
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn typing(room_hash: RoomHash, sender: Identity) -> Self {
        let sender_id = sender.id;
        ServerMessage::Typing(OutgoingTyping {
            room_hash,
            sender,
            sender_id,
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::Encode(err.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|err| ProtocolError::MalformedEnvelope(err.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Message(_) => message_type::MESSAGE,
            ServerMessage::Typing(_) => message_type::TYPING,
            ServerMessage::ActiveUsers { .. } => message_type::ACTIVE_USERS,
            ServerMessage::Error { .. } => message_type::ERROR,
        }
    }
}
