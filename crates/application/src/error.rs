use domain::{ProtocolError, RepositoryError, RoomHash};
use thiserror::Error;

use crate::session::TransportError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to persist message: {0}")]
    Persistence(#[source] RepositoryError),
    #[error("authentication failed")]
    Authentication,
    #[error("access denied to room {room}")]
    AccessDenied { room: RoomHash },
    #[error("session is closed")]
    SessionClosed,
}

impl ApplicationError {
    /// 通过 `error` 帧返回给客户端的文本
    pub fn client_message(&self) -> String {
        match self {
            ApplicationError::Protocol(err) => err.client_message(),
            ApplicationError::Persistence(_) => "Failed to save message".to_string(),
            ApplicationError::AccessDenied { room } => format!("Access denied to room {}", room),
            ApplicationError::Authentication => "Authentication failed".to_string(),
            ApplicationError::SessionClosed => "Session closed".to_string(),
            ApplicationError::Repository(_) | ApplicationError::Transport(_) => {
                "Internal error".to_string()
            }
        }
    }
}
