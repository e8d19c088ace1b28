//! 聊天核心依赖的外部协作者接口
//!
//! 会话认证、房间访问判定、消息持久化都由外部实现（数据库或内存），
//! 这里只定义边界。

use async_trait::async_trait;
use domain::{Identity, RepositoryError, RoomHash, UserId};

/// 升级连接前携带的会话凭据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    pub token: Option<String>,
}

impl SessionCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// 返回 `None` 表示凭据无效，连接必须在注册前拒绝
    async fn authenticate(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<Identity>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomAccessOracle: Send + Sync {
    /// 用户是否为该聊天的参与者
    async fn has_access(&self, user_id: UserId, room: &RoomHash) -> Result<bool, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    // 追加一条消息，失败与实时投递互不影响
    async fn append(
        &self,
        room: &RoomHash,
        sender_id: UserId,
        text: &str,
    ) -> Result<(), RepositoryError>;
}
