//! 连接身份实体

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 已认证连接的用户身份
///
/// 在认证时一次性确定，会话存活期间不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub nickname: String,
}

impl Identity {
    pub fn new(id: impl Into<UserId>, nickname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nickname: nickname.into(),
        }
    }
}
