//! 房间准入校验

use std::sync::Arc;

use domain::{RoomHash, UserId};

use crate::error::ApplicationError;
use crate::repository::RoomAccessOracle;

/// 加入房间前的授权检查，委托给 `RoomAccessOracle`
#[derive(Clone)]
pub struct RoomGate {
    oracle: Arc<dyn RoomAccessOracle>,
}

impl RoomGate {
    pub fn new(oracle: Arc<dyn RoomAccessOracle>) -> Self {
        Self { oracle }
    }

    /// 查询失败按拒绝处理
    pub async fn authorize(&self, user_id: UserId, room: &RoomHash) -> Result<(), ApplicationError> {
        match self.oracle.has_access(user_id, room).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApplicationError::AccessDenied { room: room.clone() }),
            Err(err) => {
                tracing::error!(user_id = %user_id, room = %room, error = %err, "Error checking chat access");
                Err(ApplicationError::AccessDenied { room: room.clone() })
            }
        }
    }
}
