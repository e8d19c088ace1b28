//! 聊天访问Repository实现

use crate::db::{map_sqlx_err, DbPool};
use application::RoomAccessOracle;
use async_trait::async_trait;
use domain::{RepositoryError, RoomHash, UserId};

/// 用户是否为 `conversations` 中该会话的两位参与者之一
#[derive(Clone)]
pub struct PgChatAccessRepository {
    pool: DbPool,
}

impl PgChatAccessRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomAccessOracle for PgChatAccessRepository {
    async fn has_access(&self, user_id: UserId, room: &RoomHash) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM conversations c
            WHERE c.hash = $1 AND (c.user1_id = $2 OR c.user2_id = $2)
            "#,
        )
        .bind(room.as_str())
        .bind(i64::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(count > 0)
    }
}
