//! 消息Repository实现

use crate::db::{map_sqlx_err, DbPool};
use application::MessageStore;
use async_trait::async_trait;
use domain::{RepositoryError, RoomHash, UserId};

#[derive(Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(
        &self,
        room: &RoomHash,
        sender_id: UserId,
        text: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO messages (chat_hash, sender_id, message_content, sent_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(room.as_str())
        .bind(i64::from(sender_id))
        .bind(text)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        tracing::debug!(room = %room, sender_id = %sender_id, "Message persisted");
        Ok(())
    }
}
