//! 会话Repository实现
//!
//! 通过登录时写入的 `active_sessions` 表解析会话令牌对应的用户。

use crate::db::{map_sqlx_err, DbPool};
use application::{SessionAuthenticator, SessionCredentials};
use async_trait::async_trait;
use domain::{Identity, RepositoryError, UserId};
use sqlx::FromRow;

/// 数据库用户模型
#[derive(Debug, Clone, FromRow)]
struct DbSessionUser {
    id: i64,
    nickname: String,
}

impl From<DbSessionUser> for Identity {
    fn from(row: DbSessionUser) -> Self {
        Identity {
            id: UserId::from(row.id),
            nickname: row.nickname,
        }
    }
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: DbPool,
}

impl PgSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionAuthenticator for PgSessionRepository {
    async fn authenticate(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<Identity>, RepositoryError> {
        let Some(token) = credentials.token.as_deref() else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, DbSessionUser>(
            r#"
            SELECT u.id::BIGINT AS id, u.nickname
            FROM users u
            INNER JOIN active_sessions s ON u.id = s.user_id
            WHERE s.session_id = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(Identity::from))
    }
}
