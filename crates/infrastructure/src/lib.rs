//! 基础设施层实现。
//!
//! 提供会话认证、聊天访问判定、消息存储的 PostgreSQL 适配器，
//! 实现应用层定义的协作者接口。

pub mod db;

pub use db::repositories::{PgChatAccessRepository, PgMessageStore, PgSessionRepository};
pub use db::{create_pg_pool, DbPool};
