//! Repository实现模块
//!
//! 聊天核心所需协作者接口的 PostgreSQL 实现

pub mod chat_access_repository_impl;
pub mod message_repository_impl;
pub mod session_repository_impl;

pub use chat_access_repository_impl::PgChatAccessRepository;
pub use message_repository_impl::PgMessageStore;
pub use session_repository_impl::PgSessionRepository;
