//! Web API 层。
//!
//! 提供 Axum 路由：健康检查与 WebSocket 入口。认证在升级前完成，
//! 之后每条连接由 `WebSocketConnection` 驱动读循环与心跳循环。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::credentials_from_request;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use ws_connection::{WebSocketConnection, WsSink};
