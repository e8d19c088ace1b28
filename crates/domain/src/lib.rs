//! 论坛实时聊天子系统的领域模型
//!
//! 包含用户身份、聊天室标识、WebSocket 消息信封编解码，以及相关错误类型。

pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
