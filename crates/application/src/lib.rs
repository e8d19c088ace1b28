//! 应用层实现。
//!
//! 实时聊天核心：连接注册表、客户端会话、入站帧分发和在线列表广播，
//! 以及对外部协作者（会话认证、房间访问判定、消息存储）的抽象。

pub mod clock;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod memory;
pub mod presence;
pub mod registry;
pub mod repository;
pub mod session;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use gate::RoomGate;
pub use gateway::{ChatGateway, ChatGatewayDependencies};
pub use memory::{MemoryMessageStore, MemoryRoomAccessOracle, MemorySessionAuthenticator};
pub use presence::PresenceBroadcaster;
pub use registry::{ConnectionRegistry, DeliveryReport};
pub use repository::{MessageStore, RoomAccessOracle, SessionAuthenticator, SessionCredentials};
pub use session::{ClientSession, FrameSink, SessionState, TransportError};
