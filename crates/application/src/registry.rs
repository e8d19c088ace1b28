//! 连接注册表
//!
//! 进程内唯一的会话与房间成员状态。所有结构修改都在同一把读写锁内完成，
//! 且临界区只做纯数据结构操作；网络写出一律在释放锁之后基于快照进行，
//! 避免慢连接拖住房间管理。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{Identity, RoomHash, ServerMessage, SessionId, UserId};
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::ApplicationError;
use crate::gate::RoomGate;
use crate::presence::PresenceBroadcaster;
use crate::session::ClientSession;

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Arc<ClientSession>>,
    /// 房间 -> (用户 -> 会话)，房间在成员清空时立即删除
    rooms: HashMap<RoomHash, HashMap<UserId, Arc<ClientSession>>>,
}

/// 一次广播的投递结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    gate: RoomGate,
}

impl ConnectionRegistry {
    pub fn new(gate: RoomGate) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            gate,
        }
    }

    /// 创建注册表并启动在线列表广播任务
    ///
    /// 广播任务只持有弱引用，注册表释放或 `shutdown` 取消时自动退出。
    pub fn start(
        gate: RoomGate,
        presence_interval: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let registry = Arc::new(Self::new(gate));
        PresenceBroadcaster::spawn(Arc::downgrade(&registry), presence_interval, shutdown);
        registry
    }

    pub async fn register(&self, session: Arc<ClientSession>) {
        let session_id = session.id();
        let user_id = session.identity().id;
        let total = {
            let mut state = self.state.write().await;
            state.sessions.insert(session_id, Arc::clone(&session));
            state.sessions.len()
        };
        session.mark_registered();

        tracing::info!(session_id = %session_id, user_id = %user_id, total, "Session registered");
    }

    /// 从全局集合和所有房间中移除会话，重复调用无副作用
    ///
    /// 只删除仍指向本会话的房间条目，被新会话顶替的条目保持不变。
    pub async fn remove(&self, session: &ClientSession) -> bool {
        let session_id = session.id();
        let user_id = session.identity().id;

        let (removed, emptied_rooms) = {
            let mut state = self.state.write().await;
            let removed = state.sessions.remove(&session_id).is_some();

            let mut emptied_rooms = Vec::new();
            state.rooms.retain(|room, members| {
                if members
                    .get(&user_id)
                    .is_some_and(|member| member.id() == session_id)
                {
                    members.remove(&user_id);
                }
                if members.is_empty() {
                    emptied_rooms.push(room.clone());
                    false
                } else {
                    true
                }
            });
            (removed, emptied_rooms)
        };

        if removed {
            tracing::info!(session_id = %session_id, user_id = %user_id, "Session removed");
        }
        for room in emptied_rooms {
            tracing::debug!(room = %room, "Room emptied and dropped");
        }
        removed
    }

    /// 授权后把会话加入房间；同一用户重新加入会顶替旧会话
    pub async fn add_to_room(
        &self,
        session: &Arc<ClientSession>,
        room: RoomHash,
    ) -> Result<(), ApplicationError> {
        let user_id = session.identity().id;

        if let Err(err) = self.gate.authorize(user_id, &room).await {
            tracing::warn!(session_id = %session.id(), user_id = %user_id, room = %room, "Room access denied");
            return Err(err);
        }

        let replaced = {
            let mut state = self.state.write().await;
            // 授权期间会话可能已被拆除
            if !state.sessions.contains_key(&session.id()) {
                return Err(ApplicationError::SessionClosed);
            }
            state
                .rooms
                .entry(room.clone())
                .or_default()
                .insert(user_id, Arc::clone(session))
        };

        match replaced {
            Some(previous) if previous.id() != session.id() => {
                tracing::info!(
                    room = %room,
                    user_id = %user_id,
                    previous_session = %previous.id(),
                    session_id = %session.id(),
                    "Room membership superseded by new session"
                );
            }
            _ => {
                tracing::info!(room = %room, user_id = %user_id, session_id = %session.id(), "Joined room");
            }
        }
        Ok(())
    }

    /// 房间成员快照
    pub async fn members_of(&self, room: &RoomHash) -> Vec<Arc<ClientSession>> {
        let state = self.state.read().await;
        state
            .rooms
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn broadcast_to_room(
        &self,
        room: &RoomHash,
        frame: &ServerMessage,
        excluding: Option<SessionId>,
    ) -> DeliveryReport {
        let recipients: Vec<_> = self
            .members_of(room)
            .await
            .into_iter()
            .filter(|session| Some(session.id()) != excluding)
            .collect();

        if recipients.is_empty() {
            tracing::debug!(room = %room, kind = frame.kind(), "No clients in room to broadcast to");
            return DeliveryReport::default();
        }

        Self::deliver(recipients, frame).await
    }

    pub async fn broadcast_to_all(&self, frame: &ServerMessage) -> DeliveryReport {
        let recipients: Vec<_> = {
            let state = self.state.read().await;
            state.sessions.values().cloned().collect()
        };
        Self::deliver(recipients, frame).await
    }

    /// 向所有连接推送当前在线用户列表
    pub async fn broadcast_presence(&self) -> DeliveryReport {
        let users = self.active_identities().await;
        self.broadcast_to_all(&ServerMessage::ActiveUsers { users })
            .await
    }

    /// 帧只编码一次；各接收方独立写出，单个失败或超时不影响其他接收方
    ///
    /// 已在拆除中的会话直接跳过。
    async fn deliver(recipients: Vec<Arc<ClientSession>>, frame: &ServerMessage) -> DeliveryReport {
        let recipients: Vec<_> = recipients
            .into_iter()
            .filter(|session| !session.is_closing())
            .collect();
        if recipients.is_empty() {
            return DeliveryReport::default();
        }

        let text = match frame.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, kind = frame.kind(), "Error marshalling frame");
                return DeliveryReport {
                    delivered: 0,
                    failed: recipients.len(),
                };
            }
        };

        let sends = recipients.iter().map(|session| {
            let text = text.clone();
            async move {
                match session.send_text(text).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(
                            session_id = %session.id(),
                            user_id = %session.identity().id,
                            error = %err,
                            "Error sending frame to client"
                        );
                        false
                    }
                }
            }
        });

        let results = join_all(sends).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        DeliveryReport {
            delivered,
            failed: results.len() - delivered,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn active_room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn is_member(&self, room: &RoomHash, user_id: UserId) -> bool {
        let state = self.state.read().await;
        state
            .rooms
            .get(room)
            .is_some_and(|members| members.contains_key(&user_id))
    }

    /// 当前已注册连接的身份列表
    pub async fn active_identities(&self) -> Vec<Identity> {
        let state = self.state.read().await;
        state
            .sessions
            .values()
            .map(|session| session.identity().clone())
            .collect()
    }
}
