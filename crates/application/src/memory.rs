//! 内存实现的外部协作者（用于测试和本地开发）

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use domain::{Identity, RepositoryError, RoomHash, Timestamp, UserId};
use tokio::sync::RwLock;

use crate::repository::{MessageStore, RoomAccessOracle, SessionAuthenticator, SessionCredentials};

#[derive(Default)]
pub struct MemorySessionAuthenticator {
    sessions: RwLock<HashMap<String, Identity>>,
}

impl MemorySessionAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.sessions.write().await.insert(token.into(), identity);
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }
}

#[async_trait]
impl SessionAuthenticator for MemorySessionAuthenticator {
    async fn authenticate(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<Identity>, RepositoryError> {
        let Some(token) = credentials.token.as_deref() else {
            return Ok(None);
        };
        Ok(self.sessions.read().await.get(token).cloned())
    }
}

#[derive(Default)]
pub struct MemoryRoomAccessOracle {
    participants: RwLock<HashMap<RoomHash, HashSet<UserId>>>,
}

impl MemoryRoomAccessOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, room: RoomHash, user_id: UserId) {
        self.participants
            .write()
            .await
            .entry(room)
            .or_default()
            .insert(user_id);
    }

    pub async fn revoke(&self, room: &RoomHash, user_id: UserId) {
        let mut participants = self.participants.write().await;
        if let Some(users) = participants.get_mut(room) {
            users.remove(&user_id);
            if users.is_empty() {
                participants.remove(room);
            }
        }
    }
}

#[async_trait]
impl RoomAccessOracle for MemoryRoomAccessOracle {
    async fn has_access(&self, user_id: UserId, room: &RoomHash) -> Result<bool, RepositoryError> {
        let participants = self.participants.read().await;
        Ok(participants
            .get(room)
            .is_some_and(|users| users.contains(&user_id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub room: RoomHash,
    pub sender_id: UserId,
    pub text: String,
    pub sent_at: Timestamp,
}

/// 可切换为持续失败，以便验证持久化失败时仍然投递
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
    failing: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }

    pub async fn messages_in(&self, room: &RoomHash) -> Vec<StoredMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|message| &message.room == room)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        room: &RoomHash,
        sender_id: UserId,
        text: &str,
    ) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("message store unavailable"));
        }
        self.messages.write().await.push(StoredMessage {
            room: room.clone(),
            sender_id,
            text: text.to_string(),
            sent_at: chrono::Utc::now(),
        });
        Ok(())
    }
}
