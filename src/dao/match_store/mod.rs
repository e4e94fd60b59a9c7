pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        ContactRequestEntity, ContactRequestStatus, ConversationEntity, GameEntity,
        MessageEntity, PendingKey, PlayerProfileEntity, TeamProfileEntity, UserEntity,
    },
    storage::{StorageError, StorageResult},
};

/// Abstraction over the persistence layer for the directory, contact requests and conversations.
///
/// Every uniqueness rule (one pending request per key, one conversation per
/// request) is enforced by the backend itself so concurrent callers cannot
/// slip past an application-level pre-check.
pub trait MatchStore: Send + Sync {
    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    fn find_player_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>>;
    fn find_player_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>>;
    fn find_team_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamProfileEntity>>>;
    /// First team profile owned by `user_id`, by creation date.
    fn find_team_profile_by_owner(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamProfileEntity>>>;
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn save_player_profile(
        &self,
        profile: PlayerProfileEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn save_team_profile(&self, profile: TeamProfileEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert a pending request, failing with [`StorageError::Conflict`] when the key is taken.
    fn insert_contact_request(
        &self,
        request: ContactRequestEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_contact_request(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>>;
    fn find_pending_contact_request(
        &self,
        key: PendingKey,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>>;
    /// Requests addressed to `user_id`, newest first.
    fn list_contact_requests_by_recipient(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ContactRequestEntity>>>;
    /// Requests sent by `user_id`, newest first.
    fn list_contact_requests_by_requester(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ContactRequestEntity>>>;
    /// Move a request out of `PENDING`. Returns `None` when it was no longer pending.
    fn transition_pending_contact_request(
        &self,
        id: Uuid,
        status: ContactRequestStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>>;
    /// Delete a request only while it is still pending.
    fn delete_pending_contact_request(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Return the conversation of a request, creating it on first call.
    fn ensure_conversation(
        &self,
        contact_request_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ConversationEntity>>;
    fn find_conversation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ConversationEntity>>>;
    /// Conversations the user participates in, most recently active first.
    fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<(ConversationEntity, ContactRequestEntity)>>>;

    /// Persist a message and bump the conversation activity timestamp.
    fn append_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// The `limit` most recent messages, returned oldest first.
    fn list_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>>;
    fn latest_message(
        &self,
        conversation_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MessageEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Storage backend selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "mongo-store")]
    Mongo { uri: String, database: Option<String> },
}

#[derive(Debug, thiserror::Error)]
#[error("unknown storage backend `{0}`")]
pub struct UnknownBackend(String);

impl StorageBackend {
    /// Read `STORAGE_BACKEND` (and the MongoDB variables when relevant).
    pub fn from_env() -> Result<Self, UnknownBackend> {
        let name = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| Self::default_name().into());
        match name.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            #[cfg(feature = "mongo-store")]
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo {
                uri: std::env::var("MONGO_URI")
                    .unwrap_or_else(|_| "mongodb://localhost:27017".into()),
                database: std::env::var("MONGO_DB").ok(),
            }),
            _ => Err(UnknownBackend(name)),
        }
    }

    fn default_name() -> &'static str {
        if cfg!(feature = "mongo-store") {
            "mongo"
        } else {
            "memory"
        }
    }

    /// Open a store for this backend.
    pub async fn connect(&self) -> Result<Arc<dyn MatchStore>, StorageError> {
        match self {
            StorageBackend::Memory => Ok(Arc::new(memory::MemoryMatchStore::new())),
            #[cfg(feature = "mongo-store")]
            StorageBackend::Mongo { uri, database } => {
                let config = self::mongodb::MongoConfig::from_uri(uri, database.as_deref())
                    .await
                    .map_err(StorageError::from)?;
                let store = self::mongodb::MongoMatchStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok(Arc::new(store))
            }
        }
    }
}
