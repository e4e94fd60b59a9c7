use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{
        ContactRequestEntity, ContactRequestStatus, ConversationEntity, GameEntity,
        MessageEntity, PendingKey, PlayerProfileEntity, TeamProfileEntity, UserEntity,
    },
    storage::{StorageError, StorageResult},
};

/// In-process store used by tests and by `STORAGE_BACKEND=memory`.
///
/// All tables live behind one lock so uniqueness checks and writes are atomic.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    tables: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserEntity>,
    player_profiles: HashMap<Uuid, PlayerProfileEntity>,
    team_profiles: HashMap<Uuid, TeamProfileEntity>,
    games: HashMap<Uuid, GameEntity>,
    contact_requests: HashMap<Uuid, ContactRequestEntity>,
    conversations: HashMap<Uuid, ConversationEntity>,
    messages: HashMap<Uuid, Vec<MessageEntity>>,
}

impl Tables {
    fn pending_for(&self, key: &PendingKey) -> Option<&ContactRequestEntity> {
        self.contact_requests.values().find(|request| {
            request.status == ContactRequestStatus::Pending
                && request.pending_key().as_ref() == Some(key)
        })
    }

    fn conversation_for_request(&self, contact_request_id: Uuid) -> Option<&ConversationEntity> {
        self.conversations
            .values()
            .find(|conversation| conversation.contact_request_id == contact_request_id)
    }

    fn requests_where(
        &self,
        predicate: impl Fn(&ContactRequestEntity) -> bool,
    ) -> Vec<ContactRequestEntity> {
        let mut requests: Vec<_> = self
            .contact_requests
            .values()
            .filter(|request| predicate(request))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        requests
    }
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert_contact_request(&self, request: ContactRequestEntity) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if request.status == ContactRequestStatus::Pending {
            let key = request
                .pending_key()
                .ok_or_else(|| StorageError::conflict("contact request must target exactly one profile"))?;
            if tables.pending_for(&key).is_some() {
                return Err(StorageError::conflict(
                    "a pending contact request already exists for this target and game",
                ));
            }
        }
        tables.contact_requests.insert(request.id, request);
        Ok(())
    }

    async fn transition_pending(
        &self,
        id: Uuid,
        status: ContactRequestStatus,
        at: SystemTime,
    ) -> StorageResult<Option<ContactRequestEntity>> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables.contact_requests.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != ContactRequestStatus::Pending {
            return Ok(None);
        }
        request.status = status;
        request.updated_at = at;
        Ok(Some(request.clone()))
    }

    async fn delete_pending(&self, id: Uuid) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        let pending = tables
            .contact_requests
            .get(&id)
            .is_some_and(|request| request.status == ContactRequestStatus::Pending);
        if pending {
            tables.contact_requests.remove(&id);
        }
        Ok(pending)
    }

    async fn ensure_conversation(
        &self,
        contact_request_id: Uuid,
        at: SystemTime,
    ) -> StorageResult<ConversationEntity> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.conversation_for_request(contact_request_id) {
            return Ok(existing.clone());
        }
        let conversation = ConversationEntity::new(contact_request_id, at);
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> StorageResult<Vec<(ConversationEntity, ContactRequestEntity)>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<_> = tables
            .conversations
            .values()
            .filter_map(|conversation| {
                let request = tables.contact_requests.get(&conversation.contact_request_id)?;
                (request.status == ContactRequestStatus::Accepted
                    && request.participants().contains(user_id))
                .then(|| (conversation.clone(), request.clone()))
            })
            .collect();
        entries.sort_by(|(a, _), (b, _)| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    async fn append_message(&self, message: MessageEntity) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let Some(conversation) = tables.conversations.get_mut(&message.conversation_id) else {
            return Err(StorageError::conflict(format!(
                "conversation `{}` does not exist",
                message.conversation_id
            )));
        };
        if message.created_at > conversation.last_activity_at {
            conversation.last_activity_at = message.created_at;
        }
        tables
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> StorageResult<Vec<MessageEntity>> {
        let tables = self.tables.read().await;
        let Some(messages) = tables.messages.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        let mut ordered = messages.clone();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let skip = ordered.len().saturating_sub(limit);
        Ok(ordered.into_iter().skip(skip).collect())
    }

    async fn latest_message(&self, conversation_id: Uuid) -> StorageResult<Option<MessageEntity>> {
        let tables = self.tables.read().await;
        Ok(tables.messages.get(&conversation_id).and_then(|messages| {
            messages
                .iter()
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
                .cloned()
        }))
    }
}

impl MatchStore for MemoryMatchStore {
    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.users.get(&id).cloned()) })
    }

    fn find_player_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.player_profiles.get(&id).cloned()) })
    }

    fn find_player_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .player_profiles
                .values()
                .find(|profile| profile.user_id == user_id)
                .cloned())
        })
    }

    fn find_team_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.team_profiles.get(&id).cloned()) })
    }

    fn find_team_profile_by_owner(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .team_profiles
                .values()
                .filter(|profile| profile.owner_user_id == user_id)
                .min_by_key(|profile| profile.created_at)
                .cloned())
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.games.get(&id).cloned()) })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables.write().await.users.insert(user.id, user);
            Ok(())
        })
    }

    fn save_player_profile(
        &self,
        profile: PlayerProfileEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let taken = tables
                .player_profiles
                .values()
                .any(|existing| existing.user_id == profile.user_id && existing.id != profile.id);
            if taken {
                return Err(StorageError::conflict(format!(
                    "user `{}` already owns a player profile",
                    profile.user_id
                )));
            }
            tables.player_profiles.insert(profile.id, profile);
            Ok(())
        })
    }

    fn save_team_profile(
        &self,
        profile: TeamProfileEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .tables
                .write()
                .await
                .team_profiles
                .insert(profile.id, profile);
            Ok(())
        })
    }

    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables.write().await.games.insert(game.id, game);
            Ok(())
        })
    }

    fn insert_contact_request(
        &self,
        request: ContactRequestEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_contact_request(request).await })
    }

    fn find_contact_request(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.contact_requests.get(&id).cloned()) })
    }

    fn find_pending_contact_request(
        &self,
        key: PendingKey,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.pending_for(&key).cloned()) })
    }

    fn list_contact_requests_by_recipient(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables.requests_where(|request| request.recipient_user_id == user_id))
        })
    }

    fn list_contact_requests_by_requester(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables.requests_where(|request| request.requester_user_id == user_id))
        })
    }

    fn transition_pending_contact_request(
        &self,
        id: Uuid,
        status: ContactRequestStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.transition_pending(id, status, at).await })
    }

    fn delete_pending_contact_request(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_pending(id).await })
    }

    fn ensure_conversation(
        &self,
        contact_request_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ConversationEntity>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_conversation(contact_request_id, at).await })
    }

    fn find_conversation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ConversationEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.conversations.get(&id).cloned()) })
    }

    fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<(ConversationEntity, ContactRequestEntity)>>> {
        let store = self.clone();
        Box::pin(async move { store.list_conversations_for_user(user_id).await })
    }

    fn append_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_message(message).await })
    }

    fn list_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_recent_messages(conversation_id, limit).await })
    }

    fn latest_message(
        &self,
        conversation_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.latest_message(conversation_id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::dao::models::TargetProfile;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn key() -> PendingKey {
        PendingKey {
            requester_user_id: Uuid::new_v4(),
            recipient_user_id: Uuid::new_v4(),
            target: TargetProfile::Player(Uuid::new_v4()),
            game_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn rejects_second_pending_request_for_same_key() {
        let store = MemoryMatchStore::new();
        let key = key();
        store
            .insert_contact_request(ContactRequestEntity::pending(key, None, at(1)))
            .await
            .unwrap();

        let err = store
            .insert_contact_request(ContactRequestEntity::pending(key, None, at(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn resolved_request_frees_the_pending_key() {
        let store = MemoryMatchStore::new();
        let key = key();
        let first = ContactRequestEntity::pending(key, None, at(1));
        store.insert_contact_request(first.clone()).await.unwrap();
        store
            .transition_pending(first.id, ContactRequestStatus::Rejected, at(2))
            .await
            .unwrap()
            .unwrap();

        store
            .insert_contact_request(ContactRequestEntity::pending(key, None, at(3)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transition_only_applies_to_pending_requests() {
        let store = MemoryMatchStore::new();
        let request = ContactRequestEntity::pending(key(), None, at(1));
        store.insert_contact_request(request.clone()).await.unwrap();

        let accepted = store
            .transition_pending(request.id, ContactRequestStatus::Accepted, at(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, ContactRequestStatus::Accepted);
        assert_eq!(accepted.updated_at, at(5));

        let again = store
            .transition_pending(request.id, ContactRequestStatus::Rejected, at(6))
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(!store.delete_pending(request.id).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_conversation_is_idempotent() {
        let store = MemoryMatchStore::new();
        let request_id = Uuid::new_v4();
        let first = store.ensure_conversation(request_id, at(1)).await.unwrap();
        let second = store.ensure_conversation(request_id, at(2)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn conversation_list_only_covers_accepted_requests() {
        let store = MemoryMatchStore::new();
        let key = key();
        let pending = ContactRequestEntity::pending(key, None, at(1));
        store.insert_contact_request(pending.clone()).await.unwrap();
        store.ensure_conversation(pending.id, at(2)).await.unwrap();
        assert!(
            store
                .list_conversations_for_user(key.requester_user_id)
                .await
                .unwrap()
                .is_empty()
        );

        store
            .transition_pending(pending.id, ContactRequestStatus::Accepted, at(3))
            .await
            .unwrap()
            .unwrap();
        let listed = store
            .list_conversations_for_user(key.recipient_user_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1.id, pending.id);
    }

    #[tokio::test]
    async fn recent_messages_keep_the_newest_page_in_ascending_order() {
        let store = MemoryMatchStore::new();
        let conversation = store.ensure_conversation(Uuid::new_v4(), at(0)).await.unwrap();
        let sender = Uuid::new_v4();
        for i in 1..=5 {
            store
                .append_message(MessageEntity::new(
                    conversation.id,
                    sender,
                    format!("message {i}"),
                    at(i),
                ))
                .await
                .unwrap();
        }

        let page = store.list_recent_messages(conversation.id, 3).await.unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["message 3", "message 4", "message 5"]);

        let latest = store.latest_message(conversation.id).await.unwrap().unwrap();
        assert_eq!(latest.content, "message 5");
        let bumped = store
            .find_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bumped.last_activity_at, at(5));
    }
}
