use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        CONTACT_REQUESTS, CONVERSATIONS, GAMES, MESSAGES, MongoContactRequestDocument,
        MongoConversationDocument, MongoGameDocument, MongoMessageDocument,
        MongoPlayerProfileDocument, MongoTeamProfileDocument, MongoUserDocument, PLAYER_PROFILES,
        TEAM_PROFILES, USERS,
    },
};
use crate::dao::{
    match_store::MatchStore,
    models::{
        ContactRequestEntity, ContactRequestStatus, ConversationEntity, GameEntity,
        MessageEntity, PendingKey, PlayerProfileEntity, TeamProfileEntity, UserEntity,
    },
    storage::StorageResult,
};

/// MongoDB-backed [`MatchStore`].
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept alive alongside the database handle it produced.
    _client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard._client = client;
        guard.database = database;
        Ok(())
    }
}

fn id_filter(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

fn optional_id(id: Option<Uuid>) -> Option<String> {
    id.map(|value| value.to_string())
}

/// The message insert is the committed write; a failed activity bump is logged, not returned.
fn settle_activity_bump<E: std::fmt::Display>(
    conversation_id: Uuid,
    outcome: Result<(), E>,
) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => {
            warn!(
                conversation_id = %conversation_id,
                error = %err,
                "message stored but conversation activity was not bumped"
            );
            false
        }
    }
}

/// Decode a batch of documents into entities, failing on the first malformed one.
fn decode_all<D, E>(documents: Vec<D>) -> MongoResult<Vec<E>>
where
    E: TryFrom<D, Error = MongoDaoError>,
{
    documents.into_iter().map(E::try_from).collect()
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState {
                    _client: client,
                    database,
                }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let indexes: [(&'static str, &'static str, IndexModel); 5] = [
            (
                CONTACT_REQUESTS,
                "pending_contact_request_unique",
                IndexModel::builder()
                    .keys(doc! {
                        "requester_user_id": 1,
                        "recipient_user_id": 1,
                        "target_player_id": 1,
                        "target_team_id": 1,
                        "game_id": 1,
                    })
                    .options(
                        IndexOptions::builder()
                            .name(Some("pending_contact_request_unique".to_owned()))
                            .unique(Some(true))
                            .partial_filter_expression(Some(doc! { "status": "PENDING" }))
                            .build(),
                    )
                    .build(),
            ),
            (
                CONTACT_REQUESTS,
                "contact_request_recipient_idx",
                IndexModel::builder()
                    .keys(doc! { "recipient_user_id": 1, "created_at": -1 })
                    .options(
                        IndexOptions::builder()
                            .name(Some("contact_request_recipient_idx".to_owned()))
                            .build(),
                    )
                    .build(),
            ),
            (
                CONTACT_REQUESTS,
                "contact_request_requester_idx",
                IndexModel::builder()
                    .keys(doc! { "requester_user_id": 1, "created_at": -1 })
                    .options(
                        IndexOptions::builder()
                            .name(Some("contact_request_requester_idx".to_owned()))
                            .build(),
                    )
                    .build(),
            ),
            (
                CONVERSATIONS,
                "conversation_contact_request_unique",
                IndexModel::builder()
                    .keys(doc! { "contact_request_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .name(Some("conversation_contact_request_unique".to_owned()))
                            .unique(Some(true))
                            .build(),
                    )
                    .build(),
            ),
            (
                MESSAGES,
                "message_conversation_idx",
                IndexModel::builder()
                    .keys(doc! { "conversation_id": 1, "created_at": -1, "_id": -1 })
                    .options(
                        IndexOptions::builder()
                            .name(Some("message_conversation_idx".to_owned()))
                            .build(),
                    )
                    .build(),
            ),
        ];

        for (collection, index, model) in indexes {
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        let player_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("player_profile_user_unique".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(PLAYER_PROFILES)
            .create_index(player_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_PROFILES,
                index: "player_profile_user_unique",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn find_one_as<D, E>(
        &self,
        collection: &'static str,
        filter: Document,
    ) -> MongoResult<Option<E>>
    where
        D: DeserializeOwned + Send + Sync,
        E: TryFrom<D, Error = MongoDaoError>,
    {
        self.collection::<D>(collection)
            .await
            .find_one(filter)
            .await
            .map_err(MongoDaoError::query(collection, "load document"))?
            .map(E::try_from)
            .transpose()
    }

    async fn replace<D>(&self, collection: &'static str, id: Uuid, document: D) -> MongoResult<()>
    where
        D: serde::Serialize + Send + Sync,
    {
        self.collection::<D>(collection)
            .await
            .replace_one(id_filter(id), &document)
            .upsert(true)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicateKey {
                        what: format!("document `{id}` in `{collection}` violates a unique index"),
                    }
                } else {
                    MongoDaoError::query(collection, "save document")(source)
                }
            })?;
        Ok(())
    }

    async fn find_team_profile_by_owner(
        &self,
        user_id: Uuid,
    ) -> MongoResult<Option<TeamProfileEntity>> {
        let mut documents: Vec<MongoTeamProfileDocument> = self
            .collection::<MongoTeamProfileDocument>(TEAM_PROFILES)
            .await
            .find(doc! { "owner_user_id": user_id.to_string() })
            .sort(doc! { "created_at": 1 })
            .limit(1)
            .await
            .map_err(MongoDaoError::query(TEAM_PROFILES, "find team by owner"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(TEAM_PROFILES, "find team by owner"))?;
        documents.pop().map(TryFrom::try_from).transpose()
    }

    async fn insert_contact_request(&self, request: ContactRequestEntity) -> MongoResult<()> {
        let id = request.id;
        let document: MongoContactRequestDocument = request.into();
        self.collection::<MongoContactRequestDocument>(CONTACT_REQUESTS)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicateKey {
                        what: "a pending contact request already exists for this target and game"
                            .to_owned(),
                    }
                } else {
                    MongoDaoError::query(CONTACT_REQUESTS, "insert contact request")(source)
                }
            })?;
        debug!(request_id = %id, "contact request stored");
        Ok(())
    }

    async fn find_pending_contact_request(
        &self,
        key: PendingKey,
    ) -> MongoResult<Option<ContactRequestEntity>> {
        let (target_player_id, target_team_id) = key.target.into_columns();
        self.find_one_as::<MongoContactRequestDocument, _>(
            CONTACT_REQUESTS,
            doc! {
                "requester_user_id": key.requester_user_id.to_string(),
                "recipient_user_id": key.recipient_user_id.to_string(),
                "target_player_id": optional_id(target_player_id),
                "target_team_id": optional_id(target_team_id),
                "game_id": key.game_id.to_string(),
                "status": ContactRequestStatus::Pending.as_str(),
            },
        )
        .await
    }

    async fn list_contact_requests(
        &self,
        field: &str,
        user_id: Uuid,
    ) -> MongoResult<Vec<ContactRequestEntity>> {
        let mut filter = Document::new();
        filter.insert(field, user_id.to_string());
        let documents: Vec<MongoContactRequestDocument> = self
            .collection::<MongoContactRequestDocument>(CONTACT_REQUESTS)
            .await
            .find(filter)
            .sort(doc! { "created_at": -1, "_id": -1 })
            .await
            .map_err(MongoDaoError::query(CONTACT_REQUESTS, "list contact requests"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(CONTACT_REQUESTS, "list contact requests"))?;
        decode_all(documents)
    }

    async fn transition_pending_contact_request(
        &self,
        id: Uuid,
        status: ContactRequestStatus,
        at: SystemTime,
    ) -> MongoResult<Option<ContactRequestEntity>> {
        let mut filter = id_filter(id);
        filter.insert("status", ContactRequestStatus::Pending.as_str());
        self.collection::<MongoContactRequestDocument>(CONTACT_REQUESTS)
            .await
            .find_one_and_update(
                filter,
                doc! { "$set": {
                    "status": status.as_str(),
                    "updated_at": DateTime::from_system_time(at),
                } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query(CONTACT_REQUESTS, "update contact request status"))?
            .map(TryFrom::try_from)
            .transpose()
    }

    async fn delete_pending_contact_request(&self, id: Uuid) -> MongoResult<bool> {
        let mut filter = id_filter(id);
        filter.insert("status", ContactRequestStatus::Pending.as_str());
        let result = self
            .collection::<MongoContactRequestDocument>(CONTACT_REQUESTS)
            .await
            .delete_one(filter)
            .await
            .map_err(MongoDaoError::query(CONTACT_REQUESTS, "delete contact request"))?;
        Ok(result.deleted_count > 0)
    }

    async fn ensure_conversation(
        &self,
        contact_request_id: Uuid,
        at: SystemTime,
    ) -> MongoResult<ConversationEntity> {
        let filter = doc! { "contact_request_id": contact_request_id.to_string() };
        let now = DateTime::from_system_time(at);
        let upsert = self
            .collection::<MongoConversationDocument>(CONVERSATIONS)
            .await
            .update_one(
                filter.clone(),
                doc! { "$setOnInsert": {
                    "_id": Uuid::new_v4().to_string(),
                    "created_at": now,
                    "last_activity_at": now,
                } },
            )
            .upsert(true)
            .await;

        match upsert {
            Ok(_) => {}
            // A concurrent upsert won the race on the unique index; read its row.
            Err(source) if is_duplicate_key(&source) => {}
            Err(source) => {
                return Err(MongoDaoError::query(CONVERSATIONS, "upsert conversation")(source));
            }
        }

        self.find_one_as::<MongoConversationDocument, _>(CONVERSATIONS, filter)
            .await?
            .ok_or(MongoDaoError::MissingConversation {
                id: contact_request_id,
            })
    }

    async fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> MongoResult<Vec<(ConversationEntity, ContactRequestEntity)>> {
        let user = user_id.to_string();
        let requests: Vec<MongoContactRequestDocument> = self
            .collection::<MongoContactRequestDocument>(CONTACT_REQUESTS)
            .await
            .find(doc! {
                "status": ContactRequestStatus::Accepted.as_str(),
                "$or": [
                    { "requester_user_id": user.as_str() },
                    { "recipient_user_id": user.as_str() },
                ],
            })
            .await
            .map_err(MongoDaoError::query(CONTACT_REQUESTS, "list accepted requests"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(CONTACT_REQUESTS, "list accepted requests"))?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let request_ids: Vec<String> = requests.iter().map(|request| request.id.clone()).collect();
        let conversations: Vec<MongoConversationDocument> = self
            .collection::<MongoConversationDocument>(CONVERSATIONS)
            .await
            .find(doc! { "contact_request_id": { "$in": request_ids } })
            .sort(doc! { "last_activity_at": -1, "_id": -1 })
            .await
            .map_err(MongoDaoError::query(CONVERSATIONS, "list conversations"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(CONVERSATIONS, "list conversations"))?;

        let requests: Vec<ContactRequestEntity> = decode_all(requests)?;
        let conversations: Vec<ConversationEntity> = decode_all(conversations)?;
        Ok(conversations
            .into_iter()
            .filter_map(|conversation| {
                let request = requests
                    .iter()
                    .find(|request| request.id == conversation.contact_request_id)?
                    .clone();
                Some((conversation, request))
            })
            .collect())
    }

    async fn append_message(&self, message: MessageEntity) -> MongoResult<()> {
        let conversation_id = message.conversation_id;
        let created_at = DateTime::from_system_time(message.created_at);
        let document: MongoMessageDocument = message.into();
        self.collection::<MongoMessageDocument>(MESSAGES)
            .await
            .insert_one(&document)
            .await
            .map_err(MongoDaoError::query(MESSAGES, "insert message"))?;

        let bump = self
            .collection::<MongoConversationDocument>(CONVERSATIONS)
            .await
            .update_one(
                id_filter(conversation_id),
                doc! { "$max": { "last_activity_at": created_at } },
            )
            .await
            .map(drop);
        settle_activity_bump(conversation_id, bump);
        Ok(())
    }

    async fn list_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> MongoResult<Vec<MessageEntity>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut documents: Vec<MongoMessageDocument> = self
            .collection::<MongoMessageDocument>(MESSAGES)
            .await
            .find(doc! { "conversation_id": conversation_id.to_string() })
            .sort(doc! { "created_at": -1, "_id": -1 })
            .limit(limit)
            .await
            .map_err(MongoDaoError::query(MESSAGES, "list messages"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(MESSAGES, "list messages"))?;
        documents.reverse();
        decode_all(documents)
    }

    async fn latest_message(&self, conversation_id: Uuid) -> MongoResult<Option<MessageEntity>> {
        Ok(self
            .list_recent_messages(conversation_id, 1)
            .await?
            .into_iter()
            .next())
    }
}

impl MatchStore for MongoMatchStore {
    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoUserDocument, _>(USERS, id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_player_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoPlayerProfileDocument, _>(PLAYER_PROFILES, id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_player_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoPlayerProfileDocument, _>(
                    PLAYER_PROFILES,
                    doc! { "user_id": user_id.to_string() },
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_team_profile(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoTeamProfileDocument, _>(TEAM_PROFILES, id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_team_profile_by_owner(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_team_profile_by_owner(user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoGameDocument, _>(GAMES, id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = user.id;
            store
                .replace(USERS, id, MongoUserDocument::from(user))
                .await
                .map_err(Into::into)
        })
    }

    fn save_player_profile(
        &self,
        profile: PlayerProfileEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = profile.id;
            store
                .replace(PLAYER_PROFILES, id, MongoPlayerProfileDocument::from(profile))
                .await
                .map_err(Into::into)
        })
    }

    fn save_team_profile(
        &self,
        profile: TeamProfileEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = profile.id;
            store
                .replace(TEAM_PROFILES, id, MongoTeamProfileDocument::from(profile))
                .await
                .map_err(Into::into)
        })
    }

    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = game.id;
            store
                .replace(GAMES, id, MongoGameDocument::from(game))
                .await
                .map_err(Into::into)
        })
    }

    fn insert_contact_request(
        &self,
        request: ContactRequestEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_contact_request(request)
                .await
                .map_err(Into::into)
        })
    }

    fn find_contact_request(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoContactRequestDocument, _>(CONTACT_REQUESTS, id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_pending_contact_request(
        &self,
        key: PendingKey,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_pending_contact_request(key)
                .await
                .map_err(Into::into)
        })
    }

    fn list_contact_requests_by_recipient(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_contact_requests("recipient_user_id", user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_contact_requests_by_requester(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_contact_requests("requester_user_id", user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn transition_pending_contact_request(
        &self,
        id: Uuid,
        status: ContactRequestStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<ContactRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transition_pending_contact_request(id, status, at)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_pending_contact_request(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_pending_contact_request(id)
                .await
                .map_err(Into::into)
        })
    }

    fn ensure_conversation(
        &self,
        contact_request_id: Uuid,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ConversationEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .ensure_conversation(contact_request_id, at)
                .await
                .map_err(Into::into)
        })
    }

    fn find_conversation(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ConversationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoConversationDocument, _>(CONVERSATIONS, id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn list_conversations_for_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<(ConversationEntity, ContactRequestEntity)>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_conversations_for_user(user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn append_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_message(message).await.map_err(Into::into) })
    }

    fn list_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_recent_messages(conversation_id, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn latest_message(
        &self,
        conversation_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .latest_message(conversation_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_activity_bump_is_tolerated() {
        let conversation_id = Uuid::new_v4();
        assert!(settle_activity_bump::<String>(conversation_id, Ok(())));
        assert!(!settle_activity_bump(
            conversation_id,
            Err("connection reset by peer".to_string())
        ));
    }
}
