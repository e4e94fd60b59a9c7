use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    ContactRequestEntity, ContactRequestStatus, ConversationEntity, GameEntity, MessageEntity,
    PlayerProfileEntity, ProfileVisibility, TeamProfileEntity, UserEntity, UserRole,
};

pub const USERS: &str = "users";
pub const PLAYER_PROFILES: &str = "player_profiles";
pub const TEAM_PROFILES: &str = "team_profiles";
pub const GAMES: &str = "games";
pub const CONTACT_REQUESTS: &str = "contact_requests";
pub const CONVERSATIONS: &str = "conversations";
pub const MESSAGES: &str = "messages";

// Identifiers are stored as hyphenated strings so filters and documents always agree.
fn parse_id(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Malformed {
        collection,
        id: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_optional_id(collection: &'static str, raw: Option<&str>) -> MongoResult<Option<Uuid>> {
    raw.map(|value| parse_id(collection, value)).transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime,
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id.to_string(),
            email: value.email,
            role: value.role,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoUserDocument> for UserEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoUserDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(USERS, &value.id)?,
            email: value.email,
            role: value.role,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub region: Option<String>,
    pub visibility: ProfileVisibility,
    pub created_at: DateTime,
}

impl From<PlayerProfileEntity> for MongoPlayerProfileDocument {
    fn from(value: PlayerProfileEntity) -> Self {
        Self {
            id: value.id.to_string(),
            user_id: value.user_id.to_string(),
            display_name: value.display_name,
            region: value.region,
            visibility: value.visibility,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoPlayerProfileDocument> for PlayerProfileEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerProfileDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(PLAYER_PROFILES, &value.id)?,
            user_id: parse_id(PLAYER_PROFILES, &value.user_id)?,
            display_name: value.display_name,
            region: value.region,
            visibility: value.visibility,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub tag: Option<String>,
    pub region: Option<String>,
    pub visibility: ProfileVisibility,
    pub created_at: DateTime,
}

impl From<TeamProfileEntity> for MongoTeamProfileDocument {
    fn from(value: TeamProfileEntity) -> Self {
        Self {
            id: value.id.to_string(),
            owner_user_id: value.owner_user_id.to_string(),
            name: value.name,
            tag: value.tag,
            region: value.region,
            visibility: value.visibility,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoTeamProfileDocument> for TeamProfileEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTeamProfileDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(TEAM_PROFILES, &value.id)?,
            owner_user_id: parse_id(TEAM_PROFILES, &value.owner_user_id)?,
            name: value.name,
            tag: value.tag,
            region: value.region,
            visibility: value.visibility,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub code: String,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            code: value.code,
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGameDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(GAMES, &value.id)?,
            name: value.name,
            code: value.code,
        })
    }
}

/// Contact request as stored. Both target columns are always written (as `null`
/// when unused) so the partial unique index sees a complete key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoContactRequestDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub requester_user_id: String,
    pub recipient_user_id: String,
    pub target_player_id: Option<String>,
    pub target_team_id: Option<String>,
    pub game_id: String,
    pub message: Option<String>,
    pub status: ContactRequestStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<ContactRequestEntity> for MongoContactRequestDocument {
    fn from(value: ContactRequestEntity) -> Self {
        Self {
            id: value.id.to_string(),
            requester_user_id: value.requester_user_id.to_string(),
            recipient_user_id: value.recipient_user_id.to_string(),
            target_player_id: value.target_player_id.map(|id| id.to_string()),
            target_team_id: value.target_team_id.map(|id| id.to_string()),
            game_id: value.game_id.to_string(),
            message: value.message,
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoContactRequestDocument> for ContactRequestEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoContactRequestDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(CONTACT_REQUESTS, &value.id)?,
            requester_user_id: parse_id(CONTACT_REQUESTS, &value.requester_user_id)?,
            recipient_user_id: parse_id(CONTACT_REQUESTS, &value.recipient_user_id)?,
            target_player_id: parse_optional_id(
                CONTACT_REQUESTS,
                value.target_player_id.as_deref(),
            )?,
            target_team_id: parse_optional_id(CONTACT_REQUESTS, value.target_team_id.as_deref())?,
            game_id: parse_id(CONTACT_REQUESTS, &value.game_id)?,
            message: value.message,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConversationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub contact_request_id: String,
    pub created_at: DateTime,
    pub last_activity_at: DateTime,
}

impl TryFrom<MongoConversationDocument> for ConversationEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoConversationDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(CONVERSATIONS, &value.id)?,
            contact_request_id: parse_id(CONVERSATIONS, &value.contact_request_id)?,
            created_at: value.created_at.to_system_time(),
            last_activity_at: value.last_activity_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub sender_user_id: String,
    pub content: String,
    pub created_at: DateTime,
}

impl From<MessageEntity> for MongoMessageDocument {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id.to_string(),
            conversation_id: value.conversation_id.to_string(),
            sender_user_id: value.sender_user_id.to_string(),
            content: value.content,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoMessageDocument> for MessageEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMessageDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(MESSAGES, &value.id)?,
            conversation_id: parse_id(MESSAGES, &value.conversation_id)?,
            sender_user_id: parse_id(MESSAGES, &value.sender_user_id)?,
            content: value.content,
            created_at: value.created_at.to_system_time(),
        })
    }
}
