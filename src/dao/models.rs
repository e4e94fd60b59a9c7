use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role chosen by a user at registration, deciding which profile represents them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Player,
    Team,
}

/// Whether a profile can be discovered and contacted by other users.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileVisibility {
    Public,
    Private,
}

/// Lifecycle status of a contact request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ContactRequestStatus {
    /// Persisted representation, shared by every backend.
    pub fn as_str(self) -> &'static str {
        match self {
            ContactRequestStatus::Pending => "PENDING",
            ContactRequestStatus::Accepted => "ACCEPTED",
            ContactRequestStatus::Rejected => "REJECTED",
        }
    }

    /// Accepted and rejected requests never go back to pending.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ContactRequestStatus::Pending)
    }
}

/// Kind of profile a contact request is addressed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileKind {
    Player,
    Team,
}

/// Profile targeted by a contact request: always exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetProfile {
    Player(Uuid),
    Team(Uuid),
}

impl TargetProfile {
    pub fn kind(self) -> ProfileKind {
        match self {
            TargetProfile::Player(_) => ProfileKind::Player,
            TargetProfile::Team(_) => ProfileKind::Team,
        }
    }

    pub fn profile_id(self) -> Uuid {
        match self {
            TargetProfile::Player(id) | TargetProfile::Team(id) => id,
        }
    }

    /// Split into the `(target_player_id, target_team_id)` column pair.
    pub fn into_columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            TargetProfile::Player(id) => (Some(id), None),
            TargetProfile::Team(id) => (None, Some(id)),
        }
    }

    /// Rebuild the tagged target from the column pair, rejecting both/neither.
    pub fn from_columns(player: Option<Uuid>, team: Option<Uuid>) -> Option<Self> {
        match (player, team) {
            (Some(id), None) => Some(TargetProfile::Player(id)),
            (None, Some(id)) => Some(TargetProfile::Team(id)),
            _ => None,
        }
    }
}

/// Account known to the platform. Written by registration, read by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub created_at: SystemTime,
}

/// Player-facing profile owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProfileEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub region: Option<String>,
    pub visibility: ProfileVisibility,
    pub created_at: SystemTime,
}

/// Team profile managed by its owning user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamProfileEntity {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    /// Short team tag, e.g. `G2`.
    pub tag: Option<String>,
    pub region: Option<String>,
    pub visibility: ProfileVisibility,
    pub created_at: SystemTime,
}

/// Game a contact request is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    pub id: Uuid,
    pub name: String,
    /// Stable short code such as `LOL` or `VALORANT`.
    pub code: String,
}

/// Uniqueness key for pending contact requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub requester_user_id: Uuid,
    pub recipient_user_id: Uuid,
    pub target: TargetProfile,
    pub game_id: Uuid,
}

/// Persisted contact request between a requester and the owner of a target profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactRequestEntity {
    pub id: Uuid,
    pub requester_user_id: Uuid,
    pub recipient_user_id: Uuid,
    /// Mutually exclusive with `target_team_id`.
    pub target_player_id: Option<Uuid>,
    pub target_team_id: Option<Uuid>,
    pub game_id: Uuid,
    pub message: Option<String>,
    pub status: ContactRequestStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl ContactRequestEntity {
    /// Build a fresh pending request for the given key.
    pub fn pending(key: PendingKey, message: Option<String>, now: SystemTime) -> Self {
        let (target_player_id, target_team_id) = key.target.into_columns();
        Self {
            id: Uuid::new_v4(),
            requester_user_id: key.requester_user_id,
            recipient_user_id: key.recipient_user_id,
            target_player_id,
            target_team_id,
            game_id: key.game_id,
            message,
            status: ContactRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn target(&self) -> Option<TargetProfile> {
        TargetProfile::from_columns(self.target_player_id, self.target_team_id)
    }

    pub fn pending_key(&self) -> Option<PendingKey> {
        Some(PendingKey {
            requester_user_id: self.requester_user_id,
            recipient_user_id: self.recipient_user_id,
            target: self.target()?,
            game_id: self.game_id,
        })
    }

    /// Both users entitled to the conversation unlocked by this request.
    pub fn participants(&self) -> Participants {
        Participants {
            requester: self.requester_user_id,
            recipient: self.recipient_user_id,
        }
    }
}

/// Requester/recipient pair derived from a contact request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participants {
    pub requester: Uuid,
    pub recipient: Uuid,
}

impl Participants {
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.requester == user_id || self.recipient == user_id
    }

    /// The counterpart of `user_id`, assuming `user_id` is a participant.
    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.requester == user_id {
            self.recipient
        } else {
            self.requester
        }
    }
}

/// Messaging channel attached to one accepted contact request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationEntity {
    pub id: Uuid,
    /// Unique: at most one conversation per contact request.
    pub contact_request_id: Uuid,
    pub created_at: SystemTime,
    pub last_activity_at: SystemTime,
}

impl ConversationEntity {
    pub fn new(contact_request_id: Uuid, now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_request_id,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// Immutable chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntity {
    /// UUIDv7 so identifiers sort with creation time.
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_user_id: Uuid,
    pub content: String,
    pub created_at: SystemTime,
}

impl MessageEntity {
    pub fn new(conversation_id: Uuid, sender_user_id: Uuid, content: String, now: SystemTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            sender_user_id,
            content,
            created_at: now,
        }
    }
}
