use serde::{Deserialize, Serialize};
use serde_with::{NoneAsEmptyString, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        ContactRequestEntity, ContactRequestStatus, GameEntity, ProfileKind, TargetProfile,
    },
    dto::format_system_time,
    error::ServiceError,
};

/// Payload used to contact the owner of a player or team profile.
#[serde_as]
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequestBody {
    pub game_id: Uuid,
    /// Exactly one of `targetPlayerId` / `targetTeamId` must be set.
    #[serde(default)]
    pub target_player_id: Option<Uuid>,
    #[serde(default)]
    pub target_team_id: Option<Uuid>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

impl CreateContactRequestBody {
    /// Resolve the tagged target, rejecting both or neither being set.
    pub fn target(&self) -> Result<TargetProfile, ServiceError> {
        TargetProfile::from_columns(self.target_player_id, self.target_team_id).ok_or_else(|| {
            ServiceError::InvalidInput(
                "exactly one of targetPlayerId or targetTeamId must be provided".into(),
            )
        })
    }
}

/// Payload used by the recipient to accept or reject a request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateContactRequestStatusBody {
    /// `ACCEPTED` or `REJECTED` (`DECLINED` is accepted as an alias of `REJECTED`).
    pub status: String,
}

impl UpdateContactRequestStatusBody {
    pub fn status(&self) -> Result<ContactRequestStatus, ServiceError> {
        parse_status(&self.status)
    }
}

/// Parse a status name case-insensitively, folding the legacy `DECLINED` alias into `REJECTED`.
pub fn parse_status(raw: &str) -> Result<ContactRequestStatus, ServiceError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PENDING" => Ok(ContactRequestStatus::Pending),
        "ACCEPTED" => Ok(ContactRequestStatus::Accepted),
        "REJECTED" | "DECLINED" => Ok(ContactRequestStatus::Rejected),
        other => Err(ServiceError::InvalidInput(format!(
            "unknown contact request status `{other}`"
        ))),
    }
}

/// Whether the caller sent or received the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

/// Display identity of a user as seen by their counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub user_id: Uuid,
    /// `None` when the user has no profile matching their role.
    pub kind: Option<ProfileKind>,
    pub profile_id: Option<Uuid>,
    pub name: String,
    pub tag: Option<String>,
}

/// Profile a request was addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub kind: ProfileKind,
    pub profile_id: Uuid,
    /// Player display name, or team name with its tag, e.g. `Karmine Corp [KC]`.
    pub label: String,
}

/// Game a request or conversation is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

impl From<GameEntity> for GameSummary {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            code: value.code,
        }
    }
}

/// Contact request as listed in a user's inbox or outbox.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequestSummary {
    pub id: Uuid,
    pub status: ContactRequestStatus,
    pub direction: RequestDirection,
    pub message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub other_party: PartySummary,
    pub target: TargetSummary,
    pub game: Option<GameSummary>,
}

/// Stored request returned after a status change.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequestView {
    pub id: Uuid,
    pub requester_user_id: Uuid,
    pub recipient_user_id: Uuid,
    pub target_player_id: Option<Uuid>,
    pub target_team_id: Option<Uuid>,
    pub game_id: Uuid,
    pub message: Option<String>,
    pub status: ContactRequestStatus,
    pub created_at: String,
    pub updated_at: String,
    /// Set once the request is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
}

impl ContactRequestView {
    pub fn new(request: ContactRequestEntity, conversation_id: Option<Uuid>) -> Self {
        Self {
            id: request.id,
            requester_user_id: request.requester_user_id,
            recipient_user_id: request.recipient_user_id,
            target_player_id: request.target_player_id,
            target_team_id: request.target_team_id,
            game_id: request.game_id,
            message: request.message,
            status: request.status,
            created_at: format_system_time(request.created_at),
            updated_at: format_system_time(request.updated_at),
            conversation_id,
        }
    }
}

impl ContactRequestSummary {
    pub fn new(
        request: ContactRequestEntity,
        direction: RequestDirection,
        other_party: PartySummary,
        target: TargetSummary,
        game: Option<GameSummary>,
    ) -> Self {
        Self {
            id: request.id,
            status: request.status,
            direction,
            message: request.message,
            created_at: format_system_time(request.created_at),
            updated_at: format_system_time(request.updated_at),
            other_party,
            target,
            game,
        }
    }
}

/// Acknowledgement returned by a withdrawal.
#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawResponse {
    pub ok: bool,
}
