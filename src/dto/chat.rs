use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{ConversationEntity, MessageEntity},
    dto::{
        contact_request::{GameSummary, PartySummary},
        format_system_time,
        validation::validate_message_content,
    },
};

/// Payload used to post a message to a conversation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageBody {
    pub content: String,
}

impl Validate for SendMessageBody {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_message_content(&self.content) {
            errors.add("content", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Chat message as returned by the REST API and pushed as `message:new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: String,
}

impl From<MessageEntity> for MessageView {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id,
            conversation_id: value.conversation_id,
            sender_id: value.sender_user_id,
            content: value.content,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Entry of the caller's conversation list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub contact_request_id: Uuid,
    pub created_at: String,
    pub last_activity_at: String,
    pub game: Option<GameSummary>,
    pub other_party: PartySummary,
    /// Most recent message, if any was sent yet.
    pub last_message: Option<MessageView>,
}

impl ConversationSummary {
    pub fn new(
        conversation: ConversationEntity,
        game: Option<GameSummary>,
        other_party: PartySummary,
        last_message: Option<MessageEntity>,
    ) -> Self {
        Self {
            id: conversation.id,
            contact_request_id: conversation.contact_request_id,
            created_at: format_system_time(conversation.created_at),
            last_activity_at: format_system_time(conversation.last_activity_at),
            game,
            other_party,
            last_message: last_message.map(MessageView::from),
        }
    }
}
