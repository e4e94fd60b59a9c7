use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::chat::MessageView;

/// Conversation reference carried by join/leave frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: Uuid,
}

const JOIN_EVENT: &str = "conversation:join";
const LEAVE_EVENT: &str = "conversation:leave";

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Frames accepted from chat WebSocket clients, as `{"event": ..., "data": ...}`.
///
/// A known event whose payload lacks a valid `conversationId` still parses,
/// with `None` as its target, so the client can be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatInboundMessage {
    Join(Option<Uuid>),
    Leave(Option<Uuid>),
}

impl ChatInboundMessage {
    /// Parse a text frame. `Ok(None)` means the event is not one this server handles.
    pub fn from_json_str(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        let frame: RawFrame = serde_json::from_str(raw)?;
        let target = serde_json::from_value::<ConversationRef>(frame.data)
            .ok()
            .map(|target| target.conversation_id);
        Ok(match frame.event.as_str() {
            JOIN_EVENT => Some(Self::Join(target)),
            LEAVE_EVENT => Some(Self::Leave(target)),
            _ => None,
        })
    }
}

/// Acknowledgement of a join or leave frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
/// Frames pushed to chat WebSocket clients.
#[serde(tag = "event", content = "data")]
pub enum ChatOutboundMessage {
    #[serde(rename = "conversation:join")]
    JoinAck(SubscriptionAck),
    #[serde(rename = "conversation:leave")]
    LeaveAck(SubscriptionAck),
    #[serde(rename = "message:new")]
    NewMessage(MessageView),
}
