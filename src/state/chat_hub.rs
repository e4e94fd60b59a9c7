use std::collections::HashMap;

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{chat::MessageView, ws::ChatOutboundMessage},
    services::websocket_service::send_message_to_websocket,
};

#[derive(Clone)]
/// Handle used to push frames to one connected chat socket.
pub struct ChatConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Receives newly persisted messages so they can be pushed to live subscribers.
pub trait MessageNotifier: Send + Sync {
    fn message_created(&self, message: &MessageView);
}

/// Conversation rooms keyed by conversation id, each holding its subscribed sockets.
#[derive(Default)]
pub struct ChatHub {
    rooms: DashMap<Uuid, HashMap<Uuid, ChatConnection>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a conversation. Joining twice is a no-op.
    pub fn join(&self, conversation_id: Uuid, connection: ChatConnection) {
        self.rooms
            .entry(conversation_id)
            .or_default()
            .insert(connection.id, connection);
    }

    /// Drop one subscription; returns whether it existed.
    pub fn leave(&self, conversation_id: Uuid, connection_id: Uuid) -> bool {
        let removed = match self.rooms.get_mut(&conversation_id) {
            Some(mut members) => members.remove(&connection_id).is_some(),
            None => false,
        };
        self.rooms
            .remove_if(&conversation_id, |_, members| members.is_empty());
        removed
    }

    /// Drop every subscription held by a connection.
    pub fn disconnect(&self, connection_id: Uuid) {
        self.rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    pub fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.rooms
            .get(&conversation_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Push a payload to every subscriber of a conversation.
    ///
    /// Delivery is best-effort: subscribers whose socket writer is gone are
    /// dropped from the room. Returns the number of sockets the frame was queued on.
    pub fn publish<T>(&self, conversation_id: Uuid, payload: &T) -> usize
    where
        T: ?Sized + Serialize + std::fmt::Debug,
    {
        let targets: Vec<ChatConnection> = match self.rooms.get(&conversation_id) {
            Some(members) => members.values().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for connection in targets {
            match send_message_to_websocket(&connection.tx, payload) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(
                        connection_id = %connection.id,
                        conversation_id = %conversation_id,
                        "dropping closed chat subscriber"
                    );
                    self.leave(conversation_id, connection.id);
                }
            }
        }
        delivered
    }
}

impl MessageNotifier for ChatHub {
    fn message_created(&self, message: &MessageView) {
        let delivered = self.publish(
            message.conversation_id,
            &ChatOutboundMessage::NewMessage(message.clone()),
        );
        info!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            delivered,
            "pushed new chat message"
        );
    }
}
