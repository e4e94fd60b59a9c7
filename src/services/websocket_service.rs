use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ChatInboundMessage, ChatOutboundMessage, SubscriptionAck},
    services::chat_service,
    state::{ChatConnection, SharedState},
};

/// The socket writer task is gone; nothing more can be delivered on this connection.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Drive one authenticated chat socket until the client goes away.
///
/// Clients subscribe to conversations with `conversation:join` frames; every
/// join is checked against the conversation's participants before the socket
/// is added to the room. Subscriptions die with the connection.
pub async fn handle_socket(state: SharedState, user_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection = ChatConnection {
        id: Uuid::new_v4(),
        user_id,
        tx: outbound_tx.clone(),
    };
    info!(connection_id = %connection.id, user_id = %user_id, "chat socket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let inbound = match ChatInboundMessage::from_json_str(text.as_str()) {
                    Ok(Some(inbound)) => inbound,
                    Ok(None) => {
                        debug!(connection_id = %connection.id, "ignoring unknown chat event");
                        continue;
                    }
                    Err(err) => {
                        warn!(
                            connection_id = %connection.id,
                            error = %err,
                            "ignoring malformed chat frame"
                        );
                        continue;
                    }
                };
                if handle_frame(&state, &connection, inbound).await.is_err() {
                    debug!(connection_id = %connection.id, "writer closed while acknowledging");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection.id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.chat_hub().disconnect(connection.id);
    info!(connection_id = %connection.id, user_id = %user_id, "chat socket disconnected");

    drop(connection);
    finalize(writer_task, outbound_tx).await;
}

async fn handle_frame(
    state: &SharedState,
    connection: &ChatConnection,
    inbound: ChatInboundMessage,
) -> Result<(), ConnectionClosed> {
    let reply = match inbound {
        ChatInboundMessage::Join(target) => {
            let ok = match target {
                Some(conversation_id) => {
                    chat_service::join(state, connection.clone(), conversation_id).await
                }
                None => false,
            };
            ChatOutboundMessage::JoinAck(SubscriptionAck {
                conversation_id: target,
                ok,
            })
        }
        ChatInboundMessage::Leave(target) => {
            if let Some(conversation_id) = target {
                chat_service::leave(state, connection.id, conversation_id);
            }
            ChatOutboundMessage::LeaveAck(SubscriptionAck {
                conversation_id: target,
                ok: target.is_some(),
            })
        }
    };
    send_message_to_websocket(&connection.tx, &reply)
}

/// Serialize a payload and queue it on a socket's writer channel.
///
/// A payload that fails to serialize is logged and dropped; only a closed
/// writer is reported to the caller.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize frame `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;
    use crate::{dto::chat::SendMessageBody, test_support::Fixture};

    fn next_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        let Ok(Message::Text(text)) = rx.try_recv() else {
            panic!("expected a queued text frame");
        };
        serde_json::from_str(text.as_str()).unwrap()
    }

    fn connection(user_id: Uuid) -> (ChatConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ChatConnection {
            id: Uuid::new_v4(),
            user_id,
            tx,
        };
        (connection, rx)
    }

    #[test]
    fn closed_writer_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(send_message_to_websocket(&tx, &serde_json::json!({"event": "x"})).is_ok());
        drop(rx);
        assert!(send_message_to_websocket(&tx, &serde_json::json!({"event": "x"})).is_err());
    }

    #[tokio::test]
    async fn join_is_acknowledged_before_pushed_messages() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let (member, mut rx) = connection(fx.player.user_id);

        handle_frame(&fx.state, &member, ChatInboundMessage::Join(Some(conversation_id)))
            .await
            .unwrap();
        assert_eq!(
            next_frame(&mut rx),
            json!({
                "event": "conversation:join",
                "data": { "conversationId": conversation_id, "ok": true },
            })
        );

        let body = SendMessageBody {
            content: "scrim at 8?".into(),
        };
        chat_service::send_message(
            &fx.state,
            fx.state.chat_hub(),
            fx.team.owner_user_id,
            conversation_id,
            body,
        )
        .await
        .unwrap();
        let pushed = next_frame(&mut rx);
        assert_eq!(pushed["event"], "message:new");
        assert_eq!(pushed["data"]["content"], "scrim at 8?");

        handle_frame(&fx.state, &member, ChatInboundMessage::Leave(Some(conversation_id)))
            .await
            .unwrap();
        assert_eq!(
            next_frame(&mut rx),
            json!({
                "event": "conversation:leave",
                "data": { "conversationId": conversation_id, "ok": true },
            })
        );
        assert_eq!(fx.state.chat_hub().subscriber_count(conversation_id), 0);
    }

    #[tokio::test]
    async fn refused_joins_are_acknowledged_with_ok_false() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let unknown_id = Uuid::new_v4();
        let (outsider, mut outsider_rx) = connection(Uuid::new_v4());
        let (member, mut member_rx) = connection(fx.player.user_id);

        handle_frame(&fx.state, &outsider, ChatInboundMessage::Join(Some(conversation_id)))
            .await
            .unwrap();
        assert_eq!(
            next_frame(&mut outsider_rx),
            json!({
                "event": "conversation:join",
                "data": { "conversationId": conversation_id, "ok": false },
            })
        );

        handle_frame(&fx.state, &member, ChatInboundMessage::Join(Some(unknown_id)))
            .await
            .unwrap();
        assert_eq!(
            next_frame(&mut member_rx),
            json!({
                "event": "conversation:join",
                "data": { "conversationId": unknown_id, "ok": false },
            })
        );

        let missing_id =
            ChatInboundMessage::from_json_str(r#"{"event":"conversation:join","data":{}}"#)
                .unwrap()
                .unwrap();
        handle_frame(&fx.state, &member, missing_id).await.unwrap();
        assert_eq!(
            next_frame(&mut member_rx),
            json!({ "event": "conversation:join", "data": { "ok": false } })
        );

        assert_eq!(fx.state.chat_hub().subscriber_count(conversation_id), 0);
        assert!(outsider_rx.try_recv().is_err());
        assert!(member_rx.try_recv().is_err());
    }
}
