use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{ContactRequestEntity, ConversationEntity, MessageEntity, Participants},
    },
    dto::{
        chat::{ConversationSummary, MessageView, SendMessageBody},
        contact_request::GameSummary,
    },
    error::ServiceError,
    services::contact_request_service::describe_party,
    state::{ChatConnection, MessageNotifier, SharedState},
};

/// The two users allowed into a conversation: requester and recipient of its request.
pub async fn resolve_participants(
    state: &SharedState,
    conversation_id: Uuid,
) -> Result<Participants, ServiceError> {
    let store = state.require_store().await?;
    let (_, request) = load_conversation(&store, conversation_id).await?;
    Ok(request.participants())
}

/// Conversations `user_id` takes part in, most recently active first.
pub async fn list_conversations_for_user(
    state: &SharedState,
    user_id: Uuid,
) -> Result<Vec<ConversationSummary>, ServiceError> {
    let store = state.require_store().await?;
    let conversations = store.list_conversations_for_user(user_id).await?;

    let mut summaries = Vec::with_capacity(conversations.len());
    for (conversation, request) in conversations {
        let other_id = request.participants().other(user_id);
        let other_party = describe_party(&store, other_id).await?;
        let game = store.find_game(request.game_id).await?.map(GameSummary::from);
        let last_message = store.latest_message(conversation.id).await?;
        summaries.push(ConversationSummary::new(
            conversation,
            game,
            other_party,
            last_message,
        ));
    }
    Ok(summaries)
}

/// Most recent page of a conversation's history, oldest first.
pub async fn list_messages(
    state: &SharedState,
    actor_id: Uuid,
    conversation_id: Uuid,
) -> Result<Vec<MessageView>, ServiceError> {
    let store = state.require_store().await?;
    authorize(&store, actor_id, conversation_id).await?;
    let limit = state.config().message_page_size;
    let messages = store.list_recent_messages(conversation_id, limit).await?;
    Ok(messages.into_iter().map(MessageView::from).collect())
}

/// Persist a message and hand it to `notifier` for live delivery.
///
/// Participancy is checked before the content. Delivery to subscribers is
/// best-effort and never fails the write.
pub async fn send_message(
    state: &SharedState,
    notifier: &dyn MessageNotifier,
    actor_id: Uuid,
    conversation_id: Uuid,
    body: SendMessageBody,
) -> Result<MessageView, ServiceError> {
    let store = state.require_store().await?;
    authorize(&store, actor_id, conversation_id).await?;
    body.validate()
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))?;

    let message = MessageEntity::new(conversation_id, actor_id, body.content, SystemTime::now());
    store.append_message(message.clone()).await?;
    debug!(
        conversation_id = %conversation_id,
        message_id = %message.id,
        sender_id = %actor_id,
        "chat message stored"
    );

    let view = MessageView::from(message);
    notifier.message_created(&view);
    Ok(view)
}

/// Subscribe a socket to a conversation if its user participates in it.
///
/// Returns whether the subscription was made; refusals are not errors to the socket.
pub async fn join(state: &SharedState, connection: ChatConnection, conversation_id: Uuid) -> bool {
    let authorized = match state.require_store().await {
        Ok(store) => authorize(&store, connection.user_id, conversation_id).await,
        Err(err) => Err(err),
    };

    match authorized {
        Ok(_) => {
            info!(
                connection_id = %connection.id,
                user_id = %connection.user_id,
                conversation_id = %conversation_id,
                "socket joined conversation"
            );
            state.chat_hub().join(conversation_id, connection);
            true
        }
        Err(err @ (ServiceError::NotFound(_) | ServiceError::Forbidden(_))) => {
            debug!(
                user_id = %connection.user_id,
                conversation_id = %conversation_id,
                reason = %err,
                "conversation join refused"
            );
            false
        }
        Err(err) => {
            warn!(
                user_id = %connection.user_id,
                conversation_id = %conversation_id,
                error = %err,
                "conversation join failed"
            );
            false
        }
    }
}

/// Drop a socket's subscription to a conversation. Leaving twice is harmless.
pub fn leave(state: &SharedState, connection_id: Uuid, conversation_id: Uuid) {
    if state.chat_hub().leave(conversation_id, connection_id) {
        debug!(connection_id = %connection_id, conversation_id = %conversation_id, "socket left conversation");
    }
}

async fn load_conversation(
    store: &Arc<dyn MatchStore>,
    conversation_id: Uuid,
) -> Result<(ConversationEntity, ContactRequestEntity), ServiceError> {
    let not_found = || ServiceError::NotFound(format!("conversation `{conversation_id}` not found"));
    let conversation = store
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(not_found)?;
    let request = store
        .find_contact_request(conversation.contact_request_id)
        .await?
        .ok_or_else(not_found)?;
    Ok((conversation, request))
}

async fn authorize(
    store: &Arc<dyn MatchStore>,
    actor_id: Uuid,
    conversation_id: Uuid,
) -> Result<ConversationEntity, ServiceError> {
    let (conversation, request) = load_conversation(store, conversation_id).await?;
    if !request.participants().contains(actor_id) {
        return Err(ServiceError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::extract::ws::Message;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{state::ChatHub, test_support::Fixture};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<MessageView>>);

    impl MessageNotifier for Recorder {
        fn message_created(&self, message: &MessageView) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    fn body(content: &str) -> SendMessageBody {
        SendMessageBody {
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn participants_exchange_messages_in_order() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let recorder = Recorder::default();

        let first = send_message(&fx.state, &recorder, fx.player.user_id, conversation_id, body("hi"))
            .await
            .unwrap();
        let second = send_message(
            &fx.state,
            &recorder,
            fx.team.owner_user_id,
            conversation_id,
            body("hello"),
        )
        .await
        .unwrap();

        let history = list_messages(&fx.state, fx.team.owner_user_id, conversation_id)
            .await
            .unwrap();
        assert_eq!(history, vec![first.clone(), second.clone()]);
        assert_eq!(*recorder.0.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn outsiders_are_forbidden_and_unknown_ids_not_found() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let recorder = Recorder::default();
        let outsider = Uuid::new_v4();

        let err = list_messages(&fx.state, outsider, conversation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // Participancy is judged before content.
        let err = send_message(&fx.state, &recorder, outsider, conversation_id, body("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = list_messages(&fx.state, fx.player.user_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_or_oversized_content_is_invalid() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let recorder = Recorder::default();

        let oversized = "x".repeat(2001);
        for content in ["", "   ", oversized.as_str()] {
            let err = send_message(
                &fx.state,
                &recorder,
                fx.player.user_id,
                conversation_id,
                body(content),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
        let history = list_messages(&fx.state, fx.player.user_id, conversation_id)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn conversation_list_shows_counterpart_and_last_message() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let recorder = Recorder::default();
        send_message(&fx.state, &recorder, fx.player.user_id, conversation_id, body("gl hf"))
            .await
            .unwrap();

        let for_player = list_conversations_for_user(&fx.state, fx.player.user_id).await.unwrap();
        assert_eq!(for_player.len(), 1);
        assert_eq!(for_player[0].id, conversation_id);
        assert_eq!(for_player[0].other_party.name, "Karmine Corp");
        assert_eq!(
            for_player[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("gl hf")
        );

        let for_team = list_conversations_for_user(&fx.state, fx.team.owner_user_id).await.unwrap();
        assert_eq!(for_team[0].other_party.name, "Faker");

        assert!(list_conversations_for_user(&fx.state, Uuid::new_v4()).await.unwrap().is_empty());

        let participants = resolve_participants(&fx.state, conversation_id).await.unwrap();
        assert_eq!(participants.requester, fx.player.user_id);
        assert_eq!(participants.recipient, fx.team.owner_user_id);
    }

    #[tokio::test]
    async fn join_subscribes_only_participants() {
        let fx = Fixture::new().await;
        let conversation_id = fx.accepted_conversation().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let member = ChatConnection {
            id: Uuid::new_v4(),
            user_id: fx.player.user_id,
            tx: tx.clone(),
        };
        let outsider = ChatConnection {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            tx,
        };

        assert!(!join(&fx.state, outsider, conversation_id).await);
        assert!(!join(&fx.state, member.clone(), Uuid::new_v4()).await);
        assert!(join(&fx.state, member.clone(), conversation_id).await);
        assert_eq!(fx.state.chat_hub().subscriber_count(conversation_id), 1);

        let hub: &ChatHub = fx.state.chat_hub();
        send_message(&fx.state, hub, fx.team.owner_user_id, conversation_id, body("ready?"))
            .await
            .unwrap();
        let Ok(Message::Text(frame)) = rx.try_recv() else {
            panic!("expected a pushed message");
        };
        assert!(frame.as_str().contains("\"message:new\""));

        leave(&fx.state, member.id, conversation_id);
        assert_eq!(fx.state.chat_hub().subscriber_count(conversation_id), 0);
    }
}
