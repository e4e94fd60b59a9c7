use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    dto::chat::{ConversationSummary, MessageView, SendMessageBody},
    error::AppError,
    services::chat_service,
    state::SharedState,
};

/// Routes exposing conversations opened by accepted contact requests.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/chats", get(list_conversations))
        .route(
            "/chats/{id}/messages",
            get(list_messages).post(send_message),
        )
}

#[utoipa::path(
    get,
    path = "/chats",
    tag = "chats",
    security(("bearer" = [])),
    responses((status = 200, description = "Caller's conversations", body = [ConversationSummary]))
)]
/// Conversations of the caller, most recently active first.
pub async fn list_conversations(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    Ok(Json(chat_service::list_conversations_for_user(&state, user_id).await?))
}

#[utoipa::path(
    get,
    path = "/chats/{id}/messages",
    tag = "chats",
    params(("id" = Uuid, Path, description = "Conversation identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Latest messages, oldest first", body = [MessageView]),
        (status = 403, description = "Caller is not a participant"),
        (status = 404, description = "Conversation not found")
    )
)]
/// Latest page of a conversation's history.
pub async fn list_messages(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    Ok(Json(chat_service::list_messages(&state, user_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/chats/{id}/messages",
    tag = "chats",
    params(("id" = Uuid, Path, description = "Conversation identifier")),
    request_body = SendMessageBody,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Message stored and pushed", body = MessageView),
        (status = 400, description = "Blank or oversized content"),
        (status = 403, description = "Caller is not a participant"),
        (status = 404, description = "Conversation not found")
    )
)]
/// Post a message; connected participants receive it as `message:new`.
pub async fn send_message(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<SendMessageBody>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let Json(body) = payload?;
    let message = chat_service::send_message(&state, state.chat_hub(), user_id, id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
