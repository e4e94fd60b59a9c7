use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    auth::{AuthError, bearer_token},
    error::AppError,
    services::websocket_service,
    state::SharedState,
};

/// Browsers cannot set headers on a WebSocket handshake, so the token may ride in the query.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "chats",
    params(("token" = Option<String>, Query, description = "Bearer token when no Authorization header is sent")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing or invalid token")
    )
)]
/// Authenticate the caller and upgrade into a chat WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers)
        .or(query.token.as_deref())
        .ok_or(AuthError::MissingToken)?;
    let user_id = state.tokens().verify(token).inspect_err(|err| {
        debug!(error = %err, "rejected websocket handshake");
    })?;

    // Authentication is judged before the upgrade headers.
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let shared_state = state.clone();
    Ok(ws
        .on_upgrade(move |socket| websocket_service::handle_socket(shared_state, user_id, socket))
        .into_response())
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
