use axum::Router;

use crate::state::SharedState;

pub mod chats;
pub mod contact_requests;
pub mod docs;
pub mod health;
pub mod websocket;

/// Compose all route trees and bind them to the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(contact_requests::router())
        .merge(chats::router())
        .merge(websocket::router())
        .merge(docs::router());

    api_router.with_state(state)
}
