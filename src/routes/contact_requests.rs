use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, patch, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::CurrentUser,
    dto::contact_request::{
        ContactRequestSummary, ContactRequestView, CreateContactRequestBody,
        UpdateContactRequestStatusBody, WithdrawResponse,
    },
    error::AppError,
    services::contact_request_service,
    state::SharedState,
};

/// Routes managing contact requests between users and profiles.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/contact-requests", post(create_contact_request))
        .route("/contact-requests/incoming", get(list_incoming))
        .route("/contact-requests/outgoing", get(list_outgoing))
        .route(
            "/contact-requests/{id}",
            patch(update_status).delete(withdraw),
        )
}

/// Contact the owner of a public player or team profile.
#[utoipa::path(
    post,
    path = "/contact-requests",
    tag = "contact-requests",
    request_body = CreateContactRequestBody,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Request created", body = ContactRequestSummary),
        (status = 400, description = "Invalid target, message or self-contact"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown user, game or non-public profile"),
        (status = 409, description = "A pending request already exists")
    )
)]
pub async fn create_contact_request(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<CreateContactRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ContactRequestSummary>), AppError> {
    let Json(body) = payload?;
    let target = body.target()?;
    body.validate()?;

    let summary =
        contact_request_service::create(&state, user_id, target, body.game_id, body.message)
            .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Requests the caller received, newest first.
#[utoipa::path(
    get,
    path = "/contact-requests/incoming",
    tag = "contact-requests",
    security(("bearer" = [])),
    responses((status = 200, description = "Incoming requests", body = [ContactRequestSummary]))
)]
pub async fn list_incoming(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<ContactRequestSummary>>, AppError> {
    Ok(Json(
        contact_request_service::list_incoming(&state, user_id).await?,
    ))
}

/// Requests the caller sent, newest first.
#[utoipa::path(
    get,
    path = "/contact-requests/outgoing",
    tag = "contact-requests",
    security(("bearer" = [])),
    responses((status = 200, description = "Outgoing requests", body = [ContactRequestSummary]))
)]
pub async fn list_outgoing(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<ContactRequestSummary>>, AppError> {
    Ok(Json(
        contact_request_service::list_outgoing(&state, user_id).await?,
    ))
}

/// Accept or reject a received request.
#[utoipa::path(
    patch,
    path = "/contact-requests/{id}",
    tag = "contact-requests",
    params(("id" = Uuid, Path, description = "Contact request identifier")),
    request_body = UpdateContactRequestStatusBody,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Request updated", body = ContactRequestView),
        (status = 400, description = "Unknown or non-final status"),
        (status = 403, description = "Caller is not the recipient"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already has the other final status")
    )
)]
pub async fn update_status(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateContactRequestStatusBody>, JsonRejection>,
) -> Result<Json<ContactRequestView>, AppError> {
    let Json(body) = payload?;
    let status = body.status()?;
    let view = contact_request_service::update_status(&state, user_id, id, status).await?;
    Ok(Json(view))
}

/// Withdraw a request the caller sent while it is still pending.
#[utoipa::path(
    delete,
    path = "/contact-requests/{id}",
    tag = "contact-requests",
    params(("id" = Uuid, Path, description = "Contact request identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Request withdrawn", body = WithdrawResponse),
        (status = 400, description = "Request is no longer pending"),
        (status = 403, description = "Caller is not the requester"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn withdraw(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawResponse>, AppError> {
    contact_request_service::withdraw(&state, user_id, id).await?;
    Ok(Json(WithdrawResponse { ok: true }))
}
