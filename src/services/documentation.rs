use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Teamfinder Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::contact_requests::create_contact_request,
        crate::routes::contact_requests::list_incoming,
        crate::routes::contact_requests::list_outgoing,
        crate::routes::contact_requests::update_status,
        crate::routes::contact_requests::withdraw,
        crate::routes::chats::list_conversations,
        crate::routes::chats::list_messages,
        crate::routes::chats::send_message,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::contact_request::CreateContactRequestBody,
            crate::dto::contact_request::UpdateContactRequestStatusBody,
            crate::dto::contact_request::ContactRequestSummary,
            crate::dto::contact_request::ContactRequestView,
            crate::dto::contact_request::RequestDirection,
            crate::dto::contact_request::PartySummary,
            crate::dto::contact_request::TargetSummary,
            crate::dto::contact_request::GameSummary,
            crate::dto::contact_request::WithdrawResponse,
            crate::dto::chat::SendMessageBody,
            crate::dto::chat::MessageView,
            crate::dto::chat::ConversationSummary,
            crate::dao::models::ContactRequestStatus,
            crate::dao::models::ProfileKind,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "contact-requests", description = "Contact requests between users and profiles"),
        (name = "chats", description = "Conversations opened by accepted requests"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_chat_and_request_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/contact-requests",
            "/contact-requests/{id}",
            "/chats/{id}/messages",
            "/ws",
        ] {
            assert!(paths.iter().any(|path| path == expected), "missing {expected}");
        }
        assert!(
            doc.components
                .unwrap()
                .security_schemes
                .contains_key("bearer")
        );
    }
}
