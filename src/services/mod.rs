/// Conversation access and message posting.
pub mod chat_service;
/// Contact request creation and status transitions.
pub mod contact_request_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Directory seeding from a JSON file.
pub mod seed_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// Chat WebSocket connection handling.
pub mod websocket_service;
