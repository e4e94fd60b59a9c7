use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether storage is usable, pinging the backend when one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
                return HealthResponse::new(true);
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(state.is_degraded())
}
