use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the session store and report whether the backend is serving requests.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let reachable = match state.require_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                false
            }
        },
        Err(_) => {
            warn!("storage unavailable (degraded mode)");
            false
        }
    };

    HealthResponse::new(state.is_degraded(), reachable)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::memory::MemorySessionStore, state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_without_a_store() {
        let state = AppState::new(AppConfig::default());
        let report = health_status(&state).await;
        assert_eq!(report.status, "degraded");
        assert!(!report.storage_reachable);

        state.set_store(Arc::new(MemorySessionStore::new())).await;
        let report = health_status(&state).await;
        assert_eq!(report.status, "ok");
        assert!(report.storage_reachable);
    }
}
