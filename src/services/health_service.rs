use tracing::warn;

use crate::{
    dto::health::HealthResponse,
    state::{SharedState, session_machine::SessionPhase},
};

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "idle",
        SessionPhase::Recording => "recording",
        SessionPhase::Replay => "replay",
    }
}

/// Report storage connectivity and the session phase, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let session = phase_label(state.session_phase().await);
    let subscribers = state.public_sse().subscriber_count();
    if state.is_degraded().await {
        HealthResponse::degraded(session, subscribers)
    } else {
        HealthResponse::ok(session, subscribers)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{config::AppConfig, dao::match_store::MemoryMatchStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::in_memory(Duration::from_secs(4)));
        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.session, "idle");

        state
            .install_match_store(Arc::new(MemoryMatchStore::new()))
            .await;
        let _subscriber = state.public_sse().subscribe();
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.sse_subscribers, 1);
    }
}
