use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Session phase (`idle`, `recording` or `replay`).
    pub session: String,
    /// Number of connected SSE clients.
    pub sse_subscribers: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(session: impl Into<String>, sse_subscribers: usize) -> Self {
        Self {
            status: "ok".to_string(),
            session: session.into(),
            sse_subscribers,
        }
    }

    /// Whether the response reports degraded mode.
    pub fn is_degraded(&self) -> bool {
        self.status == "degraded"
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(session: impl Into<String>, sse_subscribers: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            session: session.into(),
            sse_subscribers,
        }
    }
}
