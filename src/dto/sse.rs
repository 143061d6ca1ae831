use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dto::matches::MatchSummary, state::streak::StreakNotification};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name; `None` sends an unnamed message.
    pub event: Option<String>,
    /// Serialized JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    /// Live match at connection time, if any.
    #[serde(skip_serializing_if = "Option::is_none", rename = "match")]
    pub current: Option<MatchSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// No match store is reachable.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast after every applied change to the live match.
pub struct MatchUpdatedEvent(pub MatchSummary);

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast when a player crosses a hot or cold threshold.
pub struct StreakEvent(pub StreakNotification);

#[derive(Debug, Serialize, ToSchema)]
/// Transient notice that a background save did not reach the store.
pub struct AutosaveFailedEvent {
    /// Remote identifier of the match.
    pub match_id: Uuid,
    /// Backend error message.
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the live match has been written to the store.
pub struct SyncSavedEvent {
    /// Remote identifier of the match.
    pub match_id: Uuid,
    /// Saved name.
    pub name: String,
    /// RFC 3339 completion time.
    pub saved_at: String,
    /// `true` for explicit saves, `false` for autosaves.
    pub explicit: bool,
}
