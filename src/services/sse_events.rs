use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        format_system_time,
        matches::MatchSummary,
        sse::{
            AutosaveFailedEvent, MatchUpdatedEvent, ServerEvent, StreakEvent, SyncSavedEvent,
            SystemStatus,
        },
    },
    state::{
        SharedState,
        match_state::MatchState,
        streak::{StreakKind, StreakNotification},
    },
};

const EVENT_MATCH_UPDATED: &str = "match.updated";
const EVENT_STREAK_HOT: &str = "streak.hot";
const EVENT_STREAK_COLD: &str = "streak.cold";
const EVENT_AUTOSAVE_FAILED: &str = "autosave.failed";
const EVENT_SYNC_SAVED: &str = "sync.saved";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast the live match after an applied change.
pub fn broadcast_match_updated(state: &SharedState, current: &MatchState) {
    let payload = MatchUpdatedEvent(MatchSummary::from(current));
    send_public_event(state, EVENT_MATCH_UPDATED, &payload);
}

/// Broadcast a hot or cold streak notification.
pub fn broadcast_streak(state: &SharedState, notification: &StreakNotification) {
    let event = match notification.kind {
        StreakKind::Hot => EVENT_STREAK_HOT,
        StreakKind::Cold => EVENT_STREAK_COLD,
    };
    send_public_event(state, event, &StreakEvent(notification.clone()));
}

/// Broadcast that a background save failed; recording carries on.
pub fn broadcast_autosave_failed(state: &SharedState, match_id: Uuid, message: &str) {
    let payload = AutosaveFailedEvent {
        match_id,
        message: message.to_string(),
    };
    send_public_event(state, EVENT_AUTOSAVE_FAILED, &payload);
}

/// Broadcast a completed save.
pub fn broadcast_sync_saved(
    state: &SharedState,
    match_id: Uuid,
    name: &str,
    saved_at: SystemTime,
    explicit: bool,
) {
    let payload = SyncSavedEvent {
        match_id,
        name: name.to_string(),
        saved_at: format_system_time(saved_at),
        explicit,
    };
    send_public_event(state, EVENT_SYNC_SAVED, &payload);
}

/// Broadcast the degraded flag of the storage layer.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_public_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::AppConfig, state::AppState, state::match_state::Period};

    #[tokio::test]
    async fn streak_events_are_named_by_kind() {
        let state = AppState::new(AppConfig::in_memory(Duration::from_secs(4)));
        let mut receiver = state.public_sse().subscribe();

        broadcast_streak(
            &state,
            &StreakNotification {
                kind: StreakKind::Cold,
                player: 7,
                name: "#7".into(),
                streak: 3,
                period: Period::SecondHalf,
                period_makes: 0,
                period_attempts: 3,
            },
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_STREAK_COLD));
        assert!(event.data.contains("\"kind\":\"cold\""));
    }
}
