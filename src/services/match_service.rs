use tracing::{debug, info, warn};

use crate::{
    dto::{
        matches::{
            ActionResponse, CounterRequest, FeedEntry, MatchSummary, PeriodRequest, SetupRequest,
            ShotRequest,
        },
        stats::{FeedResponse, StatsQuery, StatsResponse},
    },
    error::ServiceError,
    services::{sse_events, sync_service},
    state::{
        SharedState, SyncStatus,
        aggregate::{activity_feed, match_view},
        match_state::{Actor, MatchState, Position, ShotOutcome},
        reducer::Outcome,
        session_machine::{SessionEvent, SessionPhase},
    },
};

/// Complete the setup of a new match and start recording it.
pub async fn start_match(
    state: &SharedState,
    request: SetupRequest,
) -> Result<MatchSummary, ServiceError> {
    let setup = request.into_setup(state.config().default_streaks);
    let players = setup.roster.len();
    let mode = setup.mode;

    let (summary, phase) = state
        .run_transition(SessionEvent::SetupCompleted, || async move {
            let fresh = MatchState::new(setup);
            let mut slot = state.lock_match().await;
            write_snapshot(state, &fresh);
            sse_events::broadcast_match_updated(state, &fresh);
            let summary = MatchSummary::from(&fresh);
            *slot = Some(fresh);
            Ok(summary)
        })
        .await?;

    state.set_sync_status(SyncStatus::Idle).await;
    info!(players, ?mode, ?phase, "match setup completed");
    Ok(summary)
}

/// Summary of the live match.
pub async fn current_match(state: &SharedState) -> Result<MatchSummary, ServiceError> {
    state
        .read_match(|current| current.map(MatchSummary::from))
        .await
        .ok_or(ServiceError::NoActiveMatch)
}

/// Increment a tallied statistic of a player or of the team.
pub async fn record_counter(
    state: &SharedState,
    request: CounterRequest,
) -> Result<ActionResponse, ServiceError> {
    let actor = request
        .actor
        .parse::<Actor>()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let delta = request.delta.unwrap_or(1);

    commit(state, |current| {
        current.record_counter(actor, request.stat, delta)
    })
    .await
}

/// Chart a shot at the given court position.
pub async fn record_shot(
    state: &SharedState,
    request: ShotRequest,
) -> Result<ActionResponse, ServiceError> {
    let position = Position {
        x: request.x,
        y: request.y,
    };
    let outcome = if request.made {
        ShotOutcome::Made
    } else {
        ShotOutcome::Missed
    };

    commit(state, |current| {
        current.record_shot(request.player, position, outcome)
    })
    .await
}

/// Revert the most recent action.
pub async fn undo(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    commit(state, MatchState::undo).await
}

/// Re-apply the most recently undone action.
pub async fn redo(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    commit(state, MatchState::redo).await
}

/// Move recording to another period.
pub async fn set_period(
    state: &SharedState,
    request: PeriodRequest,
) -> Result<ActionResponse, ServiceError> {
    commit(state, |current| current.set_period(request.period)).await
}

/// Derived statistics of the live match.
pub async fn stats(state: &SharedState, query: StatsQuery) -> Result<StatsResponse, ServiceError> {
    let filter = query.period.into();
    state
        .read_match(|current| {
            current.map(|current| StatsResponse::new(current, &match_view(current, filter)))
        })
        .await
        .ok_or(ServiceError::NoActiveMatch)
}

/// Human readable activity feed of the live match.
pub async fn feed(state: &SharedState) -> Result<FeedResponse, ServiceError> {
    state
        .read_match(|current| {
            current.map(|current| FeedResponse {
                entries: activity_feed(current)
                    .into_iter()
                    .map(FeedEntry::from)
                    .collect(),
            })
        })
        .await
        .ok_or(ServiceError::NoActiveMatch)
}

/// Drop the live match and return to idle.
pub async fn reset_match(state: &SharedState) -> Result<(), ServiceError> {
    let ((), phase) = state
        .run_transition(SessionEvent::Reset, || async {
            state.autosave().cancel();
            let mut slot = state.lock_match().await;
            slot.take();
            if let Err(err) = state.snapshots().clear() {
                warn!(error = %err, "failed to clear local snapshot");
            }
            Ok(())
        })
        .await?;

    state.set_sync_status(SyncStatus::Idle).await;
    info!(?phase, "match reset");
    Ok(())
}

/// Resume the match mirrored in the local snapshot, if any.
///
/// An unreadable snapshot is logged and ignored so the session starts idle.
pub async fn restore_snapshot(state: &SharedState) -> Result<Option<SessionPhase>, ServiceError> {
    let restored = match state.snapshots().load() {
        Ok(Some(restored)) => restored,
        Ok(None) => {
            info!("no local snapshot; starting idle");
            return Ok(None);
        }
        Err(err) => {
            warn!(error = %err, "discarding unreadable local snapshot; starting idle");
            return Ok(None);
        }
    };

    let read_only = restored.read_only;
    let remote_id = restored.remote_id;
    let ((), phase) = state
        .run_transition(SessionEvent::Restored { read_only }, || async move {
            let mut slot = state.lock_match().await;
            *slot = Some(restored);
            Ok(())
        })
        .await?;

    info!(?phase, ?remote_id, "restored match from local snapshot");
    Ok(Some(phase))
}

/// Apply `action` to the live match under the write lock, then mirror,
/// schedule and broadcast the change when it was applied.
async fn commit<F>(state: &SharedState, action: F) -> Result<ActionResponse, ServiceError>
where
    F: FnOnce(&mut MatchState) -> Outcome,
{
    let mut slot = state.lock_match().await;
    let current = slot.as_mut().ok_or(ServiceError::NoActiveMatch)?;

    let outcome = action(current);
    match &outcome {
        Outcome::Applied { notification } => {
            write_snapshot(state, current);
            if current.autosave_eligible() {
                sync_service::schedule_autosave(state);
            }
            sse_events::broadcast_match_updated(state, current);
            if let Some(notification) = notification {
                info!(
                    player = notification.player,
                    kind = ?notification.kind,
                    streak = notification.streak,
                    "streak threshold reached"
                );
                sse_events::broadcast_streak(state, notification);
            }
        }
        Outcome::Ignored(reason) => debug!(?reason, "action ignored"),
    }

    Ok(ActionResponse::new(outcome, current))
}

/// Mirror `current` into the local snapshot; failures never abort recording.
pub(crate) fn write_snapshot(state: &SharedState, current: &MatchState) {
    if let Err(err) = state.snapshots().save(current) {
        warn!(error = %err, "failed to write local snapshot");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::snapshot::{MemorySnapshotSlot, SnapshotSlot},
        dto::matches::RosterEntryInput,
        state::{
            AppState,
            match_state::{ModeKind, Period, StatKind},
            reducer::IgnoreReason,
            streak::StreakKind,
        },
    };

    fn test_state() -> (SharedState, Arc<MemorySnapshotSlot>) {
        let slot = Arc::new(MemorySnapshotSlot::default());
        let state = AppState::with_snapshot_slot(
            AppConfig::in_memory(Duration::from_secs(4)),
            slot.clone(),
        );
        (state, slot)
    }

    fn setup(mode: ModeKind) -> SetupRequest {
        SetupRequest {
            roster: [4, 7]
                .into_iter()
                .map(|number| RosterEntryInput { number, name: None })
                .collect(),
            mode,
            configuration: None,
        }
    }

    fn goal(actor: &str) -> CounterRequest {
        CounterRequest {
            actor: actor.into(),
            stat: StatKind::Goals,
            delta: None,
        }
    }

    #[tokio::test]
    async fn mutations_require_an_active_match() {
        let (state, _) = test_state();
        assert!(matches!(
            record_counter(&state, goal("4")).await,
            Err(ServiceError::NoActiveMatch)
        ));
        assert!(matches!(
            current_match(&state).await,
            Err(ServiceError::NoActiveMatch)
        ));
    }

    #[tokio::test]
    async fn three_goals_fire_one_hot_notification() {
        let (state, _) = test_state();
        let mut events = state.public_sse().subscribe();
        start_match(&state, setup(ModeKind::TallySheet)).await.unwrap();
        assert_eq!(state.session_phase().await, SessionPhase::Recording);

        let mut notifications = Vec::new();
        for _ in 0..3 {
            let response = record_counter(&state, goal("4")).await.unwrap();
            assert!(response.applied);
            notifications.extend(response.notification);
        }

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, StreakKind::Hot);
        assert_eq!(notifications[0].streak, 3);

        let stats = stats(&state, StatsQuery::default()).await.unwrap();
        assert_eq!(stats.team.combined.counters[&StatKind::Goals], 3);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.extend(event.event);
        }
        assert_eq!(names.iter().filter(|name| *name == "streak.hot").count(), 1);
        assert_eq!(
            names.iter().filter(|name| *name == "match.updated").count(),
            4
        );
    }

    #[tokio::test]
    async fn every_change_is_mirrored_to_the_snapshot() {
        let (state, slot) = test_state();
        start_match(&state, setup(ModeKind::ShotChart)).await.unwrap();
        record_shot(
            &state,
            ShotRequest {
                player: 7,
                x: 50.0,
                y: 10.0,
                made: true,
            },
        )
        .await
        .unwrap();

        let restored = state.snapshots().load().unwrap().unwrap();
        assert_eq!(restored.shots().len(), 1);
        assert_eq!(restored.shots()[0].points, 3);
        assert!(slot.read().unwrap().is_some());
    }

    #[tokio::test]
    async fn ignored_actions_report_their_reason() {
        let (state, _) = test_state();
        start_match(&state, setup(ModeKind::TallySheet)).await.unwrap();

        let response = undo(&state).await.unwrap();
        assert!(!response.applied);
        assert_eq!(response.ignored, Some(IgnoreReason::NothingToUndo));

        let response = record_counter(&state, goal("99")).await.unwrap();
        assert_eq!(response.ignored, Some(IgnoreReason::InvalidActor));
    }

    #[tokio::test]
    async fn period_switch_scopes_new_counters() {
        let (state, _) = test_state();
        start_match(&state, setup(ModeKind::TallySheet)).await.unwrap();
        record_counter(&state, goal("4")).await.unwrap();
        set_period(
            &state,
            PeriodRequest {
                period: Period::SecondHalf,
            },
        )
        .await
        .unwrap();
        record_counter(&state, goal("4")).await.unwrap();

        let second = stats(
            &state,
            StatsQuery {
                period: Some(Period::SecondHalf),
            },
        )
        .await
        .unwrap();
        assert_eq!(second.players[0].line.makes, 1);

        let all = stats(&state, StatsQuery::default()).await.unwrap();
        assert_eq!(all.players[0].line.makes, 2);
    }

    #[tokio::test]
    async fn reset_clears_match_and_snapshot() {
        let (state, slot) = test_state();
        start_match(&state, setup(ModeKind::TallySheet)).await.unwrap();
        reset_match(&state).await.unwrap();

        assert_eq!(state.session_phase().await, SessionPhase::Idle);
        assert!(slot.read().unwrap().is_none());
        assert!(matches!(
            feed(&state).await,
            Err(ServiceError::NoActiveMatch)
        ));
    }

    #[tokio::test]
    async fn setup_is_rejected_while_recording() {
        let (state, _) = test_state();
        start_match(&state, setup(ModeKind::TallySheet)).await.unwrap();
        assert!(matches!(
            start_match(&state, setup(ModeKind::ShotChart)).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_is_restored_on_startup() {
        let (state, slot) = test_state();
        start_match(&state, setup(ModeKind::TallySheet)).await.unwrap();
        let recovery = CounterRequest {
            actor: "team".into(),
            stat: StatKind::Recoveries,
            delta: None,
        };
        assert!(record_counter(&state, recovery).await.unwrap().applied);

        let payload = slot.read().unwrap().unwrap();
        let restarted = AppState::with_snapshot_slot(
            AppConfig::in_memory(Duration::from_secs(4)),
            Arc::new(MemorySnapshotSlot::with_contents(payload)),
        );
        let phase = restore_snapshot(&restarted).await.unwrap();

        assert_eq!(phase, Some(SessionPhase::Recording));
        let summary = current_match(&restarted).await.unwrap();
        assert!(summary.can_undo);
        assert_eq!(feed(&restarted).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_idle() {
        let state = AppState::with_snapshot_slot(
            AppConfig::in_memory(Duration::from_secs(4)),
            Arc::new(MemorySnapshotSlot::with_contents("[]")),
        );
        assert_eq!(restore_snapshot(&state).await.unwrap(), None);
        assert_eq!(state.session_phase().await, SessionPhase::Idle);
    }
}
