use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        match_store::{fetch_record, save_record},
        models::MatchRecordEntity,
    },
    dto::matches::{LoadQuery, MatchSummary, SaveRequest, SaveResponse, SavedMatchItem},
    error::ServiceError,
    services::{match_service::write_snapshot, sse_events},
    state::{SharedState, SyncStatus, session_machine::SessionEvent},
};

/// How a save surfaces failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// User initiated: errors are returned to the caller.
    Explicit,
    /// Debounced background save: errors are logged and broadcast.
    Silent,
}

/// Save the live match under `request.name`, assigning a remote id on first save.
pub async fn save_match(
    state: &SharedState,
    request: SaveRequest,
) -> Result<SaveResponse, ServiceError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "match name must not be empty".into(),
        ));
    }

    persist_match(state, SaveMode::Explicit, Some(name.to_string()))
        .await?
        .ok_or_else(|| ServiceError::InvalidState("match was not saved".into()))
}

/// Debounced save run by the autosave timer.
///
/// Failures are already logged and broadcast by [`persist_match`].
pub async fn autosave(state: &SharedState) {
    match persist_match(state, SaveMode::Silent, None).await {
        Ok(Some(saved)) => debug!(id = %saved.id, "autosave completed"),
        Ok(None) => debug!("autosave skipped; match not eligible"),
        Err(err) => debug!(error = %err, "autosave did not complete"),
    }
}

/// Restart the autosave quiet period for the live match.
///
/// The pending save only holds a weak handle so dropping the application
/// state also drops the timer.
pub fn schedule_autosave(state: &SharedState) {
    let weak = Arc::downgrade(state);
    state.autosave().arm(async move {
        if let Some(state) = weak.upgrade() {
            autosave(&state).await;
        }
    });
}

/// Write the live match to the remote store.
///
/// Explicit saves name the match and assign its remote id when missing.
/// Silent saves only run for matches that were saved before and are not
/// read-only; they return `Ok(None)` otherwise. Saves are serialized so the
/// record written last is always the most recent one. Once a save is under
/// way every failure is recorded in the sync status.
pub async fn persist_match(
    state: &SharedState,
    mode: SaveMode,
    name: Option<String>,
) -> Result<Option<SaveResponse>, ServiceError> {
    let _sync = state.lock_sync().await;

    let (match_id, record) = {
        let mut slot = state.lock_match().await;
        let current = slot.as_mut().ok_or(ServiceError::NoActiveMatch)?;

        match mode {
            SaveMode::Explicit => {
                if current.read_only {
                    return Err(ServiceError::InvalidState(
                        "a read-only replay cannot be saved".into(),
                    ));
                }
                if current.remote_id.is_none() {
                    current.remote_id = Some(Uuid::new_v4());
                }
                if name.is_some() {
                    current.name = name;
                }
                write_snapshot(state, current);
            }
            SaveMode::Silent => {
                if !current.autosave_eligible() {
                    return Ok(None);
                }
            }
        }

        (
            current.remote_id,
            MatchRecordEntity::from_state(current, SystemTime::now()),
        )
    };

    let outcome = match record {
        Ok(record) => store_record(state, mode, record).await,
        Err(err) => Err(err.into()),
    };

    match outcome {
        Ok(saved) => Ok(Some(saved)),
        Err(err) => {
            let message = err.to_string();
            state
                .set_sync_status(SyncStatus::Failed {
                    message: message.clone(),
                })
                .await;
            match mode {
                SaveMode::Explicit => warn!(?match_id, error = %err, "match save failed"),
                SaveMode::Silent => {
                    warn!(?match_id, error = %err, "autosave failed; recording continues");
                    if let Some(id) = match_id {
                        sse_events::broadcast_autosave_failed(state, id, &message);
                    }
                }
            }
            Err(err)
        }
    }
}

async fn store_record(
    state: &SharedState,
    mode: SaveMode,
    record: MatchRecordEntity,
) -> Result<SaveResponse, ServiceError> {
    let store = state.require_match_store().await?;

    let id = record.header.id;
    let saved_name = record.header.name.clone();
    let saved_at = record.header.updated_at;
    let (shots, tallies) = (record.shots.len(), record.tallies.len());
    state.set_sync_status(SyncStatus::Saving).await;

    save_record(store.as_ref(), record).await?;

    state
        .set_sync_status(SyncStatus::Saved { at: saved_at })
        .await;
    info!(%id, ?mode, shots, tallies, "match saved");
    sse_events::broadcast_sync_saved(state, id, &saved_name, saved_at, mode == SaveMode::Explicit);
    Ok(SaveResponse::new(id, saved_name, saved_at))
}

/// Replace the live match with a saved one.
///
/// Non-owners get a read-only replay and bump the view counter. A failed
/// fetch aborts the session transition and keeps the previous match.
pub async fn load_match(
    state: &SharedState,
    id: Uuid,
    query: LoadQuery,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_match_store().await?;
    let as_owner = query.as_owner;

    let (summary, phase) = state
        .run_transition(SessionEvent::Loaded { as_owner }, || async {
            let record = fetch_record(store.as_ref(), id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("match `{id}` not found")))?;
            let mut loaded = record.into_state(!as_owner)?;
            if !as_owner {
                loaded.view_count = store.increment_views(id).await?;
            }

            state.autosave().cancel();
            let mut slot = state.lock_match().await;
            write_snapshot(state, &loaded);
            sse_events::broadcast_match_updated(state, &loaded);
            let summary = MatchSummary::from(&loaded);
            *slot = Some(loaded);
            Ok(summary)
        })
        .await?;

    state.set_sync_status(SyncStatus::Idle).await;
    info!(%id, as_owner, ?phase, "match loaded");
    Ok(summary)
}

/// Saved matches, most recently updated first.
pub async fn list_matches(state: &SharedState) -> Result<Vec<SavedMatchItem>, ServiceError> {
    let store = state.require_match_store().await?;
    let headers = store.list_headers().await?;
    Ok(headers.into_iter().map(SavedMatchItem::from).collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::{MatchStore, MemoryMatchStore},
        dto::matches::{CounterRequest, RosterEntryInput, SetupRequest, ShotRequest},
        services::match_service,
        state::{
            AppState,
            match_state::{ModeKind, StatKind},
            reducer::IgnoreReason,
            session_machine::SessionPhase,
        },
    };

    async fn recording(mode: ModeKind) -> (SharedState, MemoryMatchStore) {
        let state = AppState::new(AppConfig::in_memory(Duration::from_secs(4)));
        let store = MemoryMatchStore::new();
        state.install_match_store(Arc::new(store.clone())).await;
        match_service::start_match(
            &state,
            SetupRequest {
                roster: [4, 7]
                    .into_iter()
                    .map(|number| RosterEntryInput { number, name: None })
                    .collect(),
                mode,
                configuration: None,
            },
        )
        .await
        .unwrap();
        (state, store)
    }

    fn save(name: &str) -> SaveRequest {
        SaveRequest { name: name.into() }
    }

    fn shot(player: u16, made: bool) -> ShotRequest {
        ShotRequest {
            player,
            x: 40.0,
            y: 60.0,
            made,
        }
    }

    fn rebound(actor: &str) -> CounterRequest {
        CounterRequest {
            actor: actor.into(),
            stat: StatKind::Rebounds,
            delta: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_period_collapses_bursts_into_one_save() {
        let (state, store) = recording(ModeKind::TallySheet).await;
        save_match(&state, save("League day 3")).await.unwrap();
        assert_eq!(store.header_writes(), 1);

        for _ in 0..3 {
            match_service::record_counter(&state, rebound("7"))
                .await
                .unwrap();
            sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(store.header_writes(), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(store.header_writes(), 2);
        assert!(matches!(state.sync_status().await, SyncStatus::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn unsaved_matches_never_autosave() {
        let (state, store) = recording(ModeKind::TallySheet).await;
        match_service::record_counter(&state, rebound("4"))
            .await
            .unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(store.header_writes(), 0);
        assert!(!state.autosave().is_pending());
    }

    #[tokio::test]
    async fn remote_rows_mirror_the_in_memory_shots() {
        let (state, store) = recording(ModeKind::ShotChart).await;
        for made in [true, false, true, true, false] {
            match_service::record_shot(&state, shot(4, made))
                .await
                .unwrap();
        }
        let saved = save_match(&state, save("Scrimmage")).await.unwrap();

        match_service::undo(&state).await.unwrap();
        match_service::undo(&state).await.unwrap();
        match_service::record_shot(&state, shot(7, true))
            .await
            .unwrap();
        save_match(&state, save("Scrimmage")).await.unwrap();

        let remote = store.find_shots(saved.id).await.unwrap();
        let local = state
            .read_match(|current| current.map(|m| m.shots().to_vec()))
            .await
            .unwrap();
        assert_eq!(remote.len(), 4);
        assert_eq!(
            remote.iter().map(|row| row.shot_id).collect::<Vec<_>>(),
            local.iter().map(|shot| shot.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn failed_save_is_reported_and_retryable() {
        let (state, store) = recording(ModeKind::TallySheet).await;
        store.set_offline(true);

        let err = save_match(&state, save("Cup final")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(matches!(
            state.sync_status().await,
            SyncStatus::Failed { .. }
        ));

        store.set_offline(false);
        let saved = save_match(&state, save("Cup final")).await.unwrap();
        assert_eq!(store.header_writes(), 1);
        assert_eq!(saved.name, "Cup final");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_autosave_is_broadcast_without_interrupting() {
        let (state, store) = recording(ModeKind::TallySheet).await;
        save_match(&state, save("Friendly")).await.unwrap();
        let mut events = state.public_sse().subscribe();

        store.set_offline(true);
        match_service::record_counter(&state, rebound("4"))
            .await
            .unwrap();
        sleep(Duration::from_secs(5)).await;

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.extend(event.event);
        }
        assert!(names.iter().any(|name| name == "autosave.failed"));
        assert!(
            match_service::record_counter(&state, rebound("4"))
                .await
                .unwrap()
                .applied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_while_degraded_is_reported() {
        let (state, _store) = recording(ModeKind::TallySheet).await;
        save_match(&state, save("Friendly")).await.unwrap();
        let mut events = state.public_sse().subscribe();

        state.clear_match_store().await;
        match_service::record_counter(&state, rebound("7"))
            .await
            .unwrap();
        sleep(Duration::from_secs(5)).await;

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.extend(event.event);
        }
        assert!(names.iter().any(|name| name == "autosave.failed"));
        assert!(matches!(
            state.sync_status().await,
            SyncStatus::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn owner_saves_keep_views_added_by_viewers() {
        let (owner, store) = recording(ModeKind::TallySheet).await;
        let saved = save_match(&owner, save("Derby")).await.unwrap();

        let viewer = AppState::new(AppConfig::in_memory(Duration::from_secs(4)));
        viewer.install_match_store(Arc::new(store.clone())).await;
        for _ in 0..2 {
            load_match(&viewer, saved.id, LoadQuery { as_owner: false })
                .await
                .unwrap();
        }

        match_service::record_counter(&owner, rebound("4"))
            .await
            .unwrap();
        save_match(&owner, save("Derby")).await.unwrap();

        let header = store.find_header(saved.id).await.unwrap().unwrap();
        assert_eq!(header.view_count, 2);
        assert_eq!(store.header_writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_autosave_does_not_keep_the_state_alive() {
        let (state, _store) = recording(ModeKind::TallySheet).await;
        save_match(&state, save("Friendly")).await.unwrap();
        match_service::record_counter(&state, rebound("4"))
            .await
            .unwrap();
        assert!(state.autosave().is_pending());

        let weak = Arc::downgrade(&state);
        drop(state);
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn viewers_get_a_read_only_replay() {
        let (state, store) = recording(ModeKind::TallySheet).await;
        match_service::record_counter(&state, rebound("4"))
            .await
            .unwrap();
        let saved = save_match(&state, save("Derby")).await.unwrap();

        let summary = load_match(&state, saved.id, LoadQuery { as_owner: false })
            .await
            .unwrap();
        assert!(summary.read_only);
        assert_eq!(summary.view_count, 1);
        assert_eq!(state.session_phase().await, SessionPhase::Replay);

        let response = match_service::record_counter(&state, rebound("4"))
            .await
            .unwrap();
        assert_eq!(response.ignored, Some(IgnoreReason::ReadOnly));
        assert!(matches!(
            save_match(&state, save("Derby")).await,
            Err(ServiceError::InvalidState(_))
        ));

        let stats = match_service::stats(&state, Default::default())
            .await
            .unwrap();
        assert_eq!(stats.players[0].line.counters[&StatKind::Rebounds], 1);
        assert_eq!(store.list_headers().await.unwrap()[0].view_count, 1);
    }

    #[tokio::test]
    async fn owners_resume_recording_without_bumping_views() {
        let (state, _store) = recording(ModeKind::TallySheet).await;
        let saved = save_match(&state, save("Derby")).await.unwrap();

        let summary = load_match(&state, saved.id, LoadQuery { as_owner: true })
            .await
            .unwrap();
        assert!(!summary.read_only);
        assert_eq!(summary.view_count, 0);
        assert_eq!(state.session_phase().await, SessionPhase::Recording);
    }

    #[tokio::test]
    async fn failed_load_keeps_the_current_match() {
        let (state, _store) = recording(ModeKind::TallySheet).await;
        match_service::record_counter(&state, rebound("7"))
            .await
            .unwrap();

        let err = load_match(&state, Uuid::new_v4(), LoadQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(state.session_phase().await, SessionPhase::Recording);
        assert_eq!(state.session_snapshot().await.pending, None);

        let summary = match_service::current_match(&state).await.unwrap();
        assert_eq!(summary.log_length, 1);
    }

    #[tokio::test]
    async fn degraded_mode_rejects_remote_operations() {
        let state = AppState::new(AppConfig::in_memory(Duration::from_secs(4)));
        assert!(matches!(
            list_matches(&state).await,
            Err(ServiceError::Degraded)
        ));
    }
}
