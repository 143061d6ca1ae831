pub mod aggregate;
pub mod match_state;
pub mod reducer;
pub mod session_machine;
mod sse;
pub mod streak;

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockWriteGuard, watch};
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{
        match_store::MatchStore,
        snapshot::{FileSnapshotSlot, LocalSnapshotStore, MemorySnapshotSlot, SnapshotSlot},
    },
    error::ServiceError,
    services::autosave::AutosaveTimer,
    state::{match_state::MatchState, session_machine::SessionPhase},
};

pub use self::session_machine::{AbortError, ApplyError, PhaseSnapshot, Plan, PlanError, PlanId};
pub use self::sse::SseHub;
use self::session_machine::{SessionEvent, SessionStateMachine};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of the most recent remote save attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing was saved during this session.
    #[default]
    Idle,
    /// A save is in flight.
    Saving,
    /// The last save succeeded.
    Saved {
        /// Completion time.
        at: SystemTime,
    },
    /// The last save failed; retrying is allowed.
    Failed {
        /// Backend error message.
        message: String,
    },
}

/// Central application state: the live match, its lifecycle and the storage handles.
pub struct AppState {
    config: AppConfig,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    snapshots: LocalSnapshotStore,
    sse: SseHub,
    session: RwLock<SessionStateMachine>,
    current_match: RwLock<Option<MatchState>>,
    sync_status: RwLock<SyncStatus>,
    autosave: AutosaveTimer,
    degraded: watch::Sender<bool>,
    transition_gate: Mutex<()>,
    sync_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The snapshot slot follows `config.snapshot_path`. The application
    /// starts in degraded mode until a match store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let slot: Arc<dyn SnapshotSlot> = match &config.snapshot_path {
            Some(path) => Arc::new(FileSnapshotSlot::new(path)),
            None => Arc::new(MemorySnapshotSlot::default()),
        };
        Self::with_snapshot_slot(config, slot)
    }

    /// Same as [`AppState::new`] with an explicit snapshot slot.
    pub fn with_snapshot_slot(config: AppConfig, slot: Arc<dyn SnapshotSlot>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let snapshots = LocalSnapshotStore::new(slot, config.default_streaks);
        let autosave = AutosaveTimer::new(config.autosave_debounce);
        Arc::new(Self {
            config,
            match_store: RwLock::new(None),
            snapshots,
            sse: SseHub::default(),
            session: RwLock::new(SessionStateMachine::new()),
            current_match: RwLock::new(None),
            sync_status: RwLock::new(SyncStatus::Idle),
            autosave,
            degraded: degraded_tx,
            transition_gate: Mutex::new(()),
            sync_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current match store, or [`ServiceError::Degraded`] when none is
    /// installed or the installed one failed its health checks.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Local snapshot store mirroring the live match.
    pub fn snapshots(&self) -> &LocalSnapshotStore {
        &self.snapshots
    }

    /// Debounce timer for remote saves.
    pub fn autosave(&self) -> &AutosaveTimer {
        &self.autosave
    }

    /// Exclusive access to the live match. Every mutation goes through here.
    pub async fn lock_match(&self) -> RwLockWriteGuard<'_, Option<MatchState>> {
        self.current_match.write().await
    }

    /// Run `f` against the live match without blocking other readers.
    pub async fn read_match<R>(&self, f: impl FnOnce(Option<&MatchState>) -> R) -> R {
        let guard = self.current_match.read().await;
        f(guard.as_ref())
    }

    /// Outcome of the latest remote save.
    pub async fn sync_status(&self) -> SyncStatus {
        self.sync_status.read().await.clone()
    }

    /// Record the outcome of a remote save.
    pub async fn set_sync_status(&self, status: SyncStatus) {
        *self.sync_status.write().await = status;
    }

    /// Snapshot the current session phase.
    pub async fn session_phase(&self) -> SessionPhase {
        self.session.read().await.phase()
    }

    /// Snapshot of the session machine including any pending transition.
    pub async fn session_snapshot(&self) -> PhaseSnapshot {
        self.session.read().await.snapshot()
    }

    /// Serializes remote saves so an older record never overwrites a newer one.
    pub async fn lock_sync(&self) -> MutexGuard<'_, ()> {
        self.sync_gate.lock().await
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Plan a transition of the session state machine, returning the plan.
    async fn plan_transition(&self, event: SessionEvent) -> Result<Plan, PlanError> {
        let mut sm = self.session.write().await;
        sm.plan(event)
    }

    /// Apply the planned transition, returning the next phase.
    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let mut sm = self.session.write().await;
        sm.apply(plan_id)
    }

    /// Abort a planned transition of the session state machine.
    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.session.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run `work`, then apply the transition on success or
    /// abort it on failure or timeout.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: SessionEvent,
        work: F,
    ) -> Result<(T, SessionPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan { id: plan_id, .. } = self.plan_transition(event).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::match_store::MemoryMatchStore;

    fn state() -> SharedState {
        AppState::new(AppConfig::in_memory(Duration::from_secs(4)))
    }

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = state();
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_match_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_match_store(Arc::new(MemoryMatchStore::new()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
    }

    #[tokio::test]
    async fn failed_work_aborts_the_transition() {
        let state = state();
        let result: Result<((), SessionPhase), ServiceError> = state
            .run_transition(SessionEvent::SetupCompleted, || async {
                Err(ServiceError::Degraded)
            })
            .await;

        assert!(result.is_err());
        let snapshot = state.session_snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.pending, None);
    }

    #[tokio::test]
    async fn successful_work_applies_the_transition() {
        let state = state();
        let (value, phase) = state
            .run_transition(SessionEvent::SetupCompleted, || async { Ok(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(phase, SessionPhase::Recording);
        assert_eq!(state.session_phase().await, SessionPhase::Recording);
    }
}
