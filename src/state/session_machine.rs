use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// Lifecycle phases of the recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No match is loaded; setup or load may start one.
    Idle,
    /// A match owned by the operator is being recorded.
    Recording,
    /// A loaded match is being viewed read-only.
    Replay,
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Setup completed; recording starts on a fresh match.
    SetupCompleted,
    /// A match was fetched from the remote store.
    Loaded {
        /// Loaded for editing rather than viewing.
        as_owner: bool,
    },
    /// A local snapshot was restored at startup.
    Restored {
        /// The restored match is a read-only replay.
        read_only: bool,
    },
    /// New match / return home: drop the current match.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// Version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the machine is currently in.
    pub from: SessionPhase,
    /// Phase the machine will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSnapshot {
    /// Current phase.
    pub phase: SessionPhase,
    /// Version number (increments on each transition).
    pub version: usize,
    /// Target phase of a planned but not yet applied transition.
    pub pending: Option<SessionPhase>,
}

/// Session lifecycle: Idle → Recording/Replay → Idle.
///
/// Transitions that depend on remote work are planned first, then applied
/// once the work succeeded or aborted when it failed, so a failed load never
/// leaves the session half-switched.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Create a snapshot of the current state.
    pub fn snapshot(&self) -> PhaseSnapshot {
        PhaseSnapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate that `event` can be applied and reserve the transition.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, returning the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Idle, SessionEvent::SetupCompleted) => SessionPhase::Recording,
            (_, SessionEvent::Loaded { as_owner: true }) => SessionPhase::Recording,
            (_, SessionEvent::Loaded { as_owner: false }) => SessionPhase::Replay,
            (SessionPhase::Idle, SessionEvent::Restored { read_only: false }) => {
                SessionPhase::Recording
            }
            (SessionPhase::Idle, SessionEvent::Restored { read_only: true }) => {
                SessionPhase::Replay
            }
            (SessionPhase::Recording | SessionPhase::Replay, SessionEvent::Reset) => {
                SessionPhase::Idle
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Idle);
    }

    #[test]
    fn record_then_reset() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(
            apply(&mut sm, SessionEvent::SetupCompleted),
            SessionPhase::Recording
        );
        assert_eq!(apply(&mut sm, SessionEvent::Reset), SessionPhase::Idle);
        assert_eq!(sm.snapshot().version, 2);
    }

    #[test]
    fn loading_picks_phase_from_ownership() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(
            apply(&mut sm, SessionEvent::Loaded { as_owner: false }),
            SessionPhase::Replay
        );
        assert_eq!(
            apply(&mut sm, SessionEvent::Loaded { as_owner: true }),
            SessionPhase::Recording
        );
    }

    #[test]
    fn setup_requires_idle() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::SetupCompleted);
        let err = sm.plan(SessionEvent::SetupCompleted).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, SessionPhase::Recording);
                assert_eq!(invalid.event, SessionEvent::SetupCompleted);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reset_from_idle_is_invalid() {
        let mut sm = SessionStateMachine::new();
        assert!(matches!(
            sm.plan(SessionEvent::Reset),
            Err(PlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn second_plan_while_pending_is_rejected() {
        let mut sm = SessionStateMachine::new();
        sm.plan(SessionEvent::SetupCompleted).unwrap();
        assert_eq!(
            sm.plan(SessionEvent::Loaded { as_owner: true }).unwrap_err(),
            PlanError::AlreadyPending
        );
    }

    #[test]
    fn abort_leaves_phase_untouched() {
        let mut sm = SessionStateMachine::new();
        let plan = sm.plan(SessionEvent::Loaded { as_owner: false }).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), SessionPhase::Idle);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn apply_with_foreign_plan_id_keeps_pending() {
        let mut sm = SessionStateMachine::new();
        sm.plan(SessionEvent::SetupCompleted).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.snapshot().pending, Some(SessionPhase::Recording));
    }
}
