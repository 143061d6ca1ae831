//! Forward actions, undo and redo over a [`MatchState`].
//!
//! Every entry point is infallible: it either applies and returns
//! [`Outcome::Applied`], or leaves the state untouched and reports why through
//! [`Outcome::Ignored`].

use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{
    aggregate::{self, PeriodFilter, shot_points},
    match_state::{
        ActionEvent, Actor, GameMode, JerseyNumber, LogEntry, MatchState, Period, PlayerStreakState,
        Position, Shot, ShotOutcome, StatKind, StreakTransition,
    },
    streak::{self, StreakKind, StreakNotification},
};

/// Why an action left the state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The match is a read-only replay.
    ReadOnly,
    /// The event log is empty.
    NothingToUndo,
    /// The redo stack is empty.
    NothingToRedo,
    /// The action does not belong to the match's recording mode.
    WrongMode,
    /// The actor is not on the roster or cannot carry this statistic.
    InvalidActor,
    /// A zero delta would not change anything.
    ZeroDelta,
    /// The requested period is already current.
    SamePeriod,
}

/// Result of a reducer entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The state changed.
    Applied {
        /// Streak notification triggered by the action, if any.
        notification: Option<StreakNotification>,
    },
    /// The state was left unchanged.
    Ignored(IgnoreReason),
}

impl Outcome {
    const APPLIED: Outcome = Outcome::Applied { notification: None };

    /// Whether the state changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }

    /// Notification carried by an applied action.
    pub fn notification(&self) -> Option<&StreakNotification> {
        match self {
            Outcome::Applied { notification } => notification.as_ref(),
            Outcome::Ignored(_) => None,
        }
    }

    /// Reason an action was ignored.
    pub fn ignored(&self) -> Option<IgnoreReason> {
        match self {
            Outcome::Ignored(reason) => Some(*reason),
            Outcome::Applied { .. } => None,
        }
    }
}

impl MatchState {
    /// Add `delta` to a tally counter in the current period.
    ///
    /// Team-only statistics are always credited to [`Actor::Team`]. An
    /// outcome counter with `delta > 1` counts as that many consecutive
    /// outcomes for the streak detector; at most one notification fires.
    pub fn record_counter(&mut self, actor: Actor, stat: StatKind, delta: u32) -> Outcome {
        if self.read_only {
            return Outcome::Ignored(IgnoreReason::ReadOnly);
        }
        if !matches!(self.mode, GameMode::TallySheet { .. }) {
            return Outcome::Ignored(IgnoreReason::WrongMode);
        }
        if delta == 0 {
            return Outcome::Ignored(IgnoreReason::ZeroDelta);
        }

        let actor = if stat.is_team_only() {
            Actor::Team
        } else {
            actor
        };
        let valid = match actor {
            Actor::Team => stat.is_team_only(),
            Actor::Player(number) => self.is_rostered(number),
        };
        if !valid {
            return Outcome::Ignored(IgnoreReason::InvalidActor);
        }

        let event = ActionEvent::Counter {
            actor,
            period: self.period,
            stat,
            delta,
            at: SystemTime::now(),
        };
        self.commit(event)
    }

    /// Chart a shot by a rostered player in the current period.
    pub fn record_shot(
        &mut self,
        player: JerseyNumber,
        position: Position,
        outcome: ShotOutcome,
    ) -> Outcome {
        if self.read_only {
            return Outcome::Ignored(IgnoreReason::ReadOnly);
        }
        if !matches!(self.mode, GameMode::ShotChart { .. }) {
            return Outcome::Ignored(IgnoreReason::WrongMode);
        }
        if !self.is_rostered(player) {
            return Outcome::Ignored(IgnoreReason::InvalidActor);
        }

        let shot = Shot {
            id: self.next_shot_id(),
            actor: Actor::Player(player),
            period: self.period,
            position,
            outcome,
            points: shot_points(position, outcome),
            at: SystemTime::now(),
        };
        self.commit(ActionEvent::Shot(shot))
    }

    /// Revert the most recent action and move it onto the redo stack.
    pub fn undo(&mut self) -> Outcome {
        if self.read_only {
            return Outcome::Ignored(IgnoreReason::ReadOnly);
        }
        let Some(entry) = self.log.pop_front() else {
            return Outcome::Ignored(IgnoreReason::NothingToUndo);
        };

        self.reverse_effect(&entry.event);
        if let (Some(transition), Actor::Player(number)) = (entry.streak, entry.event.actor()) {
            self.streaks.insert(number, transition.before);
        }
        self.redo.push(entry);
        Outcome::APPLIED
    }

    /// Reapply the most recently undone action.
    ///
    /// The streak state is restored as it was after the original action; no
    /// notification is emitted a second time.
    pub fn redo(&mut self) -> Outcome {
        if self.read_only {
            return Outcome::Ignored(IgnoreReason::ReadOnly);
        }
        let Some(entry) = self.redo.pop() else {
            return Outcome::Ignored(IgnoreReason::NothingToRedo);
        };

        self.forward_effect(&entry.event);
        if let (Some(transition), Actor::Player(number)) = (entry.streak, entry.event.actor()) {
            self.streaks.insert(number, transition.after);
        }
        self.log.push_front(entry);
        Outcome::APPLIED
    }

    /// Switch the period new actions are recorded in.
    pub fn set_period(&mut self, period: Period) -> Outcome {
        if self.read_only {
            return Outcome::Ignored(IgnoreReason::ReadOnly);
        }
        if self.period == period {
            return Outcome::Ignored(IgnoreReason::SamePeriod);
        }
        self.period = period;
        Outcome::APPLIED
    }

    fn commit(&mut self, event: ActionEvent) -> Outcome {
        self.redo.clear();
        self.forward_effect(&event);

        let mut notification = None;
        let mut transition = None;
        if let (Some(outcome), Actor::Player(number)) = (event.outcome(), event.actor()) {
            let steps = match &event {
                ActionEvent::Counter { delta, .. } => *delta,
                ActionEvent::Shot(_) => 1,
            };
            let before = self.streak_of(number);
            let mut after = before;
            let mut fired = None;
            for _ in 0..steps {
                let (next, kind) = streak::advance(after, outcome, &self.config);
                after = next;
                fired = fired.or(kind);
            }
            self.streaks.insert(number, after);
            transition = Some(StreakTransition { before, after });
            notification = fired.map(|kind| self.notification(kind, number, &event, after));
        }

        self.log.push_front(LogEntry {
            event,
            streak: transition,
        });
        Outcome::Applied { notification }
    }

    fn notification(
        &self,
        kind: StreakKind,
        number: JerseyNumber,
        event: &ActionEvent,
        run: PlayerStreakState,
    ) -> StreakNotification {
        let line = aggregate::actor_line(
            self,
            Actor::Player(number),
            PeriodFilter::Single(event.period()),
        );
        StreakNotification {
            kind,
            player: number,
            name: self.display_name(Actor::Player(number)),
            streak: match kind {
                StreakKind::Hot => run.consecutive_makes,
                StreakKind::Cold => run.consecutive_misses,
            },
            period: event.period(),
            period_makes: line.makes,
            period_attempts: line.attempts,
        }
    }

    fn forward_effect(&mut self, event: &ActionEvent) {
        match (&mut self.mode, event) {
            (
                GameMode::TallySheet { tallies },
                ActionEvent::Counter {
                    actor,
                    period,
                    stat,
                    delta,
                    ..
                },
            ) => tallies.add(*actor, *period, *stat, *delta),
            (GameMode::ShotChart { shots }, ActionEvent::Shot(shot)) => shots.push(shot.clone()),
            _ => {}
        }
    }

    fn reverse_effect(&mut self, event: &ActionEvent) {
        match (&mut self.mode, event) {
            (
                GameMode::TallySheet { tallies },
                ActionEvent::Counter {
                    actor,
                    period,
                    stat,
                    delta,
                    ..
                },
            ) => tallies.subtract_clamped(*actor, *period, *stat, *delta),
            (GameMode::ShotChart { shots }, ActionEvent::Shot(shot)) => {
                if let Some(index) = shots.iter().rposition(|existing| existing.id == shot.id) {
                    shots.remove(index);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::state::match_state::{Configuration, MatchSetup, ModeKind};

    fn new_match(mode: ModeKind) -> MatchState {
        MatchState::new(MatchSetup {
            roster: vec![4, 7],
            names: IndexMap::from([(4, "Ana".to_string()), (7, "Bea".to_string())]),
            mode,
            config: Configuration::default(),
        })
    }

    fn goals(state: &MatchState, number: JerseyNumber) -> u32 {
        state
            .tallies()
            .unwrap()
            .get(Actor::Player(number), Period::FirstHalf, StatKind::Goals)
    }

    #[test]
    fn scenario_three_goals_fire_one_hot_notification() {
        let mut state = new_match(ModeKind::TallySheet);

        let outcomes: Vec<Outcome> = (0..3)
            .map(|_| state.record_counter(Actor::Player(4), StatKind::Goals, 1))
            .collect();

        assert_eq!(goals(&state, 4), 3);
        assert!(outcomes[0].notification().is_none());
        assert!(outcomes[1].notification().is_none());
        let hot = outcomes[2].notification().expect("hot notification");
        assert_eq!(hot.kind, StreakKind::Hot);
        assert_eq!(hot.player, 4);
        assert_eq!(hot.streak, 3);
        assert_eq!(hot.period_makes, 3);

        let totals = aggregate::team_totals(&state, PeriodFilter::Single(Period::FirstHalf));
        assert_eq!(totals.combined.counter(StatKind::Goals), 3);
    }

    #[test]
    fn fourth_make_is_silent_and_a_miss_rearms() {
        let mut state = new_match(ModeKind::TallySheet);
        for _ in 0..3 {
            state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        }
        let fourth = state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        assert!(fourth.notification().is_none());

        state.record_counter(Actor::Player(4), StatKind::Misses, 1);
        assert!(!state.streak_of(4).hot_fired);
        for _ in 0..2 {
            state.record_counter(Actor::Player(4), StatKind::Triples, 1);
        }
        let again = state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        assert_eq!(again.notification().map(|n| n.kind), Some(StreakKind::Hot));
    }

    #[test]
    fn bulk_counter_advances_the_streak_per_unit() {
        let mut state = new_match(ModeKind::TallySheet);

        let outcome = state.record_counter(Actor::Player(4), StatKind::Goals, 3);
        let hot = outcome.notification().expect("hot notification");
        assert_eq!(hot.streak, 3);
        assert_eq!(state.streak_of(4).consecutive_makes, 3);

        let more = state.record_counter(Actor::Player(4), StatKind::Goals, 2);
        assert!(more.notification().is_none());
        assert_eq!(state.streak_of(4).consecutive_makes, 5);

        state.undo();
        state.undo();
        assert_eq!(state.streak_of(4), PlayerStreakState::default());
    }

    #[test]
    fn undo_is_a_true_inverse() {
        let initial = new_match(ModeKind::TallySheet);
        let mut state = initial.clone();

        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.record_counter(Actor::Player(7), StatKind::Rebounds, 2);
        state.record_counter(Actor::Team, StatKind::Turnovers, 1);

        for _ in 0..5 {
            assert!(state.undo().is_applied());
        }

        assert_eq!(state.tallies(), initial.tallies());
        assert_eq!(state.streak_of(4), initial.streak_of(4));
        assert!(state.log.is_empty());
        assert_eq!(state.redo.len(), 5);
    }

    #[test]
    fn undo_then_redo_restores_the_forward_state() {
        let mut reference = new_match(ModeKind::TallySheet);
        reference.record_counter(Actor::Player(7), StatKind::Triples, 1);

        let mut state = new_match(ModeKind::TallySheet);
        state.record_counter(Actor::Player(7), StatKind::Triples, 1);
        state.undo();
        let redone = state.redo();

        assert_eq!(redone, Outcome::Applied { notification: None });
        assert_eq!(state.tallies(), reference.tallies());
        assert_eq!(state.streak_of(7), reference.streak_of(7));
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn new_action_after_undo_discards_redo() {
        let mut state = new_match(ModeKind::TallySheet);
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.undo();
        state.undo();
        state.record_counter(Actor::Player(7), StatKind::Assists, 1);

        assert_eq!(state.redo(), Outcome::Ignored(IgnoreReason::NothingToRedo));
        assert_eq!(goals(&state, 4), 0);
    }

    #[test]
    fn undo_on_empty_log_is_ignored() {
        let mut state = new_match(ModeKind::TallySheet);
        assert_eq!(state.undo(), Outcome::Ignored(IgnoreReason::NothingToUndo));
    }

    #[test]
    fn undo_clamps_at_zero() {
        let mut state = new_match(ModeKind::TallySheet);
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state
            .tallies_mut_for_test()
            .set(Actor::Player(4), Period::FirstHalf, StatKind::Goals, 0);

        assert!(state.undo().is_applied());
        assert_eq!(goals(&state, 4), 0);
    }

    #[test]
    fn undo_rolls_back_streak_flags() {
        let mut state = new_match(ModeKind::TallySheet);
        for _ in 0..3 {
            state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        }
        assert!(state.streak_of(4).hot_fired);

        state.undo();
        let streak = state.streak_of(4);
        assert!(!streak.hot_fired);
        assert_eq!(streak.consecutive_makes, 2);

        let refire = state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        assert!(refire.notification().is_some());
    }

    #[test]
    fn read_only_match_is_frozen() {
        let mut state = new_match(ModeKind::TallySheet);
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.undo();
        state.read_only = true;
        let frozen = state.clone();

        let outcomes = [
            state.record_counter(Actor::Player(4), StatKind::Goals, 1),
            state.record_shot(4, Position { x: 1.0, y: 1.0 }, ShotOutcome::Made),
            state.undo(),
            state.redo(),
            state.set_period(Period::SecondHalf),
        ];

        assert!(
            outcomes
                .iter()
                .all(|outcome| *outcome == Outcome::Ignored(IgnoreReason::ReadOnly))
        );
        assert_eq!(state, frozen);
    }

    #[test]
    fn team_only_stats_go_to_the_team_row() {
        let mut state = new_match(ModeKind::TallySheet);
        assert!(
            state
                .record_counter(Actor::Player(4), StatKind::Recoveries, 1)
                .is_applied()
        );
        let tallies = state.tallies().unwrap();
        assert_eq!(
            tallies.get(Actor::Team, Period::FirstHalf, StatKind::Recoveries),
            1
        );
        assert_eq!(
            tallies.get(Actor::Player(4), Period::FirstHalf, StatKind::Recoveries),
            0
        );
    }

    #[test]
    fn invalid_actions_are_skipped() {
        let mut state = new_match(ModeKind::TallySheet);
        assert_eq!(
            state.record_counter(Actor::Player(99), StatKind::Goals, 1),
            Outcome::Ignored(IgnoreReason::InvalidActor)
        );
        assert_eq!(
            state.record_counter(Actor::Team, StatKind::Goals, 1),
            Outcome::Ignored(IgnoreReason::InvalidActor)
        );
        assert_eq!(
            state.record_counter(Actor::Player(4), StatKind::Goals, 0),
            Outcome::Ignored(IgnoreReason::ZeroDelta)
        );
        assert_eq!(
            state.record_shot(4, Position { x: 1.0, y: 1.0 }, ShotOutcome::Made),
            Outcome::Ignored(IgnoreReason::WrongMode)
        );
        assert!(state.log.is_empty());
    }

    #[test]
    fn shot_undo_removes_the_shot() {
        let mut state = new_match(ModeKind::ShotChart);
        state.record_shot(4, Position { x: 10.0, y: 10.0 }, ShotOutcome::Made);
        state.record_shot(7, Position { x: 60.0, y: 60.0 }, ShotOutcome::Missed);

        state.undo();
        assert_eq!(state.shots().len(), 1);
        assert_eq!(state.shots()[0].points, 3);

        state.redo();
        assert_eq!(state.shots().len(), 2);
        assert_eq!(state.shots()[1].actor, Actor::Player(7));
        assert_eq!(
            state.record_counter(Actor::Player(4), StatKind::Goals, 1),
            Outcome::Ignored(IgnoreReason::WrongMode)
        );
    }

    impl MatchState {
        fn tallies_mut_for_test(&mut self) -> &mut crate::state::match_state::CounterSet {
            match &mut self.mode {
                GameMode::TallySheet { tallies } => tallies,
                GameMode::ShotChart { .. } => panic!("not a tally match"),
            }
        }
    }
}
