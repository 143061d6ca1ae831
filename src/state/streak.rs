//! Edge-triggered hot/cold streak detection.

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::match_state::{
    Configuration, JerseyNumber, Period, PlayerStreakState, ShotOutcome,
};

/// Direction of a streak notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreakKind {
    /// Run of consecutive makes.
    Hot,
    /// Run of consecutive misses.
    Cold,
}

/// Notification emitted the moment a streak threshold is first crossed.
///
/// Built synchronously while the triggering event is applied so the figures
/// reflect the counters at that point even if delivery happens later.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StreakNotification {
    /// Hot or cold.
    pub kind: StreakKind,
    /// Player on the streak.
    pub player: JerseyNumber,
    /// Display name of the player.
    pub name: String,
    /// Length of the run when the notification fired.
    pub streak: u32,
    /// Period of the triggering event.
    pub period: Period,
    /// Player's makes in that period, including the triggering event.
    pub period_makes: u32,
    /// Player's attempts in that period, including the triggering event.
    pub period_attempts: u32,
}

/// Advance a player's streak state with one outcome.
///
/// Returns the new state and the kind of notification to emit, if any. A
/// notification only fires when the threshold is reached and the matching
/// flag is not already set; an opposite outcome clears the flag again.
pub fn advance(
    state: PlayerStreakState,
    outcome: ShotOutcome,
    config: &Configuration,
) -> (PlayerStreakState, Option<StreakKind>) {
    let mut next = state;
    match outcome {
        ShotOutcome::Made => {
            next.consecutive_makes = next.consecutive_makes.saturating_add(1);
            next.consecutive_misses = 0;
            next.cold_fired = false;
            if config.hot_streak_enabled
                && next.consecutive_makes >= config.hot_threshold
                && !next.hot_fired
            {
                next.hot_fired = true;
                return (next, Some(StreakKind::Hot));
            }
        }
        ShotOutcome::Missed => {
            next.consecutive_misses = next.consecutive_misses.saturating_add(1);
            next.consecutive_makes = 0;
            next.hot_fired = false;
            if config.cold_streak_enabled
                && next.consecutive_misses >= config.cold_threshold
                && !next.cold_fired
            {
                next.cold_fired = true;
                return (next, Some(StreakKind::Cold));
            }
        }
    }
    (next, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(outcomes: &[ShotOutcome], config: &Configuration) -> Vec<Option<StreakKind>> {
        let mut state = PlayerStreakState::default();
        outcomes
            .iter()
            .map(|outcome| {
                let (next, fired) = advance(state, *outcome, config);
                state = next;
                fired
            })
            .collect()
    }

    #[test]
    fn hot_fires_once_at_threshold() {
        use ShotOutcome::*;
        let fired = run(&[Made, Made, Made, Made], &Configuration::default());
        assert_eq!(fired, vec![None, None, Some(StreakKind::Hot), None]);
    }

    #[test]
    fn a_miss_rearms_hot_notifications() {
        use ShotOutcome::*;
        let fired = run(
            &[Made, Made, Made, Missed, Made, Made, Made],
            &Configuration::default(),
        );
        let hot = fired
            .iter()
            .filter(|kind| **kind == Some(StreakKind::Hot))
            .count();
        assert_eq!(hot, 2);
    }

    #[test]
    fn cold_mirrors_hot() {
        use ShotOutcome::*;
        let config = Configuration {
            cold_threshold: 2,
            ..Configuration::default()
        };
        let fired = run(&[Missed, Missed, Missed, Made, Missed, Missed], &config);
        assert_eq!(
            fired,
            vec![
                None,
                Some(StreakKind::Cold),
                None,
                None,
                None,
                Some(StreakKind::Cold)
            ]
        );
    }

    #[test]
    fn disabled_streaks_never_fire() {
        use ShotOutcome::*;
        let config = Configuration {
            hot_streak_enabled: false,
            ..Configuration::default()
        };
        assert!(run(&[Made; 6], &config).iter().all(Option::is_none));
    }
}
