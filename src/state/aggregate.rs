//! Derived statistics computed on demand from a [`MatchState`].
//!
//! Nothing here is stored: every view is recomputed from the counters and the
//! shot list so exported figures can never drift from what is displayed.

use std::collections::BTreeMap;

use crate::state::match_state::{
    ActionEvent, Actor, JerseyNumber, MatchState, Period, Position, Shot, ShotOutcome, StatKind,
};

/// Vertical court coordinate separating three-point range (below) from
/// two-point range.
pub const ARC_THRESHOLD: f32 = 25.0;

/// Points scored by a made shot from `position`.
pub fn made_value(position: Position) -> u8 {
    if position.y < ARC_THRESHOLD { 3 } else { 2 }
}

/// Points contributed by a shot; misses are always worth nothing.
pub fn shot_points(position: Position, outcome: ShotOutcome) -> u8 {
    match outcome {
        ShotOutcome::Made => made_value(position),
        ShotOutcome::Missed => 0,
    }
}

/// Which periods a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodFilter {
    /// A single period.
    Single(Period),
    /// Sum over every period.
    All,
}

impl PeriodFilter {
    fn periods(self) -> Vec<Period> {
        match self {
            PeriodFilter::Single(period) => vec![period],
            PeriodFilter::All => Period::ALL.to_vec(),
        }
    }
}

impl From<Option<Period>> for PeriodFilter {
    fn from(value: Option<Period>) -> Self {
        value.map_or(PeriodFilter::All, PeriodFilter::Single)
    }
}

/// Derived figures for one actor (or a sum of actors).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatLine {
    /// Made plus missed attempts.
    pub attempts: u32,
    /// Made attempts.
    pub makes: u32,
    /// Points scored.
    pub points: u32,
    /// Raw counters by statistic.
    pub counters: BTreeMap<StatKind, u32>,
}

impl StatLine {
    /// Success rate in percent, 0 when nothing was attempted.
    pub fn percentage(&self) -> f32 {
        if self.attempts == 0 {
            0.0
        } else {
            self.makes as f32 * 100.0 / self.attempts as f32
        }
    }

    /// Value of a single raw counter.
    pub fn counter(&self, stat: StatKind) -> u32 {
        self.counters.get(&stat).copied().unwrap_or(0)
    }

    /// Add another line into this one.
    pub fn absorb(&mut self, other: &StatLine) {
        self.attempts += other.attempts;
        self.makes += other.makes;
        self.points += other.points;
        for (stat, value) in &other.counters {
            *self.counters.entry(*stat).or_insert(0) += value;
        }
    }

    fn add_counter(&mut self, stat: StatKind, value: u32) {
        *self.counters.entry(stat).or_insert(0) += value;
    }

    fn add_shot(&mut self, shot: &Shot) {
        self.attempts += 1;
        match shot.outcome {
            ShotOutcome::Made => {
                self.makes += 1;
                let value = made_value(shot.position);
                self.points += u32::from(value);
                let stat = if value == 3 {
                    StatKind::Triples
                } else {
                    StatKind::Goals
                };
                self.add_counter(stat, 1);
            }
            ShotOutcome::Missed => self.add_counter(StatKind::Misses, 1),
        }
    }

    fn finish_tally(&mut self) {
        let goals = self.counter(StatKind::Goals);
        let triples = self.counter(StatKind::Triples);
        self.makes = goals + triples;
        self.attempts = self.makes + self.counter(StatKind::Misses);
        self.points = 2 * goals + 3 * triples;
    }
}

/// Stat line for one actor over the given periods.
pub fn actor_line(state: &MatchState, actor: Actor, filter: PeriodFilter) -> StatLine {
    let periods = filter.periods();
    let mut line = StatLine::default();

    match state.tallies() {
        Some(tallies) => {
            for period in &periods {
                for stat in StatKind::ALL {
                    line.add_counter(stat, tallies.get(actor, *period, stat));
                }
            }
            line.finish_tally();
        }
        None => {
            state
                .shots()
                .iter()
                .filter(|shot| shot.actor == actor && periods.contains(&shot.period))
                .for_each(|shot| line.add_shot(shot));
        }
    }

    line
}

/// Per-player lines in roster order; the team row is never included.
pub fn player_lines(state: &MatchState, filter: PeriodFilter) -> Vec<(JerseyNumber, StatLine)> {
    state
        .roster
        .iter()
        .map(|number| (*number, actor_line(state, Actor::Player(*number), filter)))
        .collect()
}

/// Team level figures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamTotals {
    /// Counters recorded directly against the team row.
    pub team: StatLine,
    /// Sum over every rostered player.
    pub players: StatLine,
    /// `team` plus `players`; each recorded value counted exactly once.
    pub combined: StatLine,
}

/// Team figures over the given periods.
pub fn team_totals(state: &MatchState, filter: PeriodFilter) -> TeamTotals {
    let team = actor_line(state, Actor::Team, filter);
    let mut players = StatLine::default();
    for (_, line) in player_lines(state, filter) {
        players.absorb(&line);
    }
    let mut combined = team.clone();
    combined.absorb(&players);

    TeamTotals {
        team,
        players,
        combined,
    }
}

/// Complete statistics view for a period filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchView {
    /// Periods covered.
    pub filter: PeriodFilter,
    /// Individual players in roster order.
    pub players: Vec<(JerseyNumber, StatLine)>,
    /// Team figures.
    pub team: TeamTotals,
}

/// Build the full statistics view.
pub fn match_view(state: &MatchState, filter: PeriodFilter) -> MatchView {
    MatchView {
        filter,
        players: player_lines(state, filter),
        team: team_totals(state, filter),
    }
}

/// One line of the human readable activity feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedLine {
    /// Position in the log, 0 being the most recent.
    pub index: usize,
    /// Period of the action.
    pub period: Period,
    /// Human readable description.
    pub text: String,
}

/// Render the event log, most recent first.
pub fn activity_feed(state: &MatchState) -> Vec<FeedLine> {
    state
        .log
        .iter()
        .enumerate()
        .map(|(index, entry)| FeedLine {
            index,
            period: entry.event.period(),
            text: describe(state, &entry.event),
        })
        .collect()
}

fn describe(state: &MatchState, event: &ActionEvent) -> String {
    let who = state.display_name(event.actor());
    match event {
        ActionEvent::Counter { stat, delta, .. } if *delta == 1 => {
            format!("{who}: {}", stat.label())
        }
        ActionEvent::Counter { stat, delta, .. } => format!("{who}: {} x{delta}", stat.label()),
        ActionEvent::Shot(shot) => match shot.outcome {
            ShotOutcome::Made => format!("{who}: made {}-pointer", made_value(shot.position)),
            ShotOutcome::Missed => format!("{who}: missed shot"),
        },
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::state::match_state::{Configuration, MatchSetup, ModeKind};

    fn tally_match() -> MatchState {
        MatchState::new(MatchSetup {
            roster: vec![4, 7],
            names: IndexMap::from([(4, "Ana".to_string())]),
            mode: ModeKind::TallySheet,
            config: Configuration::default(),
        })
    }

    fn shot_match() -> MatchState {
        MatchState::new(MatchSetup {
            roster: vec![4, 7],
            names: IndexMap::new(),
            mode: ModeKind::ShotChart,
            config: Configuration::default(),
        })
    }

    #[test]
    fn shot_value_boundary() {
        let epsilon = 0.01;
        let inside = Position {
            x: 50.0,
            y: ARC_THRESHOLD - epsilon,
        };
        let outside = Position {
            x: 50.0,
            y: ARC_THRESHOLD + epsilon,
        };
        assert_eq!(shot_points(inside, ShotOutcome::Made), 3);
        assert_eq!(shot_points(outside, ShotOutcome::Made), 2);
        assert_eq!(shot_points(inside, ShotOutcome::Missed), 0);
        assert_eq!(shot_points(outside, ShotOutcome::Missed), 0);
    }

    #[test]
    fn empty_match_has_zero_percentage() {
        let state = tally_match();
        let line = actor_line(&state, Actor::Player(4), PeriodFilter::All);
        assert_eq!(line.attempts, 0);
        assert_eq!(line.percentage(), 0.0);
    }

    #[test]
    fn tally_points_and_percentage() {
        let mut state = tally_match();
        state.record_counter(Actor::Player(4), StatKind::Goals, 2);
        state.record_counter(Actor::Player(4), StatKind::Triples, 1);
        state.record_counter(Actor::Player(4), StatKind::Misses, 1);

        let line = actor_line(&state, Actor::Player(4), PeriodFilter::Single(Period::FirstHalf));
        assert_eq!(line.points, 7);
        assert_eq!(line.makes, 3);
        assert_eq!(line.attempts, 4);
        assert_eq!(line.percentage(), 75.0);
    }

    #[test]
    fn all_periods_is_the_sum_of_each_period() {
        let mut state = tally_match();
        state.record_counter(Actor::Player(7), StatKind::Goals, 1);
        state.set_period(Period::Overtime);
        state.record_counter(Actor::Player(7), StatKind::Goals, 1);

        let all = actor_line(&state, Actor::Player(7), PeriodFilter::All);
        let mut summed = StatLine::default();
        for period in Period::ALL {
            summed.absorb(&actor_line(
                &state,
                Actor::Player(7),
                PeriodFilter::Single(period),
            ));
        }
        assert_eq!(all.points, 4);
        assert_eq!(all.points, summed.points);
        assert_eq!(all.counter(StatKind::Goals), summed.counter(StatKind::Goals));
    }

    #[test]
    fn team_row_is_not_double_counted() {
        let mut state = tally_match();
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.record_counter(Actor::Team, StatKind::Turnovers, 1);

        let totals = team_totals(&state, PeriodFilter::All);
        assert_eq!(totals.players.points, 2);
        assert_eq!(totals.team.points, 0);
        assert_eq!(totals.combined.points, 2);
        assert_eq!(totals.combined.counter(StatKind::Turnovers), 1);
        assert!(
            player_lines(&state, PeriodFilter::All)
                .iter()
                .all(|(_, line)| line.counter(StatKind::Turnovers) == 0)
        );
    }

    #[test]
    fn shot_chart_lines_come_from_the_shot_list() {
        let mut state = shot_match();
        state.record_shot(4, Position { x: 10.0, y: 5.0 }, ShotOutcome::Made);
        state.record_shot(4, Position { x: 50.0, y: 80.0 }, ShotOutcome::Made);
        state.record_shot(4, Position { x: 50.0, y: 80.0 }, ShotOutcome::Missed);

        let line = actor_line(&state, Actor::Player(4), PeriodFilter::All);
        assert_eq!(line.attempts, 3);
        assert_eq!(line.makes, 2);
        assert_eq!(line.points, 5);
        assert_eq!(line.counter(StatKind::Triples), 1);
        assert_eq!(line.counter(StatKind::Misses), 1);
    }

    #[test]
    fn feed_lists_most_recent_first() {
        let mut state = tally_match();
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);
        state.record_counter(Actor::Player(7), StatKind::Rebounds, 1);

        let feed = activity_feed(&state);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].text, "#7: rebound");
        assert_eq!(feed[1].text, "Ana: goal");
    }
}
