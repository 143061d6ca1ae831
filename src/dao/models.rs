use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::{
    aggregate::shot_points,
    match_state::{
        Actor, Configuration, CounterSet, GameMode, JerseyNumber, MatchState, ModeKind, Period,
        Position, Shot, ShotOutcome, StatKind,
    },
};

/// Rostered player as persisted in the match header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterEntryEntity {
    /// Shirt number.
    pub number: JerseyNumber,
    /// Display name, if one was given.
    pub name: Option<String>,
}

/// Header record of a saved match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchHeaderEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Name given on explicit save.
    pub name: String,
    /// Recording mode, selecting which detail set applies.
    pub mode: ModeKind,
    /// Players taking part, in display order.
    pub roster: Vec<RosterEntryEntity>,
    /// Streak notification options.
    pub config: Configuration,
    /// Period that was current when saved.
    pub current_period: Period,
    /// Number of read-only loads. Owned by the store; ignored on upsert.
    pub view_count: u64,
    /// Creation timestamp of the match.
    pub created_at: SystemTime,
    /// Last time the match was saved.
    pub updated_at: SystemTime,
}

/// Detail row of a shot-chart match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShotEntity {
    /// Owning match.
    pub match_id: Uuid,
    /// Position of the shot in recording order.
    pub sequence: u32,
    /// Shot identifier within the match.
    pub shot_id: u64,
    /// Shooter.
    pub actor: Actor,
    /// Period the shot was taken in.
    pub period: Period,
    /// Horizontal court coordinate.
    pub x: f32,
    /// Vertical court coordinate.
    pub y: f32,
    /// Whether the shot scored.
    pub made: bool,
    /// Points scored.
    pub points: u8,
    /// Wall-clock time of the recording.
    pub recorded_at: SystemTime,
}

/// Period-tagged counter row of a tally-sheet match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TallyEntity {
    /// Owning match.
    pub match_id: Uuid,
    /// Actor credited with the statistic.
    pub actor: Actor,
    /// Period of the counter.
    pub period: Period,
    /// Statistic kind.
    pub stat: StatKind,
    /// Counter value.
    pub value: u32,
}

/// Header plus the detail rows of its mode.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecordEntity {
    /// Header record.
    pub header: MatchHeaderEntity,
    /// Shot rows (shot-chart matches).
    pub shots: Vec<ShotEntity>,
    /// Counter rows (tally-sheet matches).
    pub tallies: Vec<TallyEntity>,
}

/// Reasons a persisted record cannot become a live match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The in-memory match has never been assigned a remote identifier.
    #[error("match has no remote identifier")]
    MissingRemoteId,
    /// The header lists no players.
    #[error("match `{0}` has no rostered players")]
    EmptyRoster(Uuid),
    /// A detail row references a player missing from the roster.
    #[error("match `{match_id}` references unknown actor `{actor}`")]
    UnknownActor {
        /// Match being converted.
        match_id: Uuid,
        /// Offending actor.
        actor: Actor,
    },
}

impl MatchRecordEntity {
    /// Build the full-replace record for a match that has a remote identifier.
    pub fn from_state(state: &MatchState, updated_at: SystemTime) -> Result<Self, RecordError> {
        let id = state.remote_id.ok_or(RecordError::MissingRemoteId)?;

        let header = MatchHeaderEntity {
            id,
            name: state.name.clone().unwrap_or_default(),
            mode: state.mode_kind(),
            roster: state
                .roster
                .iter()
                .map(|number| RosterEntryEntity {
                    number: *number,
                    name: state.names.get(number).cloned(),
                })
                .collect(),
            config: state.config,
            current_period: state.period,
            view_count: state.view_count,
            created_at: state.created_at,
            updated_at,
        };

        let (shots, tallies) = match &state.mode {
            GameMode::ShotChart { shots } => (
                shots
                    .iter()
                    .enumerate()
                    .map(|(sequence, shot)| ShotEntity {
                        match_id: id,
                        sequence: sequence as u32,
                        shot_id: shot.id,
                        actor: shot.actor,
                        period: shot.period,
                        x: shot.position.x,
                        y: shot.position.y,
                        made: shot.outcome == ShotOutcome::Made,
                        points: shot.points,
                        recorded_at: shot.at,
                    })
                    .collect(),
                Vec::new(),
            ),
            GameMode::TallySheet { tallies } => (
                Vec::new(),
                tallies
                    .entries()
                    .filter(|(_, _, _, value)| *value > 0)
                    .map(|(actor, period, stat, value)| TallyEntity {
                        match_id: id,
                        actor,
                        period,
                        stat,
                        value,
                    })
                    .collect(),
            ),
        };

        Ok(Self {
            header,
            shots,
            tallies,
        })
    }

    /// Rebuild a live match from a fetched record.
    ///
    /// The action log is not persisted remotely, so a loaded match starts with
    /// empty undo/redo history and fresh streak state.
    pub fn into_state(self, read_only: bool) -> Result<MatchState, RecordError> {
        let MatchRecordEntity {
            header,
            mut shots,
            tallies,
        } = self;

        if header.roster.is_empty() {
            return Err(RecordError::EmptyRoster(header.id));
        }

        let roster: Vec<JerseyNumber> = header.roster.iter().map(|entry| entry.number).collect();
        let names: IndexMap<JerseyNumber, String> = header
            .roster
            .into_iter()
            .filter_map(|entry| entry.name.map(|name| (entry.number, name)))
            .collect();

        let known = |actor: Actor| match actor {
            Actor::Team => true,
            Actor::Player(number) => roster.contains(&number),
        };

        let mode = match header.mode {
            ModeKind::ShotChart => {
                shots.sort_by_key(|row| row.sequence);
                let shots = shots
                    .into_iter()
                    .map(|row| {
                        if !known(row.actor) {
                            return Err(RecordError::UnknownActor {
                                match_id: header.id,
                                actor: row.actor,
                            });
                        }
                        let position = Position { x: row.x, y: row.y };
                        let outcome = if row.made {
                            ShotOutcome::Made
                        } else {
                            ShotOutcome::Missed
                        };
                        Ok(Shot {
                            id: row.shot_id,
                            actor: row.actor,
                            period: row.period,
                            position,
                            outcome,
                            points: shot_points(position, outcome),
                            at: row.recorded_at,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                GameMode::ShotChart { shots }
            }
            ModeKind::TallySheet => {
                let mut counters = CounterSet::for_roster(&roster);
                for row in tallies {
                    if !known(row.actor) {
                        return Err(RecordError::UnknownActor {
                            match_id: header.id,
                            actor: row.actor,
                        });
                    }
                    counters.set(row.actor, row.period, row.stat, row.value);
                }
                GameMode::TallySheet { tallies: counters }
            }
        };

        Ok(MatchState {
            mode,
            roster,
            names,
            period: header.current_period,
            log: Default::default(),
            redo: Vec::new(),
            streaks: Default::default(),
            config: header.config,
            read_only,
            remote_id: Some(header.id),
            name: Some(header.name),
            view_count: header.view_count,
            created_at: header.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::MatchSetup;

    fn saved_match(mode: ModeKind) -> MatchState {
        let mut state = MatchState::new(MatchSetup {
            roster: vec![4, 7],
            names: IndexMap::from([(4, "Ana".to_string())]),
            mode,
            config: Configuration::default(),
        });
        state.remote_id = Some(Uuid::new_v4());
        state.name = Some("Final".into());
        state
    }

    #[test]
    fn unsaved_match_has_no_record() {
        let mut state = saved_match(ModeKind::TallySheet);
        state.remote_id = None;
        assert_eq!(
            MatchRecordEntity::from_state(&state, SystemTime::now()),
            Err(RecordError::MissingRemoteId)
        );
    }

    #[test]
    fn tally_record_keeps_only_non_zero_counters() {
        let mut state = saved_match(ModeKind::TallySheet);
        state.record_counter(Actor::Player(4), StatKind::Goals, 2);
        state.record_counter(Actor::Team, StatKind::Turnovers, 1);

        let record = MatchRecordEntity::from_state(&state, SystemTime::now()).unwrap();
        assert_eq!(record.tallies.len(), 2);
        assert!(record.shots.is_empty());

        let loaded = record.into_state(true).unwrap();
        assert!(loaded.read_only);
        assert_eq!(loaded.tallies(), state.tallies());
        assert_eq!(loaded.display_name(Actor::Player(4)), "Ana");
    }

    #[test]
    fn shot_rows_are_restored_in_sequence_order() {
        let mut state = saved_match(ModeKind::ShotChart);
        state.record_shot(4, Position { x: 5.0, y: 5.0 }, ShotOutcome::Made);
        state.record_shot(7, Position { x: 50.0, y: 50.0 }, ShotOutcome::Missed);

        let mut record = MatchRecordEntity::from_state(&state, SystemTime::now()).unwrap();
        record.shots.reverse();

        let loaded = record.into_state(false).unwrap();
        assert_eq!(loaded.shots(), state.shots());
        assert!(loaded.log.is_empty());
    }

    #[test]
    fn rows_for_unknown_players_are_rejected() {
        let state = saved_match(ModeKind::TallySheet);
        let mut record = MatchRecordEntity::from_state(&state, SystemTime::now()).unwrap();
        record.tallies.push(TallyEntity {
            match_id: record.header.id,
            actor: Actor::Player(99),
            period: Period::FirstHalf,
            stat: StatKind::Goals,
            value: 1,
        });
        assert!(matches!(
            record.into_state(true),
            Err(RecordError::UnknownActor { .. })
        ));
    }
}
