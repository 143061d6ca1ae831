use std::{collections::BTreeMap, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::MatchHeaderEntity,
    dto::{
        format_system_time,
        validation::{validate_actor, validate_unique_roster},
    },
    state::{
        aggregate::{FeedLine, made_value},
        match_state::{
            Actor, Configuration, JerseyNumber, MatchSetup, MatchState, ModeKind, Period,
            ShotOutcome, StatKind,
        },
        reducer::{IgnoreReason, Outcome},
        streak::StreakNotification,
    },
};

/// Player supplied in the setup payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RosterEntryInput {
    /// Shirt number.
    pub number: JerseyNumber,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Streak options supplied in the setup payload; missing fields use the
/// configured defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct ConfigurationInput {
    /// Emit hot notifications.
    pub hot_streak_enabled: Option<bool>,
    /// Consecutive makes that trigger a hot notification.
    #[validate(range(min = 1, max = 50))]
    pub hot_threshold: Option<u32>,
    /// Emit cold notifications.
    pub cold_streak_enabled: Option<bool>,
    /// Consecutive misses that trigger a cold notification.
    #[validate(range(min = 1, max = 50))]
    pub cold_threshold: Option<u32>,
}

impl ConfigurationInput {
    /// Merge the supplied values over `defaults`.
    pub fn resolve(&self, defaults: Configuration) -> Configuration {
        Configuration {
            hot_streak_enabled: self.hot_streak_enabled.unwrap_or(defaults.hot_streak_enabled),
            hot_threshold: self.hot_threshold.unwrap_or(defaults.hot_threshold),
            cold_streak_enabled: self
                .cold_streak_enabled
                .unwrap_or(defaults.cold_streak_enabled),
            cold_threshold: self.cold_threshold.unwrap_or(defaults.cold_threshold),
        }
    }
}

/// Payload completing the setup of a new match.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetupRequest {
    /// Players taking part, in display order.
    pub roster: Vec<RosterEntryInput>,
    /// Recording mode, fixed for the life of the match.
    pub mode: ModeKind,
    /// Streak options.
    #[serde(default)]
    pub configuration: Option<ConfigurationInput>,
}

impl Validate for SetupRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.roster.is_empty() {
            let mut err = validator::ValidationError::new("roster_empty");
            err.message = Some("Roster must contain at least one player".into());
            errors.add("roster", err);
        } else if let Err(err) = validate_unique_roster(&self.roster) {
            errors.add("roster", err);
        }

        if let Some(ref configuration) = self.configuration {
            if let Err(config_errors) = configuration.validate() {
                errors.merge_self("configuration", Err(config_errors));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl SetupRequest {
    /// Convert into the domain setup, filling streak defaults.
    pub fn into_setup(self, defaults: Configuration) -> MatchSetup {
        let config = self
            .configuration
            .as_ref()
            .map_or(defaults, |input| input.resolve(defaults));
        let names: IndexMap<JerseyNumber, String> = self
            .roster
            .iter()
            .filter_map(|entry| {
                entry
                    .name
                    .as_ref()
                    .map(|name| name.trim())
                    .filter(|name| !name.is_empty())
                    .map(|name| (entry.number, name.to_string()))
            })
            .collect();

        MatchSetup {
            roster: self.roster.iter().map(|entry| entry.number).collect(),
            names,
            mode: self.mode,
            config,
        }
    }
}

/// Increment a tallied statistic.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CounterRequest {
    /// Shirt number or `team`.
    #[validate(custom(function = "validate_actor"))]
    pub actor: String,
    /// Statistic to increment.
    pub stat: StatKind,
    /// Amount to add, defaults to 1.
    #[serde(default)]
    #[validate(range(min = 1, max = 99))]
    pub delta: Option<u32>,
}

/// Chart a shot.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct ShotRequest {
    /// Shooter's shirt number.
    pub player: JerseyNumber,
    /// Horizontal court coordinate, 0–100.
    #[validate(range(min = 0.0, max = 100.0))]
    pub x: f32,
    /// Vertical court coordinate, 0–100.
    #[validate(range(min = 0.0, max = 100.0))]
    pub y: f32,
    /// Whether the shot scored.
    pub made: bool,
}

/// Switch the period new actions are recorded in.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PeriodRequest {
    /// Target period.
    pub period: Period,
}

/// Explicit save under a user supplied name.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SaveRequest {
    /// Name shown in the load picker.
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

/// Query parameters of the load endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoadQuery {
    /// Load for editing instead of read-only replay.
    #[serde(default)]
    pub as_owner: bool,
}

/// Player entry of a match summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RosterEntrySummary {
    /// Shirt number.
    pub number: JerseyNumber,
    /// Display name (falls back to `#number`).
    pub name: String,
}

/// Charted shot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShotSummary {
    /// Shot identifier.
    pub id: u64,
    /// Shooter's shirt number or `team`.
    pub actor: String,
    /// Period of the shot.
    pub period: Period,
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
    /// Made or missed.
    pub outcome: ShotOutcome,
    /// Points scored.
    pub points: u8,
    /// Value the shot would have had if made.
    pub value: u8,
}

/// Full view of the live match.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchSummary {
    /// Recording mode.
    pub mode: ModeKind,
    /// Current period.
    pub period: Period,
    /// Players in display order.
    pub roster: Vec<RosterEntrySummary>,
    /// Streak options.
    pub configuration: Configuration,
    /// Every mutation is ignored while set.
    pub read_only: bool,
    /// Remote identifier, once saved.
    pub remote_id: Option<Uuid>,
    /// Saved name.
    pub name: Option<String>,
    /// Remote view counter.
    pub view_count: u64,
    /// Whether an undo would change anything.
    pub can_undo: bool,
    /// Whether a redo would change anything.
    pub can_redo: bool,
    /// Length of the event log.
    pub log_length: usize,
    /// Charted shots (shot-chart mode).
    pub shots: Vec<ShotSummary>,
    /// Non-zero counters as `actor → period → stat → value` (tally mode).
    #[schema(value_type = Object)]
    pub tallies: BTreeMap<String, BTreeMap<Period, BTreeMap<StatKind, u32>>>,
    /// Creation time, RFC 3339.
    pub created_at: String,
}

impl From<&MatchState> for MatchSummary {
    fn from(state: &MatchState) -> Self {
        let mut tallies: BTreeMap<String, BTreeMap<Period, BTreeMap<StatKind, u32>>> =
            BTreeMap::new();
        if let Some(counters) = state.tallies() {
            for (actor, period, stat, value) in counters.entries().filter(|entry| entry.3 > 0) {
                tallies
                    .entry(actor.to_string())
                    .or_default()
                    .entry(period)
                    .or_default()
                    .insert(stat, value);
            }
        }

        Self {
            mode: state.mode_kind(),
            period: state.period,
            roster: state
                .roster
                .iter()
                .map(|number| RosterEntrySummary {
                    number: *number,
                    name: state.display_name(Actor::Player(*number)),
                })
                .collect(),
            configuration: state.config,
            read_only: state.read_only,
            remote_id: state.remote_id,
            name: state.name.clone(),
            view_count: state.view_count,
            can_undo: state.can_undo(),
            can_redo: state.can_redo(),
            log_length: state.log.len(),
            shots: state
                .shots()
                .iter()
                .map(|shot| ShotSummary {
                    id: shot.id,
                    actor: shot.actor.to_string(),
                    period: shot.period,
                    x: shot.position.x,
                    y: shot.position.y,
                    outcome: shot.outcome,
                    points: shot.points,
                    value: made_value(shot.position),
                })
                .collect(),
            tallies,
            created_at: format_system_time(state.created_at),
        }
    }
}

/// Result of a mutating request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Whether the state changed.
    pub applied: bool,
    /// Why nothing changed, when `applied` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<IgnoreReason>,
    /// Streak notification fired by this action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<StreakNotification>,
    /// Match after the action.
    #[serde(rename = "match")]
    pub summary: MatchSummary,
}

impl ActionResponse {
    /// Pair a reducer outcome with the resulting match.
    pub fn new(outcome: Outcome, state: &MatchState) -> Self {
        Self {
            applied: outcome.is_applied(),
            ignored: outcome.ignored(),
            notification: outcome.notification().cloned(),
            summary: MatchSummary::from(state),
        }
    }
}

/// Line of the activity feed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedEntry {
    /// Position in the log, 0 being the most recent.
    pub index: usize,
    /// Period of the action.
    pub period: Period,
    /// Human readable description.
    pub text: String,
}

impl From<FeedLine> for FeedEntry {
    fn from(line: FeedLine) -> Self {
        Self {
            index: line.index,
            period: line.period,
            text: line.text,
        }
    }
}

/// Result of an explicit save.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaveResponse {
    /// Remote identifier.
    pub id: Uuid,
    /// Saved name.
    pub name: String,
    /// Completion time, RFC 3339.
    pub saved_at: String,
}

impl SaveResponse {
    /// Build from the saved identity and completion time.
    pub fn new(id: Uuid, name: String, saved_at: SystemTime) -> Self {
        Self {
            id,
            name,
            saved_at: format_system_time(saved_at),
        }
    }
}

/// Entry of the load picker.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SavedMatchItem {
    /// Remote identifier.
    pub id: Uuid,
    /// Saved name.
    pub name: String,
    /// Recording mode.
    pub mode: ModeKind,
    /// Number of rostered players.
    pub players: usize,
    /// Read-only loads so far.
    pub view_count: u64,
    /// Last save, RFC 3339.
    pub updated_at: String,
}

impl From<MatchHeaderEntity> for SavedMatchItem {
    fn from(header: MatchHeaderEntity) -> Self {
        Self {
            id: header.id,
            name: header.name,
            mode: header.mode,
            players: header.roster.len(),
            view_count: header.view_count,
            updated_at: format_system_time(header.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(roster: &[u16]) -> SetupRequest {
        SetupRequest {
            roster: roster
                .iter()
                .map(|number| RosterEntryInput {
                    number: *number,
                    name: None,
                })
                .collect(),
            mode: ModeKind::TallySheet,
            configuration: None,
        }
    }

    #[test]
    fn setup_requires_a_unique_non_empty_roster() {
        assert!(setup(&[4, 7]).validate().is_ok());
        assert!(setup(&[]).validate().is_err());
        assert!(setup(&[4, 4]).validate().is_err());
    }

    #[test]
    fn setup_rejects_zero_thresholds() {
        let mut request = setup(&[4]);
        request.configuration = Some(ConfigurationInput {
            hot_threshold: Some(0),
            ..ConfigurationInput::default()
        });
        assert!(request.validate().is_err());
    }

    #[test]
    fn setup_fills_defaults_and_trims_names() {
        let mut request = setup(&[4, 7]);
        request.roster[0].name = Some("  Ana ".into());
        request.roster[1].name = Some("   ".into());
        request.configuration = Some(ConfigurationInput {
            cold_threshold: Some(4),
            ..ConfigurationInput::default()
        });

        let setup = request.into_setup(Configuration::default());
        assert_eq!(setup.roster, vec![4, 7]);
        assert_eq!(setup.names.get(&4).map(String::as_str), Some("Ana"));
        assert!(!setup.names.contains_key(&7));
        assert_eq!(setup.config.cold_threshold, 4);
        assert_eq!(setup.config.hot_threshold, 3);
    }

    #[test]
    fn counter_request_checks_actor_and_delta() {
        let request = |actor: &str, delta| CounterRequest {
            actor: actor.into(),
            stat: StatKind::Rebounds,
            delta,
        };
        assert!(request("7", None).validate().is_ok());
        assert!(request("team", Some(2)).validate().is_ok());
        assert!(request("bench", None).validate().is_err());
        assert!(request("7", Some(0)).validate().is_err());
    }

    #[test]
    fn summary_lists_only_non_zero_counters() {
        let mut state = MatchState::new(setup(&[4]).into_setup(Configuration::default()));
        state.record_counter(Actor::Player(4), StatKind::Goals, 1);

        let summary = MatchSummary::from(&state);
        assert_eq!(summary.tallies.len(), 1);
        assert_eq!(summary.tallies["4"][&Period::FirstHalf][&StatKind::Goals], 1);
        assert!(summary.can_undo);
        assert_eq!(summary.roster[0].name, "#4");
    }
}
