//! Domain model of a recorded match: actors, periods, counters, shots and the
//! undo-capable action log.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    str::FromStr,
    time::SystemTime,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Shirt number identifying a rostered player.
pub type JerseyNumber = u16;

/// Entity an action is attributed to.
///
/// Serialized as a plain string (`"7"` or `"team"`) so it can key JSON maps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub enum Actor {
    /// Individual player identified by shirt number.
    Player(JerseyNumber),
    /// Synthetic actor carrying team-only statistics.
    Team,
}

const TEAM_KEY: &str = "team";

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Player(number) => write!(f, "{number}"),
            Actor::Team => f.write_str(TEAM_KEY),
        }
    }
}

/// Error returned when an actor key is neither `team` nor a shirt number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid actor `{0}`: expected a shirt number or `team`")]
pub struct ParseActorError(pub String);

impl FromStr for Actor {
    type Err = ParseActorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(TEAM_KEY) {
            return Ok(Actor::Team);
        }
        trimmed
            .parse::<JerseyNumber>()
            .map(Actor::Player)
            .map_err(|_| ParseActorError(value.to_string()))
    }
}

/// Discrete match segment scoping every counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// First half.
    FirstHalf,
    /// Second half.
    SecondHalf,
    /// Extra time.
    Overtime,
}

impl Period {
    /// Every period in playing order.
    pub const ALL: [Period; 3] = [Period::FirstHalf, Period::SecondHalf, Period::Overtime];

    /// Human readable label used in the activity feed.
    pub fn label(self) -> &'static str {
        match self {
            Period::FirstHalf => "First Half",
            Period::SecondHalf => "Second Half",
            Period::Overtime => "Overtime",
        }
    }
}

/// Tallied statistic kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Two-point make.
    #[serde(alias = "goles")]
    Goals,
    /// Three-point make.
    Triples,
    /// Missed attempt.
    #[serde(alias = "fallos")]
    Misses,
    /// Rebound.
    Rebounds,
    /// Assist.
    Assists,
    /// Ball recovery (team only).
    Recoveries,
    /// Turnover (team only).
    Turnovers,
    /// Goal conceded (team only).
    GoalsAgainst,
}

impl StatKind {
    /// Every statistic kind, in display order.
    pub const ALL: [StatKind; 8] = [
        StatKind::Goals,
        StatKind::Triples,
        StatKind::Misses,
        StatKind::Rebounds,
        StatKind::Assists,
        StatKind::Recoveries,
        StatKind::Turnovers,
        StatKind::GoalsAgainst,
    ];

    /// Whether the statistic is always attributed to the [`Actor::Team`] row.
    pub fn is_team_only(self) -> bool {
        matches!(
            self,
            StatKind::Recoveries | StatKind::Turnovers | StatKind::GoalsAgainst
        )
    }

    /// Made/missed outcome represented by this statistic, if any.
    pub fn outcome(self) -> Option<ShotOutcome> {
        match self {
            StatKind::Goals | StatKind::Triples => Some(ShotOutcome::Made),
            StatKind::Misses => Some(ShotOutcome::Missed),
            _ => None,
        }
    }

    /// Human readable label used in the activity feed.
    pub fn label(self) -> &'static str {
        match self {
            StatKind::Goals => "goal",
            StatKind::Triples => "triple",
            StatKind::Misses => "miss",
            StatKind::Rebounds => "rebound",
            StatKind::Assists => "assist",
            StatKind::Recoveries => "recovery",
            StatKind::Turnovers => "turnover",
            StatKind::GoalsAgainst => "goal against",
        }
    }
}

/// Result of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShotOutcome {
    /// The attempt scored.
    Made,
    /// The attempt did not score.
    Missed,
}

/// Court coordinates of a shot, both axes on a 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    /// Horizontal coordinate (sideline to sideline).
    pub x: f32,
    /// Vertical coordinate measured from the far baseline towards the basket.
    pub y: f32,
}

/// A single charted shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    /// Sequence number, unique within the match.
    pub id: u64,
    /// Shooter.
    pub actor: Actor,
    /// Period the shot was taken in.
    pub period: Period,
    /// Where the shot was taken from.
    pub position: Position,
    /// Whether the shot scored.
    pub outcome: ShotOutcome,
    /// Points derived from position and outcome at record time.
    pub points: u8,
    /// Wall-clock time of the recording.
    pub at: SystemTime,
}

/// Immutable record of a forward action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvent {
    /// A tallied statistic was incremented.
    Counter {
        /// Actor credited with the statistic.
        actor: Actor,
        /// Period the statistic was recorded in.
        period: Period,
        /// Statistic kind.
        stat: StatKind,
        /// Amount added to the counter.
        delta: u32,
        /// Wall-clock time of the recording.
        at: SystemTime,
    },
    /// A shot was charted.
    Shot(Shot),
}

impl ActionEvent {
    /// Actor the event is attributed to.
    pub fn actor(&self) -> Actor {
        match self {
            ActionEvent::Counter { actor, .. } => *actor,
            ActionEvent::Shot(shot) => shot.actor,
        }
    }

    /// Period the event was recorded in.
    pub fn period(&self) -> Period {
        match self {
            ActionEvent::Counter { period, .. } => *period,
            ActionEvent::Shot(shot) => shot.period,
        }
    }

    /// Made/missed outcome carried by the event, if it represents one.
    pub fn outcome(&self) -> Option<ShotOutcome> {
        match self {
            ActionEvent::Counter { stat, .. } => stat.outcome(),
            ActionEvent::Shot(shot) => Some(shot.outcome),
        }
    }
}

/// Per-player streak tracking with edge-trigger flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStreakState {
    /// Current run of made outcomes.
    pub consecutive_makes: u32,
    /// Current run of missed outcomes.
    pub consecutive_misses: u32,
    /// A hot notification already fired for the current run.
    pub hot_fired: bool,
    /// A cold notification already fired for the current run.
    pub cold_fired: bool,
}

/// Streak state of the acting player around a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakTransition {
    /// State before the event was applied.
    pub before: PlayerStreakState,
    /// State after the event was applied.
    pub after: PlayerStreakState,
}

/// Entry of the event log and of the redo stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The recorded action.
    pub event: ActionEvent,
    /// Streak bookkeeping for made/missed outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakTransition>,
}

/// Non-negative tallies keyed by actor, period and statistic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterSet(BTreeMap<Actor, BTreeMap<Period, BTreeMap<StatKind, u32>>>);

impl CounterSet {
    /// Zero-filled counters for every rostered player plus the team row.
    pub fn for_roster(roster: &[JerseyNumber]) -> Self {
        let mut counters = Self::default();
        let actors = roster
            .iter()
            .copied()
            .map(Actor::Player)
            .chain(std::iter::once(Actor::Team));
        for actor in actors {
            let periods = counters.0.entry(actor).or_default();
            for period in Period::ALL {
                let stats = periods.entry(period).or_default();
                for stat in StatKind::ALL {
                    stats.entry(stat).or_insert(0);
                }
            }
        }
        counters
    }

    /// Current value of a single counter.
    pub fn get(&self, actor: Actor, period: Period, stat: StatKind) -> u32 {
        self.0
            .get(&actor)
            .and_then(|periods| periods.get(&period))
            .and_then(|stats| stats.get(&stat))
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite a single counter.
    pub fn set(&mut self, actor: Actor, period: Period, stat: StatKind, value: u32) {
        *self.slot(actor, period, stat) = value;
    }

    /// Add `delta` to a counter.
    pub fn add(&mut self, actor: Actor, period: Period, stat: StatKind, delta: u32) {
        let slot = self.slot(actor, period, stat);
        *slot = slot.saturating_add(delta);
    }

    /// Subtract `delta` from a counter, clamping at zero.
    pub fn subtract_clamped(&mut self, actor: Actor, period: Period, stat: StatKind, delta: u32) {
        let slot = self.slot(actor, period, stat);
        *slot = slot.saturating_sub(delta);
    }

    /// Every stored `(actor, period, stat, value)` tuple.
    pub fn entries(&self) -> impl Iterator<Item = (Actor, Period, StatKind, u32)> + '_ {
        self.0.iter().flat_map(|(actor, periods)| {
            periods.iter().flat_map(move |(period, stats)| {
                stats
                    .iter()
                    .map(move |(stat, value)| (*actor, *period, *stat, *value))
            })
        })
    }

    fn slot(&mut self, actor: Actor, period: Period, stat: StatKind) -> &mut u32 {
        self.0
            .entry(actor)
            .or_default()
            .entry(period)
            .or_default()
            .entry(stat)
            .or_insert(0)
    }
}

/// Recording mode of a match, fixed for its whole life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameMode {
    /// Positional shot chart.
    ShotChart {
        /// Charted shots in recording order.
        shots: Vec<Shot>,
    },
    /// Tally sheet of counters.
    TallySheet {
        /// Per actor/period/stat counters.
        tallies: CounterSet,
    },
}

/// Discriminant of [`GameMode`] used by setup payloads and persisted headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    /// Positional shot chart.
    ShotChart,
    /// Tally sheet of counters.
    TallySheet,
}

/// Streak notification options supplied at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Configuration {
    /// Emit a notification on a run of makes.
    pub hot_streak_enabled: bool,
    /// Number of consecutive makes that triggers a hot notification.
    pub hot_threshold: u32,
    /// Emit a notification on a run of misses.
    pub cold_streak_enabled: bool,
    /// Number of consecutive misses that triggers a cold notification.
    pub cold_threshold: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            hot_streak_enabled: true,
            hot_threshold: 3,
            cold_streak_enabled: true,
            cold_threshold: 3,
        }
    }
}

/// Everything needed to start recording a new match.
#[derive(Debug, Clone)]
pub struct MatchSetup {
    /// Shirt numbers of the players taking part, in display order.
    pub roster: Vec<JerseyNumber>,
    /// Display names keyed by shirt number.
    pub names: IndexMap<JerseyNumber, String>,
    /// Recording mode.
    pub mode: ModeKind,
    /// Streak notification options.
    pub config: Configuration,
}

/// Aggregate root of a recorded match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// Recording mode and its detail data.
    pub mode: GameMode,
    /// Shirt numbers of the players taking part, in display order.
    pub roster: Vec<JerseyNumber>,
    /// Display names keyed by shirt number.
    #[serde(default)]
    pub names: IndexMap<JerseyNumber, String>,
    /// Period new actions are recorded in.
    pub period: Period,
    /// Applied actions, most recent first.
    #[serde(default)]
    pub log: VecDeque<LogEntry>,
    /// Undone actions, most recent last.
    #[serde(default)]
    pub redo: Vec<LogEntry>,
    /// Streak state per player.
    #[serde(default)]
    pub streaks: BTreeMap<JerseyNumber, PlayerStreakState>,
    /// Streak notification options.
    #[serde(default)]
    pub config: Configuration,
    /// Replay of a match owned by someone else: every mutation is ignored.
    #[serde(default)]
    pub read_only: bool,
    /// Identifier in the remote store, assigned on first explicit save.
    #[serde(default)]
    pub remote_id: Option<Uuid>,
    /// Name given on explicit save.
    #[serde(default)]
    pub name: Option<String>,
    /// Remote view counter as of the last load.
    #[serde(default)]
    pub view_count: u64,
    /// Creation time of the match.
    #[serde(default = "SystemTime::now")]
    pub created_at: SystemTime,
}

impl MatchState {
    /// Build a fresh match from a completed setup.
    pub fn new(setup: MatchSetup) -> Self {
        let mode = match setup.mode {
            ModeKind::ShotChart => GameMode::ShotChart { shots: Vec::new() },
            ModeKind::TallySheet => GameMode::TallySheet {
                tallies: CounterSet::for_roster(&setup.roster),
            },
        };

        Self {
            mode,
            roster: setup.roster,
            names: setup.names,
            period: Period::FirstHalf,
            log: VecDeque::new(),
            redo: Vec::new(),
            streaks: BTreeMap::new(),
            config: setup.config,
            read_only: false,
            remote_id: None,
            name: None,
            view_count: 0,
            created_at: SystemTime::now(),
        }
    }

    /// Discriminant of the recording mode.
    pub fn mode_kind(&self) -> ModeKind {
        match self.mode {
            GameMode::ShotChart { .. } => ModeKind::ShotChart,
            GameMode::TallySheet { .. } => ModeKind::TallySheet,
        }
    }

    /// Charted shots; empty in tally mode.
    pub fn shots(&self) -> &[Shot] {
        match &self.mode {
            GameMode::ShotChart { shots } => shots,
            GameMode::TallySheet { .. } => &[],
        }
    }

    /// Tally counters; `None` in shot-chart mode.
    pub fn tallies(&self) -> Option<&CounterSet> {
        match &self.mode {
            GameMode::TallySheet { tallies } => Some(tallies),
            GameMode::ShotChart { .. } => None,
        }
    }

    /// Whether a shirt number belongs to the roster.
    pub fn is_rostered(&self, number: JerseyNumber) -> bool {
        self.roster.contains(&number)
    }

    /// Display name of an actor, falling back to the shirt number.
    pub fn display_name(&self, actor: Actor) -> String {
        match actor {
            Actor::Team => "Team".to_string(),
            Actor::Player(number) => self
                .names
                .get(&number)
                .filter(|name| !name.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| format!("#{number}")),
        }
    }

    /// Current streak state of a player.
    pub fn streak_of(&self, number: JerseyNumber) -> PlayerStreakState {
        self.streaks.get(&number).copied().unwrap_or_default()
    }

    /// Whether an undo would do anything.
    pub fn can_undo(&self) -> bool {
        !self.read_only && !self.log.is_empty()
    }

    /// Whether a redo would do anything.
    pub fn can_redo(&self) -> bool {
        !self.read_only && !self.redo.is_empty()
    }

    /// Whether a debounced remote save may be scheduled for this match.
    pub fn autosave_eligible(&self) -> bool {
        self.remote_id.is_some() && !self.read_only
    }

    pub(crate) fn next_shot_id(&self) -> u64 {
        self.shots()
            .iter()
            .map(|shot| shot.id)
            .max()
            .map_or(1, |id| id + 1)
    }
}
