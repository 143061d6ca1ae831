use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    dto::matches::FeedEntry,
    state::{
        aggregate::{MatchView, PeriodFilter, StatLine, TeamTotals},
        match_state::{Actor, JerseyNumber, MatchState, Period, StatKind},
    },
};

/// Query parameters of the statistics endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Restrict figures to one period; omitted means every period.
    #[serde(default)]
    pub period: Option<Period>,
}

/// Derived figures of one actor or group.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatLineDto {
    /// Made plus missed attempts.
    pub attempts: u32,
    /// Made attempts.
    pub makes: u32,
    /// Points scored.
    pub points: u32,
    /// Success rate in percent, rounded to one decimal.
    pub percentage: f32,
    /// Raw counters by statistic.
    #[schema(value_type = Object)]
    pub counters: BTreeMap<StatKind, u32>,
}

impl From<&StatLine> for StatLineDto {
    fn from(line: &StatLine) -> Self {
        Self {
            attempts: line.attempts,
            makes: line.makes,
            points: line.points,
            percentage: (line.percentage() * 10.0).round() / 10.0,
            counters: line.counters.clone(),
        }
    }
}

/// Figures of one rostered player.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerStatsDto {
    /// Shirt number.
    pub number: JerseyNumber,
    /// Display name.
    pub name: String,
    /// Derived figures.
    #[serde(flatten)]
    pub line: StatLineDto,
}

/// Team level figures.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamStatsDto {
    /// Team-only counters.
    pub team: StatLineDto,
    /// Sum over every player.
    pub players: StatLineDto,
    /// Players plus team-only counters.
    pub combined: StatLineDto,
}

impl From<&TeamTotals> for TeamStatsDto {
    fn from(totals: &TeamTotals) -> Self {
        Self {
            team: StatLineDto::from(&totals.team),
            players: StatLineDto::from(&totals.players),
            combined: StatLineDto::from(&totals.combined),
        }
    }
}

/// Statistics view of the live match.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Period covered, `null` for every period.
    pub period: Option<Period>,
    /// Individual players in roster order.
    pub players: Vec<PlayerStatsDto>,
    /// Team level figures.
    pub team: TeamStatsDto,
}

impl StatsResponse {
    /// Render a computed view, resolving display names from `state`.
    pub fn new(state: &MatchState, view: &MatchView) -> Self {
        let period = match view.filter {
            PeriodFilter::Single(period) => Some(period),
            PeriodFilter::All => None,
        };
        Self {
            period,
            players: view
                .players
                .iter()
                .map(|(number, line)| PlayerStatsDto {
                    number: *number,
                    name: state.display_name(Actor::Player(*number)),
                    line: StatLineDto::from(line),
                })
                .collect(),
            team: TeamStatsDto::from(&view.team),
        }
    }
}

/// Activity feed of the live match, most recent first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedResponse {
    /// Feed lines.
    pub entries: Vec<FeedEntry>,
}
