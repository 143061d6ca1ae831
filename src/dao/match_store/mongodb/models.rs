use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{MatchHeaderEntity, RosterEntryEntity, ShotEntity, TallyEntity},
    state::match_state::{Actor, Configuration, ModeKind, Period, StatKind},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    mode: ModeKind,
    roster: Vec<RosterEntryEntity>,
    config: Configuration,
    current_period: Period,
    #[serde(default)]
    view_count: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<MatchHeaderEntity> for MongoMatchDocument {
    fn from(value: MatchHeaderEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name,
            mode: value.mode,
            roster: value.roster,
            config: value.config,
            current_period: value.current_period,
            view_count: i64::try_from(value.view_count).unwrap_or(i64::MAX),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl MongoMatchDocument {
    /// Document overwriting a header whose stored view counter is
    /// `stored_views`; a new header starts at zero.
    pub fn replacing(header: MatchHeaderEntity, stored_views: Option<i64>) -> Self {
        Self {
            view_count: stored_views.unwrap_or(0),
            ..Self::from(header)
        }
    }

    pub fn view_count(&self) -> i64 {
        self.view_count
    }
}

impl TryFrom<MongoMatchDocument> for MatchHeaderEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            name: value.name,
            mode: value.mode,
            roster: value.roster,
            config: value.config,
            current_period: value.current_period,
            view_count: value.view_count.max(0) as u64,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoShotDocument {
    match_id: String,
    sequence: i64,
    shot_id: i64,
    actor: Actor,
    period: Period,
    x: f64,
    y: f64,
    made: bool,
    points: i32,
    recorded_at: DateTime,
}

impl From<ShotEntity> for MongoShotDocument {
    fn from(value: ShotEntity) -> Self {
        Self {
            match_id: value.match_id.to_string(),
            sequence: i64::from(value.sequence),
            shot_id: i64::try_from(value.shot_id).unwrap_or(i64::MAX),
            actor: value.actor,
            period: value.period,
            x: f64::from(value.x),
            y: f64::from(value.y),
            made: value.made,
            points: i32::from(value.points),
            recorded_at: DateTime::from_system_time(value.recorded_at),
        }
    }
}

impl TryFrom<MongoShotDocument> for ShotEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoShotDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            match_id: parse_id(&value.match_id)?,
            sequence: value.sequence.clamp(0, i64::from(u32::MAX)) as u32,
            shot_id: value.shot_id.max(0) as u64,
            actor: value.actor,
            period: value.period,
            x: value.x as f32,
            y: value.y as f32,
            made: value.made,
            points: value.points.clamp(0, 3) as u8,
            recorded_at: value.recorded_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTallyDocument {
    match_id: String,
    actor: Actor,
    period: Period,
    stat: StatKind,
    value: i64,
}

impl From<TallyEntity> for MongoTallyDocument {
    fn from(value: TallyEntity) -> Self {
        Self {
            match_id: value.match_id.to_string(),
            actor: value.actor,
            period: value.period,
            stat: value.stat,
            value: i64::from(value.value),
        }
    }
}

impl TryFrom<MongoTallyDocument> for TallyEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTallyDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            match_id: parse_id(&value.match_id)?,
            actor: value.actor,
            period: value.period,
            stat: value.stat,
            value: value.value.clamp(0, i64::from(u32::MAX)) as u32,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::InvalidDocument {
        raw: raw.to_owned(),
    })
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn by_match(id: Uuid) -> Document {
    doc! {"match_id": id.to_string()}
}
