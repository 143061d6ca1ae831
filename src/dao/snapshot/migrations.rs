//! Versioned upgrade chain for persisted snapshots.
//!
//! Each step is a pure function over raw JSON that only touches the shape it
//! upgrades, so running a step on an already upgraded value changes nothing.
//!
//! * v1: unversioned legacy blob, camelCase keys, flat `{actor: {stat: n}}`
//!   tallies next to a `shots` list, no streak configuration.
//! * v2: snake_case keys, tallies bucketed per period, streak configuration.
//! * v3: tagged `mode` instead of the `shots`/`tallies` pair.

use serde_json::{Map, Value, json};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::state::{
    aggregate::ARC_THRESHOLD,
    match_state::{Configuration, Period},
};

/// Schema version written by this build.
pub const CURRENT_VERSION: u64 = 3;

/// Reasons a snapshot cannot be upgraded.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The snapshot is not a JSON object.
    #[error("snapshot is not a JSON object")]
    NotAnObject,
    /// The envelope carries a version newer than this build understands.
    #[error("snapshot version {0} is newer than this build supports")]
    UnsupportedVersion(u64),
    /// The envelope version is not a number.
    #[error("snapshot version is not a positive integer")]
    InvalidVersion,
    /// A required field is absent.
    #[error("snapshot is missing `{0}`")]
    MissingField(&'static str),
    /// A field has an unexpected shape.
    #[error("snapshot field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Offending field.
        field: &'static str,
        /// What was expected.
        reason: &'static str,
    },
}

type Step = fn(Value, &Configuration) -> Result<Value, MigrationError>;

/// Upgrade steps indexed by source version.
const STEPS: [(u64, Step); 2] = [(1, v1_to_v2), (2, v2_to_v3)];

/// Split a raw snapshot into its version and match payload.
///
/// Blobs without an envelope are legacy v1 snapshots.
pub fn unwrap_envelope(raw: Value) -> Result<(u64, Value), MigrationError> {
    let Value::Object(mut object) = raw else {
        return Err(MigrationError::NotAnObject);
    };

    match object.remove("version") {
        None => {
            if !object.contains_key("roster") {
                return Err(MigrationError::MissingField("roster"));
            }
            Ok((1, Value::Object(object)))
        }
        Some(version) => {
            let version = version
                .as_u64()
                .filter(|v| *v >= 1)
                .ok_or(MigrationError::InvalidVersion)?;
            let payload = object
                .remove("match")
                .ok_or(MigrationError::MissingField("match"))?;
            Ok((version, payload))
        }
    }
}

/// Run every step needed to bring `raw` to [`CURRENT_VERSION`], returning the
/// match payload.
pub fn migrate(raw: Value, defaults: &Configuration) -> Result<Value, MigrationError> {
    let (version, mut payload) = unwrap_envelope(raw)?;
    if version > CURRENT_VERSION {
        return Err(MigrationError::UnsupportedVersion(version));
    }

    for (from, step) in STEPS {
        if version <= from {
            payload = step(payload, defaults)?;
        }
    }

    Ok(payload)
}

fn as_object(value: Value, field: &'static str) -> Result<Map<String, Value>, MigrationError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(MigrationError::InvalidField {
            field,
            reason: "expected an object",
        }),
    }
}

fn rename(object: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = object.remove(from) {
        object.entry(to.to_string()).or_insert(value);
    }
}

/// Legacy timestamps were RFC 3339 strings or epoch milliseconds. Anything
/// unreadable yields `None` and the field falls back to its default.
fn legacy_timestamp(value: &Value) -> Option<Value> {
    let nanos: i128 = match value {
        Value::Object(_) => return Some(value.clone()),
        Value::Number(millis) => i128::from(millis.as_u64()?) * 1_000_000,
        Value::String(text) => OffsetDateTime::parse(text, &Rfc3339)
            .ok()?
            .unix_timestamp_nanos(),
        _ => return None,
    };
    if nanos < 0 {
        return None;
    }
    Some(json!({
        "secs_since_epoch": u64::try_from(nanos / 1_000_000_000).ok()?,
        "nanos_since_epoch": (nanos % 1_000_000_000) as u32,
    }))
}

fn actor_key(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => number.as_u64().map(|n| n.to_string()),
        _ => None,
    }
}

/// v1 → v2: snake_case keys, per-period tallies, streak configuration.
pub fn v1_to_v2(payload: Value, defaults: &Configuration) -> Result<Value, MigrationError> {
    let mut object = as_object(payload, "match")?;

    rename(&mut object, "currentPeriod", "period");
    rename(&mut object, "readOnly", "read_only");
    rename(&mut object, "remoteId", "remote_id");
    rename(&mut object, "matchName", "name");
    rename(&mut object, "createdAt", "created_at");
    rename(&mut object, "viewCount", "view_count");
    if let Some(raw) = object.remove("created_at") {
        if let Some(created_at) = legacy_timestamp(&raw) {
            object.insert("created_at".into(), created_at);
        }
    }
    // Legacy undo history used a different event shape and is not carried over.
    object.remove("actionLog");

    object
        .entry("period")
        .or_insert_with(|| json!("first_half"));

    if let Some(tallies) = object.remove("tallies") {
        let tallies = as_object(tallies, "tallies")?;
        let mut bucketed = Map::new();
        for (actor, stats) in tallies {
            let stats = as_object(stats, "tallies")?;
            let already_bucketed = stats
                .keys()
                .all(|key| Period::ALL.iter().any(|p| period_key(*p) == key))
                && stats.values().all(Value::is_object);
            let per_period = if already_bucketed {
                Value::Object(stats)
            } else {
                json!({ "first_half": stats })
            };
            bucketed.insert(actor, per_period);
        }
        object.insert("tallies".into(), Value::Object(bucketed));
    }

    if let Some(shots) = object.remove("shots") {
        let Value::Array(shots) = shots else {
            return Err(MigrationError::InvalidField {
                field: "shots",
                reason: "expected an array",
            });
        };
        let upgraded = shots
            .into_iter()
            .enumerate()
            .map(|(index, shot)| upgrade_shot(index, shot))
            .collect::<Result<Vec<_>, _>>()?;
        object.insert("shots".into(), Value::Array(upgraded));
    }

    if !object.contains_key("config") {
        let hot_enabled = object
            .remove("hotStreakEnabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.hot_streak_enabled);
        let hot_threshold = object
            .remove("hotThreshold")
            .and_then(|v| v.as_u64())
            .unwrap_or(u64::from(defaults.hot_threshold));
        let cold_enabled = object
            .remove("coldStreakEnabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.cold_streak_enabled);
        let cold_threshold = object
            .remove("coldThreshold")
            .and_then(|v| v.as_u64())
            .unwrap_or(u64::from(defaults.cold_threshold));
        object.insert(
            "config".into(),
            json!({
                "hot_streak_enabled": hot_enabled,
                "hot_threshold": hot_threshold,
                "cold_streak_enabled": cold_enabled,
                "cold_threshold": cold_threshold,
            }),
        );
    }

    Ok(Value::Object(object))
}

fn period_key(period: Period) -> &'static str {
    match period {
        Period::FirstHalf => "first_half",
        Period::SecondHalf => "second_half",
        Period::Overtime => "overtime",
    }
}

fn upgrade_shot(index: usize, shot: Value) -> Result<Value, MigrationError> {
    let mut shot = as_object(shot, "shots")?;
    if shot.contains_key("position") {
        return Ok(Value::Object(shot));
    }

    let actor = shot
        .get("actor")
        .and_then(actor_key)
        .ok_or(MigrationError::MissingField("shots.actor"))?;
    let coordinate = |key: &'static str| {
        shot.get(key)
            .and_then(Value::as_f64)
            .ok_or(MigrationError::MissingField(key))
    };
    let (x, y) = (coordinate("x")?, coordinate("y")?);
    let made = shot.get("made").and_then(Value::as_bool).unwrap_or(false);
    let points = match (made, y < f64::from(ARC_THRESHOLD)) {
        (false, _) => 0,
        (true, true) => 3,
        (true, false) => 2,
    };
    let id = shot
        .remove("id")
        .and_then(|v| v.as_u64())
        .unwrap_or(index as u64 + 1);
    let period = shot
        .remove("period")
        .unwrap_or_else(|| json!("first_half"));

    Ok(json!({
        "id": id,
        "actor": actor,
        "period": period,
        "position": { "x": x, "y": y },
        "outcome": if made { "made" } else { "missed" },
        "points": points,
        "at": { "secs_since_epoch": 0, "nanos_since_epoch": 0 },
    }))
}

/// v2 → v3: collapse `shots`/`tallies` into the tagged `mode`.
pub fn v2_to_v3(payload: Value, _defaults: &Configuration) -> Result<Value, MigrationError> {
    let mut object = as_object(payload, "match")?;

    let is_shot_chart = object.remove("isShotChart").and_then(|v| v.as_bool());
    object.remove("lastSavedAt");
    let shots = object.remove("shots");
    let tallies = object.remove("tallies");

    if !object.contains_key("mode") {
        let shot_chart = is_shot_chart.unwrap_or_else(|| {
            shots
                .as_ref()
                .and_then(Value::as_array)
                .is_some_and(|list| !list.is_empty())
        });
        let mode = if shot_chart {
            json!({ "kind": "shot_chart", "shots": shots.unwrap_or_else(|| json!([])) })
        } else {
            json!({ "kind": "tally_sheet", "tallies": tallies.unwrap_or_else(|| json!({})) })
        };
        object.insert("mode".into(), mode);
    }

    object.entry("log").or_insert_with(|| json!([]));
    object.entry("redo").or_insert_with(|| json!([]));
    object.entry("streaks").or_insert_with(|| json!({}));
    object.entry("view_count").or_insert_with(|| json!(0));

    Ok(Value::Object(object))
}
