use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::MatchHeaderEntity;

pub const MATCH_PREFIX: &str = "match::";
pub const SHOTS_PREFIX: &str = "shots::";
pub const TALLIES_PREFIX: &str = "tallies::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Any document carrying a revision; used to fetch the current `_rev`.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub header: MatchHeaderEntity,
}

impl From<(MatchHeaderEntity, Option<String>)> for CouchMatchDocument {
    fn from((header, rev): (MatchHeaderEntity, Option<String>)) -> Self {
        Self {
            id: match_doc_id(header.id),
            rev,
            header,
        }
    }
}

impl CouchMatchDocument {
    /// Document overwriting `stored`: keeps its revision and view counter.
    pub fn replacing(mut header: MatchHeaderEntity, stored: Option<CouchMatchDocument>) -> Self {
        let rev = match stored {
            Some(stored) => {
                header.view_count = stored.header.view_count;
                stored.rev
            }
            None => {
                header.view_count = 0;
                None
            }
        };
        Self::from((header, rev))
    }
}

/// Detail rows of one match, stored as a single document so a save replaces
/// them atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRowsDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub rows: Vec<T>,
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{}{}", MATCH_PREFIX, id)
}

pub fn shots_doc_id(id: Uuid) -> String {
    format!("{}{}", SHOTS_PREFIX, id)
}

pub fn tallies_doc_id(id: Uuid) -> String {
    format!("{}{}", TALLIES_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::match_state::{Configuration, ModeKind, Period};

    #[test]
    fn header_document_is_flattened_under_prefixed_id() {
        let id = Uuid::new_v4();
        let now = SystemTime::now();
        let header = MatchHeaderEntity {
            id,
            name: "Semi".into(),
            mode: ModeKind::ShotChart,
            roster: Vec::new(),
            config: Configuration::default(),
            current_period: Period::SecondHalf,
            view_count: 2,
            created_at: now,
            updated_at: now,
        };

        let doc = CouchMatchDocument::from((header.clone(), None));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], format!("match::{id}"));
        assert!(json.get("_rev").is_none());
        assert_eq!(json["name"], "Semi");

        let back: CouchMatchDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back.header, header);
    }

    #[test]
    fn replacing_a_header_keeps_revision_and_views() {
        let id = Uuid::new_v4();
        let now = SystemTime::now();
        let header = MatchHeaderEntity {
            id,
            name: "Final".into(),
            mode: ModeKind::TallySheet,
            roster: Vec::new(),
            config: Configuration::default(),
            current_period: Period::FirstHalf,
            view_count: 0,
            created_at: now,
            updated_at: now,
        };
        let stored = CouchMatchDocument::from((
            MatchHeaderEntity {
                view_count: 5,
                ..header.clone()
            },
            Some("3-abc".into()),
        ));

        let doc = CouchMatchDocument::replacing(header.clone(), Some(stored));
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert_eq!(doc.header.view_count, 5);

        let fresh = CouchMatchDocument::replacing(
            MatchHeaderEntity {
                view_count: 7,
                ..header
            },
            None,
        );
        assert_eq!(fresh.rev, None);
        assert_eq!(fresh.header.view_count, 0);
    }
}
