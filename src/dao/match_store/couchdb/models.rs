use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use uuid::Uuid;

use crate::dao::{
    match_store::couchdb::error::CouchDaoError,
    models::{MatchEntity, MatchStatus, SequenceEntity},
};

pub const MATCH_PREFIX: &str = "match::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// One document per match; sequences are embedded keyed by player name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: MatchBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBody {
    pub created_at: SystemTime,
    pub duration_minutes: u32,
    pub players: Vec<String>,
    #[serde(default)]
    pub sequences: IndexMap<String, SequenceEntity>,
    pub status: MatchStatus,
    #[serde(default)]
    pub start_timestamp: Option<SystemTime>,
}

impl From<(MatchEntity, Option<String>)> for CouchMatchDocument {
    fn from((entity, rev): (MatchEntity, Option<String>)) -> Self {
        Self {
            id: match_doc_id(entity.id),
            rev,
            body: MatchBody {
                created_at: entity.created_at,
                duration_minutes: entity.duration_minutes,
                players: entity.players,
                sequences: entity.sequences,
                status: entity.status,
                start_timestamp: entity.start_timestamp,
            },
        }
    }
}

impl TryFrom<CouchMatchDocument> for MatchEntity {
    type Error = CouchDaoError;

    fn try_from(doc: CouchMatchDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: extract_uuid(&doc.id)?,
            created_at: doc.body.created_at,
            duration_minutes: doc.body.duration_minutes,
            players: doc.body.players,
            sequences: doc.body.sequences,
            status: doc.body.status,
            start_timestamp: doc.body.start_timestamp,
        })
    }
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{}{}", MATCH_PREFIX, id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}
