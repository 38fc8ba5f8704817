use indexmap::IndexMap;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{MatchEntity, MatchStatus, SequenceEntity};

/// Sequences are stored as an array so player names never end up in field paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSequenceDocument {
    pub player: String,
    pub tokens: SequenceEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: String,
    created_at: DateTime,
    duration_minutes: u32,
    players: Vec<String>,
    #[serde(default)]
    sequences: Vec<PlayerSequenceDocument>,
    status: MatchStatus,
    #[serde(default)]
    start_timestamp: Option<DateTime>,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
            duration_minutes: value.duration_minutes,
            players: value.players,
            sequences: value
                .sequences
                .into_iter()
                .map(|(player, tokens)| PlayerSequenceDocument { player, tokens })
                .collect(),
            status: value.status,
            start_timestamp: value.start_timestamp.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoMatchDocument> for MatchEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| MongoDaoError::InvalidId { raw: value.id.clone() })?;
        Ok(Self {
            id,
            created_at: value.created_at.to_system_time(),
            duration_minutes: value.duration_minutes,
            players: value.players,
            sequences: value
                .sequences
                .into_iter()
                .map(|entry| (entry.player, entry.tokens))
                .collect::<IndexMap<_, _>>(),
            status: value.status,
            start_timestamp: value.start_timestamp.map(DateTime::to_system_time),
        })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

/// Filter selecting the array element holding `player`'s sequence.
pub fn player_sequence_filter(id: Uuid, player: &str) -> Document {
    doc! {"_id": id.to_string(), "sequences.player": player}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_map_back_to_the_same_entity() {
        let mut entity = MatchEntity::new(2, vec!["Alice".into(), "Bob".into()]);
        entity.sequences.insert("Bob".into(), vec!["+1".into()]);
        // bson datetimes have millisecond precision
        let millis = DateTime::from_system_time(entity.created_at);
        entity.created_at = millis.to_system_time();

        let doc = MongoMatchDocument::from(entity.clone());
        let back = MatchEntity::try_from(doc).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn player_names_stay_out_of_field_paths() {
        let id = Uuid::new_v4();
        let filter = player_sequence_filter(id, "Dr. $mith");
        assert_eq!(filter.get_str("sequences.player").unwrap(), "Dr. $mith");
        assert_eq!(filter.get_str("_id").unwrap(), id.to_string());
    }
}
