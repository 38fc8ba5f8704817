use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::models::MatchStatus,
    dto::matches::MatchSnapshot,
    state::{
        scoring::Scoreboard,
        sequence::{EncodedSequence, Event},
    },
};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
/// Messages accepted from WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Subscribe to a match room; answered with a snapshot.
    Join {
        /// Match to follow.
        match_id: Uuid,
    },
    /// Start the countdown. Any client-supplied timestamp is ignored.
    Start {},
    /// Freeze the match.
    Complete {
        /// Required to complete before the countdown reaches zero.
        #[serde(default)]
        confirmed: bool,
    },
    /// Replace every player's sequence. Maps missing a player are rejected.
    Sequences {
        /// New sequence of each player of the match.
        sequences: IndexMap<String, EncodedSequence>,
    },
    /// Append events at the tail of a player's sequence.
    Append {
        /// Target player.
        player: String,
        /// Events in recording order.
        events: Vec<Event>,
    },
    /// Remove the last event of a player's sequence.
    Undo {
        /// Target player.
        player: String,
    },
    /// Any other `type`; answered with a rejection.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Start {} => "start",
            Self::Complete { .. } => "complete",
            Self::Sequences { .. } => "sequences",
            Self::Append { .. } => "append",
            Self::Undo { .. } => "undo",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// Messages pushed to room subscribers. Broadcast variants carry the room
/// `revision` so clients can detect a gap and re-join.
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full state, sent on join.
    Snapshot(MatchSnapshot),
    /// The countdown started.
    Start {
        /// Match concerned.
        match_id: Uuid,
        /// Room revision of this broadcast.
        revision: u64,
        /// Server time of the update (RFC 3339).
        timestamp: String,
        /// Instant the countdown started (RFC 3339).
        start_timestamp: String,
        /// Seconds left on the countdown.
        remaining_seconds: u64,
    },
    /// Every player's sequence was replaced.
    Sequences {
        /// Match concerned.
        match_id: Uuid,
        /// Room revision of this broadcast.
        revision: u64,
        /// Server time of the update (RFC 3339).
        timestamp: String,
        /// Sequences after the replacement.
        sequences: IndexMap<String, EncodedSequence>,
        /// Ranking after the replacement.
        scoreboard: Scoreboard,
    },
    /// Events were appended to one player's sequence.
    Append {
        /// Match concerned.
        match_id: Uuid,
        /// Room revision of this broadcast.
        revision: u64,
        /// Server time of the update (RFC 3339).
        timestamp: String,
        /// Player whose sequence grew.
        player: String,
        /// Events appended, in order.
        events: Vec<Event>,
        /// Player's whole sequence after the append.
        sequence: EncodedSequence,
        /// Ranking after the append.
        scoreboard: Scoreboard,
    },
    /// The last event of one player's sequence was removed.
    Undo {
        /// Match concerned.
        match_id: Uuid,
        /// Room revision of this broadcast.
        revision: u64,
        /// Server time of the update (RFC 3339).
        timestamp: String,
        /// Player whose sequence shrank.
        player: String,
        /// Player's whole sequence after the undo.
        sequence: EncodedSequence,
        /// Ranking after the undo.
        scoreboard: Scoreboard,
    },
    /// Terminal: the match is now read-only.
    Complete {
        /// Match concerned.
        match_id: Uuid,
        /// Room revision of this broadcast.
        revision: u64,
        /// Server time of the update (RFC 3339).
        timestamp: String,
        /// Always `completed`.
        status: MatchStatus,
        /// Final sequences.
        sequences: IndexMap<String, EncodedSequence>,
        /// Final ranking.
        scoreboard: Scoreboard,
        /// Top-ranked player, if any.
        winner: Option<String>,
    },
    /// Sent only to the client whose request was refused.
    Rejected {
        /// Match the request targeted, when known.
        match_id: Option<Uuid>,
        /// Wire name of the refused request.
        request: String,
        /// Human-readable cause.
        reason: String,
    },
    /// A durable write failed after every retry; resubmitting is safe.
    SaveFailed {
        /// Match whose write failed.
        match_id: Uuid,
        /// Player whose sequence was not saved; `None` for status writes.
        player: Option<String>,
        /// Last storage error.
        message: String,
    },
}

impl ServerMessage {
    /// Wire name of the message type, also used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Start { .. } => "start",
            Self::Sequences { .. } => "sequences",
            Self::Append { .. } => "append",
            Self::Undo { .. } => "undo",
            Self::Complete { .. } => "complete",
            Self::Rejected { .. } => "rejected",
            Self::SaveFailed { .. } => "saveFailed",
        }
    }

    /// Room revision carried by snapshots and broadcasts.
    pub fn revision(&self) -> Option<u64> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot.revision),
            Self::Start { revision, .. }
            | Self::Sequences { revision, .. }
            | Self::Append { revision, .. }
            | Self::Undo { revision, .. }
            | Self::Complete { revision, .. } => Some(*revision),
            Self::Rejected { .. } | Self::SaveFailed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_camel_case_tags_and_fields() {
        let id = Uuid::new_v4();
        let join: ClientMessage =
            serde_json::from_str(&format!(r#"{{"type":"join","matchId":"{id}"}}"#)).unwrap();
        assert_eq!(join, ClientMessage::Join { match_id: id });

        let append: ClientMessage =
            serde_json::from_str(r#"{"type":"append","player":"Alice","events":["hit","miss"]}"#)
                .unwrap();
        assert_eq!(
            append,
            ClientMessage::Append {
                player: "Alice".into(),
                events: vec![Event::Hit, Event::Miss],
            }
        );

        let start: ClientMessage =
            serde_json::from_str(r#"{"type":"start","startTimestamp":123}"#).unwrap();
        assert_eq!(start, ClientMessage::Start {});

        let complete: ClientMessage = serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        assert_eq!(complete, ClientMessage::Complete { confirmed: false });
    }

    #[test]
    fn replaced_sequences_are_parsed_leniently() {
        let message: ClientMessage = serde_json::from_str(
            r#"{"type":"sequences","sequences":{"Alice":["+1","+2","bogus","-0"]}}"#,
        )
        .unwrap();
        let ClientMessage::Sequences { sequences } = message else {
            panic!("expected a sequences message");
        };
        assert_eq!(sequences["Alice"].to_strings(), ["+3", "-0"]);
    }

    #[test]
    fn unknown_types_do_not_fail_parsing() {
        let message: ClientMessage = serde_json::from_str(r#"{"type":"dance"}"#).unwrap();
        assert_eq!(message, ClientMessage::Unknown);
    }

    #[test]
    fn server_messages_are_tagged_with_their_kind() {
        let message = ServerMessage::Undo {
            match_id: Uuid::nil(),
            revision: 4,
            timestamp: "2024-01-01T00:00:00Z".into(),
            player: "Alice".into(),
            sequence: EncodedSequence::parse_lenient(["+2"]),
            scoreboard: Scoreboard::default(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "undo");
        assert_eq!(json["matchId"], Uuid::nil().to_string());
        assert_eq!(json["sequence"], serde_json::json!(["+2"]));
        assert_eq!(message.revision(), Some(4));

        let failed = ServerMessage::SaveFailed {
            match_id: Uuid::nil(),
            player: None,
            message: "down".into(),
        };
        assert_eq!(serde_json::to_value(&failed).unwrap()["type"], "saveFailed");
    }
}
