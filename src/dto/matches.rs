use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{MatchEntity, MatchStatus},
    dto::{format_system_time, validation::validate_player_names},
    state::{
        lifecycle::MatchPhase,
        match_session::{MatchSession, phase_from_storage},
        scoring::Scoreboard,
        sequence::EncodedSequence,
    },
};

/// Payload used to create a new match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    /// Countdown length in minutes.
    #[validate(range(min = 1, max = 1440))]
    pub duration: u32,
    /// Participants, in display order.
    #[validate(length(min = 1), custom(function = "validate_player_names"))]
    pub players: Vec<String>,
}

/// Optional filter accepted by the listing route.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMatchesQuery {
    /// `ongoing` includes matches that were never started.
    pub status: Option<MatchStatus>,
}

/// Lifecycle phase as exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleMatchPhase {
    /// Created, countdown not started.
    Pending,
    /// Countdown running.
    Ongoing,
    /// Frozen.
    Completed,
}

impl From<MatchPhase> for VisibleMatchPhase {
    fn from(value: MatchPhase) -> Self {
        match value {
            MatchPhase::Pending => VisibleMatchPhase::Pending,
            MatchPhase::Ongoing { .. } => VisibleMatchPhase::Ongoing,
            MatchPhase::Completed { .. } => VisibleMatchPhase::Completed,
        }
    }
}

/// Row of the match listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchListItem {
    /// Match identifier.
    pub id: Uuid,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Countdown length in minutes.
    pub duration: u32,
    /// Pending, ongoing or completed.
    pub phase: VisibleMatchPhase,
    /// Participants in display order.
    pub players: Vec<String>,
    /// Countdown start (RFC 3339), once started.
    pub start_timestamp: Option<String>,
}

impl From<&MatchEntity> for MatchListItem {
    fn from(entity: &MatchEntity) -> Self {
        let phase = phase_from_storage(entity.status, entity.start_timestamp);
        Self {
            id: entity.id,
            created_at: format_system_time(entity.created_at),
            duration: entity.duration_minutes,
            phase: phase.into(),
            players: entity.players.clone(),
            start_timestamp: entity.start_timestamp.map(format_system_time),
        }
    }
}

/// Full state of a match: sent to clients when they join a room and
/// returned by the match detail route.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    /// Match identifier.
    pub match_id: Uuid,
    /// Last broadcast revision included in this snapshot; `0` when read from storage.
    pub revision: u64,
    /// Pending, ongoing or completed.
    pub phase: VisibleMatchPhase,
    /// Persisted status.
    pub status: MatchStatus,
    /// Countdown length in minutes.
    pub duration: u32,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Countdown start (RFC 3339), once started.
    pub start_timestamp: Option<String>,
    /// Seconds left on the countdown, recomputed from the wall clock.
    pub remaining_seconds: Option<u64>,
    /// Participants in display order.
    pub players: Vec<String>,
    /// Encoded sequence of every player, e.g. `{"Alice": ["+3", "-0"]}`.
    #[schema(value_type = Object)]
    pub sequences: IndexMap<String, EncodedSequence>,
    /// Players ranked by score.
    pub scoreboard: Scoreboard,
    /// Top-ranked player once the match is completed.
    pub winner: Option<String>,
}

impl MatchSnapshot {
    /// Capture a session and its sequences at `now`.
    pub fn capture(
        session: &MatchSession,
        sequences: IndexMap<String, EncodedSequence>,
        revision: u64,
        now: SystemTime,
    ) -> Self {
        let phase = session.phase();
        let scoreboard = Scoreboard::rank(&sequences);
        let winner = match phase {
            MatchPhase::Completed { .. } => scoreboard.winner().map(|row| row.player.clone()),
            _ => None,
        };

        Self {
            match_id: session.id,
            revision,
            phase: phase.into(),
            status: session.status(),
            duration: session.duration_minutes,
            created_at: format_system_time(session.created_at),
            start_timestamp: phase.started_at().map(format_system_time),
            remaining_seconds: session
                .lifecycle
                .remaining(now)
                .map(|remaining| remaining.as_secs()),
            players: session.players.clone(),
            sequences,
            scoreboard,
            winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lifecycle::MatchEvent;

    fn session() -> (MatchSession, IndexMap<String, EncodedSequence>) {
        MatchSession::from_entity(MatchEntity::new(1, vec!["Alice".into(), "Bob".into()]))
    }

    #[test]
    fn create_request_rejects_bad_rosters() {
        let valid = CreateMatchRequest {
            duration: 5,
            players: vec!["Alice".into()],
        };
        assert!(valid.validate().is_ok());

        let no_players = CreateMatchRequest {
            duration: 5,
            players: Vec::new(),
        };
        assert!(no_players.validate().is_err());

        let zero_duration = CreateMatchRequest {
            duration: 0,
            players: vec!["Alice".into()],
        };
        assert!(zero_duration.validate().is_err());
    }

    #[test]
    fn pending_snapshot_has_no_clock_and_no_winner() {
        let (session, sequences) = session();
        let snapshot = MatchSnapshot::capture(&session, sequences, 0, SystemTime::now());
        assert_eq!(snapshot.phase, VisibleMatchPhase::Pending);
        assert_eq!(snapshot.remaining_seconds, None);
        assert_eq!(snapshot.winner, None);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "ongoing");
        assert_eq!(json["sequences"]["Alice"], serde_json::json!([]));
        assert!(json["startTimestamp"].is_null());
    }

    #[test]
    fn completed_snapshot_names_the_winner() {
        let (mut session, mut sequences) = session();
        let start = SystemTime::now();
        session
            .lifecycle
            .apply(MatchEvent::Start { at: start })
            .unwrap();
        session
            .lifecycle
            .apply(MatchEvent::Complete {
                at: start,
                confirmed: true,
            })
            .unwrap();
        sequences.insert("Bob".into(), EncodedSequence::parse_lenient(["+4"]));

        let snapshot = MatchSnapshot::capture(&session, sequences, 7, start);
        assert_eq!(snapshot.phase, VisibleMatchPhase::Completed);
        assert_eq!(snapshot.status, MatchStatus::Completed);
        assert_eq!(snapshot.winner.as_deref(), Some("Bob"));
        assert_eq!(snapshot.remaining_seconds, Some(60));
    }
}
