use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::models::{MatchEntity, MatchStatus},
    state::{
        lifecycle::{MatchLifecycle, MatchPhase},
        sequence::EncodedSequence,
    },
};

/// Live match metadata held by a room while clients are connected.
#[derive(Debug, Clone)]
pub struct MatchSession {
    /// Match identifier.
    pub id: Uuid,
    /// Creation time.
    pub created_at: SystemTime,
    /// Countdown length in minutes.
    pub duration_minutes: u32,
    /// Participants in display order.
    pub players: Vec<String>,
    /// Phase and countdown clock.
    pub lifecycle: MatchLifecycle,
}

impl MatchSession {
    /// Rebuild the session and its canonical sequences from a stored match.
    /// Players missing from the stored sequences start empty.
    pub fn from_entity(entity: MatchEntity) -> (Self, IndexMap<String, EncodedSequence>) {
        let phase = phase_from_storage(entity.status, entity.start_timestamp);
        let mut stored = entity.sequences;
        let sequences = entity
            .players
            .iter()
            .map(|player| {
                let sequence = stored
                    .swap_remove(player)
                    .map(EncodedSequence::parse_lenient)
                    .unwrap_or_default();
                (player.clone(), sequence)
            })
            .collect();

        let session = Self {
            id: entity.id,
            created_at: entity.created_at,
            duration_minutes: entity.duration_minutes,
            players: entity.players,
            lifecycle: MatchLifecycle::restore(phase, entity.duration_minutes),
        };
        (session, sequences)
    }

    /// Current phase of the match.
    pub fn phase(&self) -> MatchPhase {
        self.lifecycle.phase()
    }

    /// Persisted status matching the current phase.
    pub fn status(&self) -> MatchStatus {
        status_for_phase(self.phase())
    }

    /// Whether `player` takes part in this match.
    pub fn has_player(&self, player: &str) -> bool {
        self.players.iter().any(|candidate| candidate == player)
    }
}

/// Map the stored `(status, start)` pair onto a lifecycle phase.
pub fn phase_from_storage(status: MatchStatus, start: Option<SystemTime>) -> MatchPhase {
    match (status, start) {
        (MatchStatus::Ongoing, None) => MatchPhase::Pending,
        (MatchStatus::Ongoing, Some(started_at)) => MatchPhase::Ongoing { started_at },
        (MatchStatus::Completed, started_at) => MatchPhase::Completed { started_at },
    }
}

/// Persisted status for a phase; pending matches are stored as ongoing without a start.
pub fn status_for_phase(phase: MatchPhase) -> MatchStatus {
    match phase {
        MatchPhase::Pending | MatchPhase::Ongoing { .. } => MatchStatus::Ongoing,
        MatchPhase::Completed { .. } => MatchStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_sequences_are_canonicalized_in_player_order() {
        let mut entity = MatchEntity::new(5, vec!["Alice".into(), "Bob".into()]);
        entity.sequences.clear();
        entity.sequences.insert(
            "Bob".into(),
            vec!["+1".into(), "+2".into(), "oops".into(), "-0".into()],
        );

        let (session, sequences) = MatchSession::from_entity(entity);
        assert_eq!(sequences.keys().collect::<Vec<_>>(), ["Alice", "Bob"]);
        assert!(sequences["Alice"].is_empty());
        assert_eq!(sequences["Bob"].to_strings(), ["+3", "-0"]);
        assert_eq!(session.phase(), MatchPhase::Pending);
        assert!(session.has_player("Bob"));
        assert!(!session.has_player("bob"));
    }

    #[test]
    fn storage_status_round_trips_through_phases() {
        let start = SystemTime::now();
        for (status, started) in [
            (MatchStatus::Ongoing, None),
            (MatchStatus::Ongoing, Some(start)),
            (MatchStatus::Completed, Some(start)),
            (MatchStatus::Completed, None),
        ] {
            let phase = phase_from_storage(status, started);
            assert_eq!(status_for_phase(phase), status);
            assert_eq!(phase.started_at(), started);
        }
    }
}
