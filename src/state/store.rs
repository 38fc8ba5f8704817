//! Canonical in-memory sequences for live matches.
//!
//! Every mutation goes through [`SequenceStore`]; room dispatchers never touch
//! the maps directly. Unknown matches and players are answered with an empty
//! sequence rather than an error because clients routinely query before any
//! data exists.

use dashmap::DashMap;
use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::state::sequence::{EncodedSequence, Event};

/// Mutation refused because the match is not accepting writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sequences of match `{0}` are locked")]
pub struct SequenceLocked(pub Uuid);

/// Result of a mutation: the player's sequence after the change.
pub type MutationResult = Result<EncodedSequence, SequenceLocked>;

/// Keyed store holding the authoritative sequence of every (match, player).
pub trait SequenceStore: Send + Sync {
    /// Register a match with its players' sequences.
    fn open(&self, match_id: Uuid, sequences: IndexMap<String, EncodedSequence>, writable: bool);
    /// Drop every sequence of a match.
    fn close(&self, match_id: Uuid);
    /// Allow or refuse further mutations.
    fn set_writable(&self, match_id: Uuid, writable: bool);
    /// Current sequence of a player.
    fn get(&self, match_id: Uuid, player: &str) -> EncodedSequence;
    /// Append events at the tail of a player's sequence.
    fn append(&self, match_id: Uuid, player: &str, events: &[Event]) -> MutationResult;
    /// Remove the last event of a player's sequence.
    fn undo(&self, match_id: Uuid, player: &str) -> MutationResult;
    /// Replace a player's whole sequence.
    fn replace_all(&self, match_id: Uuid, player: &str, sequence: EncodedSequence)
    -> MutationResult;
    /// Every player's sequence, in player order.
    fn snapshot(&self, match_id: Uuid) -> IndexMap<String, EncodedSequence>;
}

#[derive(Debug, Default)]
struct MatchSequences {
    writable: bool,
    players: IndexMap<String, EncodedSequence>,
}

/// [`SequenceStore`] backed by a [`DashMap`]; each match entry is mutated under
/// its shard lock so two writes to the same match never interleave.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    matches: DashMap<Uuid, MatchSequences>,
}

impl InMemorySequenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, match_id: Uuid, player: &str, change: F) -> MutationResult
    where
        F: FnOnce(&mut EncodedSequence),
    {
        let Some(mut entry) = self.matches.get_mut(&match_id) else {
            return Ok(EncodedSequence::new());
        };
        if !entry.writable {
            return Err(SequenceLocked(match_id));
        }
        let Some(sequence) = entry.players.get_mut(player) else {
            return Ok(EncodedSequence::new());
        };
        change(sequence);
        Ok(sequence.clone())
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn open(&self, match_id: Uuid, sequences: IndexMap<String, EncodedSequence>, writable: bool) {
        self.matches.insert(
            match_id,
            MatchSequences {
                writable,
                players: sequences,
            },
        );
    }

    fn close(&self, match_id: Uuid) {
        self.matches.remove(&match_id);
    }

    fn set_writable(&self, match_id: Uuid, writable: bool) {
        if let Some(mut entry) = self.matches.get_mut(&match_id) {
            entry.writable = writable;
        }
    }

    fn get(&self, match_id: Uuid, player: &str) -> EncodedSequence {
        self.matches
            .get(&match_id)
            .and_then(|entry| entry.players.get(player).cloned())
            .unwrap_or_default()
    }

    fn append(&self, match_id: Uuid, player: &str, events: &[Event]) -> MutationResult {
        self.mutate(match_id, player, |sequence| {
            for event in events {
                sequence.append(*event);
            }
        })
    }

    fn undo(&self, match_id: Uuid, player: &str) -> MutationResult {
        self.mutate(match_id, player, EncodedSequence::undo_last)
    }

    fn replace_all(
        &self,
        match_id: Uuid,
        player: &str,
        sequence: EncodedSequence,
    ) -> MutationResult {
        self.mutate(match_id, player, |current| *current = sequence)
    }

    fn snapshot(&self, match_id: Uuid) -> IndexMap<String, EncodedSequence> {
        self.matches
            .get(&match_id)
            .map(|entry| entry.players.clone())
            .unwrap_or_default()
    }
}
