use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Persisted status of a match. A match whose status is `ongoing` but has no
/// start timestamp has not started yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Not yet completed (pending or running).
    Ongoing,
    /// Frozen and read-only.
    Completed,
}

/// Wire form of an encoded sequence as stored (`["+3", "-0"]`).
pub type SequenceEntity = Vec<String>;

/// Aggregate match entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Countdown length in minutes.
    pub duration_minutes: u32,
    /// Participants in display order, fixed at creation.
    pub players: Vec<String>,
    /// Encoded sequence of each player.
    pub sequences: IndexMap<String, SequenceEntity>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Instant the countdown started, if it did.
    pub start_timestamp: Option<SystemTime>,
}

impl MatchEntity {
    /// Build a fresh match with empty sequences for every player.
    pub fn new(duration_minutes: u32, players: Vec<String>) -> Self {
        let sequences = players
            .iter()
            .map(|player| (player.clone(), Vec::new()))
            .collect();
        Self {
            id: Uuid::new_v4(),
            created_at: SystemTime::now(),
            duration_minutes,
            players,
            sequences,
            status: MatchStatus::Ongoing,
            start_timestamp: None,
        }
    }

    /// Whether the countdown was never started.
    pub fn is_pending(&self) -> bool {
        self.status == MatchStatus::Ongoing && self.start_timestamp.is_none()
    }
}
