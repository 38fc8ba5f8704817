/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{MatchEntity, MatchStatus, SequenceEntity},
    storage::StorageResult,
};

/// Abstraction over the durable persistence of matches and their sequences.
pub trait MatchStore: Send + Sync {
    /// Insert or overwrite a whole match.
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a match, `None` when it does not exist.
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Every stored match.
    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Remove a match; `false` when it did not exist.
    fn delete_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Stored sequence of a player; empty when the match or player is unknown.
    fn load_sequence(
        &self,
        id: Uuid,
        player: String,
    ) -> BoxFuture<'static, StorageResult<SequenceEntity>>;
    /// Overwrite one player's stored sequence.
    fn save_sequence(
        &self,
        id: Uuid,
        player: String,
        sequence: SequenceEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite the status and start instant of a match.
    fn save_match_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        start_timestamp: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness probe of the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
