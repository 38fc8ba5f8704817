//! Process-local [`MatchStore`] used when no database is configured and in tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, MatchStatus, SequenceEntity},
    storage::StorageResult,
};

/// Match documents kept in a concurrent map. Data is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    matches: Arc<DashMap<Uuid, MatchEntity>>,
}

impl MemoryMatchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for MemoryMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let matches = self.matches.clone();
        Box::pin(async move { Ok(matches.get(&id).map(|entry| entry.clone())) })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let matches = self.matches.clone();
        Box::pin(async move { Ok(matches.iter().map(|entry| entry.value().clone()).collect()) })
    }

    fn delete_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let matches = self.matches.clone();
        Box::pin(async move { Ok(matches.remove(&id).is_some()) })
    }

    fn load_sequence(
        &self,
        id: Uuid,
        player: String,
    ) -> BoxFuture<'static, StorageResult<SequenceEntity>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            Ok(matches
                .get(&id)
                .and_then(|entry| entry.sequences.get(&player).cloned())
                .unwrap_or_default())
        })
    }

    fn save_sequence(
        &self,
        id: Uuid,
        player: String,
        sequence: SequenceEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            if let Some(mut entry) = matches.get_mut(&id) {
                entry.sequences.insert(player, sequence);
            }
            Ok(())
        })
    }

    fn save_match_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        start_timestamp: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            if let Some(mut entry) = matches.get_mut(&id) {
                entry.status = status;
                entry.start_timestamp = start_timestamp;
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
