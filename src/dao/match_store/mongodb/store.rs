use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoMatchDocument, PlayerSequenceDocument, doc_id, player_sequence_filter},
};
use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, MatchStatus, SequenceEntity},
    storage::StorageResult,
};

const MATCH_COLLECTION_NAME: &str = "matches";

/// [`MatchStore`] backed by the `matches` collection. The database handle is
/// swapped in place when the supervisor asks for a reconnect.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = self.config.open().await?;
        *self.database.write().await = database;
        Ok(())
    }
}

fn status_name(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Ongoing => "ongoing",
        MatchStatus::Completed => "completed",
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = config.open().await?;
        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"status": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("match_status_created_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "status,created_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoMatchDocument> {
        self.inner
            .database
            .read()
            .await
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn save_match(&self, entity: MatchEntity) -> MongoResult<()> {
        let id = entity.id;
        let document: MongoMatchDocument = entity.into();
        let collection = self.collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;

        Ok(())
    }

    async fn find_match(&self, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let collection = self.collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { id, source })?;

        document.map(MatchEntity::try_from).transpose()
    }

    async fn list_matches(&self) -> MongoResult<Vec<MatchEntity>> {
        let collection = self.collection().await;

        let documents: Vec<MongoMatchDocument> = collection
            .find(doc! {})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?;

        documents.into_iter().map(MatchEntity::try_from).collect()
    }

    async fn delete_match(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.collection().await;
        let result = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteMatch { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn load_sequence(&self, id: Uuid, player: &str) -> MongoResult<SequenceEntity> {
        let Some(entity) = self.find_match(id).await? else {
            return Ok(Vec::new());
        };
        let mut sequences = entity.sequences;
        Ok(sequences.swap_remove(player).unwrap_or_default())
    }

    async fn save_sequence(
        &self,
        id: Uuid,
        player: String,
        sequence: SequenceEntity,
    ) -> MongoResult<()> {
        let collection = self.collection().await;
        let result = collection
            .update_one(
                player_sequence_filter(id, &player),
                doc! {"$set": {"sequences.$.tokens": sequence.clone()}},
            )
            .await
            .map_err(|source| MongoDaoError::SaveSequence {
                id,
                player: player.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            collection
                .update_one(
                    doc_id(id),
                    doc! {"$push": {"sequences": {"player": player.clone(), "tokens": sequence}}},
                )
                .await
                .map_err(|source| MongoDaoError::SaveSequence {
                    id,
                    player,
                    source,
                })?;
        }

        Ok(())
    }

    async fn save_match_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        start_timestamp: Option<SystemTime>,
    ) -> MongoResult<()> {
        let collection = self.collection().await;
        collection
            .update_one(
                doc_id(id),
                doc! {"$set": {
                    "status": status_name(status),
                    "start_timestamp": start_timestamp.map(DateTime::from_system_time),
                }},
            )
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;
        Ok(())
    }
}

impl MatchStore for MongoMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(entity).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(id).await.map_err(Into::into) })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_matches().await.map_err(Into::into) })
    }

    fn delete_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_match(id).await.map_err(Into::into) })
    }

    fn load_sequence(
        &self,
        id: Uuid,
        player: String,
    ) -> BoxFuture<'static, StorageResult<SequenceEntity>> {
        let store = self.clone();
        Box::pin(async move { store.load_sequence(id, &player).await.map_err(Into::into) })
    }

    fn save_sequence(
        &self,
        id: Uuid,
        player: String,
        sequence: SequenceEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_sequence(id, player, sequence)
                .await
                .map_err(Into::into)
        })
    }

    fn save_match_status(
        &self,
        id: Uuid,
        status: MatchStatus,
        start_timestamp: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_match_status(id, status, start_timestamp)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
