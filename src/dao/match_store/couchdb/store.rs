use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, MatchStatus, SequenceEntity},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{AllDocsResponse, CouchMatchDocument, END_SUFFIX, MATCH_PREFIX, match_doc_id},
};

const ALL_DOCS: &str = "_all_docs";

/// [`MatchStore`] keeping one CouchDB document per match.
///
/// Every write goes through a read of the current `_rev`; a concurrent writer
/// makes CouchDB answer 409, which is reported as a storage conflict so the
/// persistence worker retries with fresh data.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    database_url: Arc<str>,
    credentials: Option<Arc<(String, String)>>,
}

impl CouchMatchStore {
    /// Build the HTTP client and create the database when it does not exist.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::Client { source })?;
        let database_url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.database
        );

        let store = Self {
            client,
            database_url: database_url.into(),
            credentials: config.credentials.map(Arc::new),
        };
        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: Option<&str>) -> RequestBuilder {
        let url = match path {
            Some(path) => format!("{}/{}", self.database_url, path),
            None => self.database_url.to_string(),
        };
        let builder = self.client.request(method, url);
        match self.credentials.as_deref() {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    /// Send a request, mapping transport failures, 409 and other non-2xx
    /// answers. `tolerated` statuses are handed back to the caller.
    async fn send(
        &self,
        path: &str,
        builder: RequestBuilder,
        tolerated: &[StatusCode],
    ) -> CouchResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() || tolerated.contains(&status) => Ok(response),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: path.to_string(),
            }),
            status => Err(CouchDaoError::UnexpectedStatus {
                path: path.to_string(),
                status,
            }),
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let path = self.database_url.to_string();
        let response = self
            .send(&path, self.request(Method::GET, None), &[StatusCode::NOT_FOUND])
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.send(&path, self.request(Method::PUT, None), &[]).await?;
        }
        Ok(())
    }

    async fn get_document<T: DeserializeOwned>(&self, doc_id: &str) -> CouchResult<Option<T>> {
        let response = self
            .send(
                doc_id,
                self.request(Method::GET, Some(doc_id)),
                &[StatusCode::NOT_FOUND],
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|source| CouchDaoError::Decode {
                path: doc_id.to_string(),
                source,
            })
    }

    async fn put_document<T: ?Sized + Serialize>(&self, doc_id: &str, doc: &T) -> CouchResult<()> {
        self.send(doc_id, self.request(Method::PUT, Some(doc_id)).json(doc), &[])
            .await
            .map(drop)
    }

    async fn list_match_documents(&self) -> CouchResult<Vec<CouchMatchDocument>> {
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{MATCH_PREFIX}\"")),
            ("endkey", format!("\"{MATCH_PREFIX}{END_SUFFIX}\"")),
        ];
        let response = self
            .send(
                ALL_DOCS,
                self.request(Method::GET, Some(ALL_DOCS)).query(&query),
                &[],
            )
            .await?;
        let payload = response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::Decode {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .map(|(id, doc)| {
                serde_json::from_value(doc)
                    .map_err(|source| CouchDaoError::Deserialize { path: id, source })
            })
            .collect()
    }

    /// Apply `change` to the latest revision of a match and write it back.
    async fn modify_match<F>(&self, id: Uuid, change: F) -> CouchResult<()>
    where
        F: FnOnce(&mut CouchMatchDocument),
    {
        let doc_id = match_doc_id(id);
        let Some(mut doc) = self.get_document::<CouchMatchDocument>(&doc_id).await? else {
            warn!(match_id = %id, "skipping write for unknown match document");
            return Ok(());
        };
        change(&mut doc);
        self.put_document(&doc_id, &doc).await
    }
}

impl MatchStore for CouchMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = match_doc_id(entity.id);
            let rev = store
                .get_document::<CouchMatchDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchMatchDocument::from((entity, rev));
            Ok(store.put_document(&doc_id, &doc).await?)
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchMatchDocument>(&match_doc_id(id))
                .await?;
            Ok(doc.map(MatchEntity::try_from).transpose()?)
        })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store.list_match_documents().await?;
            Ok(docs
                .into_iter()
                .map(MatchEntity::try_from)
                .collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn delete_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = match_doc_id(id);
            let rev = store
                .get_document::<CouchMatchDocument>(&doc_id)
                .await?
                .and_then(|doc| doc.rev);
            let Some(rev) = rev else {
                return Ok(false);
            };
            store
                .send(
                    &doc_id,
                    store
                        .request(Method::DELETE, Some(&doc_id))
                        .query(&[("rev", rev)]),
                    &[],
                )
                .await?;
            Ok(true)
        })
    }

    fn load_sequence(
        &self,
        id: Uuid,
        player: String,
    ) -> BoxFuture<'static, StorageResult<SequenceEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchMatchDocument>(&match_doc_id(id))
                .await?;
            Ok(doc
                .and_then(|mut doc| doc.body.sequences.swap_remove(&player))
                .unwrap_or_default())
        })
    }

    fn save_sequence(
        &self,
        id: Uuid,
        player: String,
        sequence: SequenceEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .modify_match(id, |doc| {
                    doc.body.sequences.insert(player, sequence);
                })
                .await?)
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
            Ok(store
                .modify_match(id, |doc| {
                    doc.body.status = status;
                    doc.body.start_timestamp = start_timestamp;
                })
                .await?)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = store.database_url.to_string();
            store
                .send(&path, store.request(Method::GET, None), &[])
                .await?;
            Ok(())
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.ensure_database().await?) })
    }
}
