/// Match phases and transitions.
pub mod lifecycle;
/// Room-side view of a stored match.
pub mod match_session;
/// Match rooms and their dispatcher tasks.
pub mod room;
/// Derived player statistics and rankings.
pub mod scoring;
/// Run-length encoded hit/miss sequences.
pub mod sequence;
/// In-memory store of live sequences.
pub mod store;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::match_store::MatchStore,
    error::ServiceError,
    state::{
        room::RoomRegistry,
        store::{InMemorySequenceStore, SequenceStore},
    },
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, live sequences and match rooms.
pub struct AppState {
    config: AppConfig,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    sequences: Arc<dyn SequenceStore>,
    rooms: RoomRegistry,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::build(config, None)
    }

    /// Construct a state with a storage backend already installed.
    pub fn with_store(config: AppConfig, store: Arc<dyn MatchStore>) -> SharedState {
        Self::build(config, Some(store))
    }

    fn build(config: AppConfig, store: Option<Arc<dyn MatchStore>>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(store.is_none());
        Arc::new(Self {
            config,
            match_store: RwLock::new(store),
            sequences: Arc::new(InMemorySequenceStore::new()),
            rooms: RoomRegistry::new(),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Match store for request handlers; fails while degraded.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn set_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Canonical sequences of every live match.
    pub fn sequences(&self) -> &Arc<dyn SequenceStore> {
        &self.sequences
    }

    /// Live match rooms.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }
}
