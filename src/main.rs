//! hitstreak-back binary entrypoint wiring REST, WebSocket, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hitstreak_back::{
    config::AppConfig,
    dao::match_store::memory::MemoryMatchStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".into());
    let app_state = build_state(config, &backend)?;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, backend = %backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Create the shared state and start the storage supervisor for database backends.
fn build_state(config: AppConfig, backend: &str) -> anyhow::Result<SharedState> {
    match backend {
        "memory" => Ok(AppState::with_store(
            config,
            Arc::new(MemoryMatchStore::new()),
        )),
        #[cfg(feature = "couch-store")]
        "couch" => {
            use hitstreak_back::dao::{
                match_store::{MatchStore, couchdb::{CouchConfig, CouchMatchStore}},
                storage::StorageError,
            };
            use hitstreak_back::services::storage_supervisor;

            let couch_config = CouchConfig::from_env().context("reading CouchDB settings")?;
            let state = AppState::new(config);
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let couch_config = couch_config.clone();
                async move {
                    let store = CouchMatchStore::connect(couch_config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }));
            Ok(state)
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use hitstreak_back::dao::{
                match_store::{MatchStore, mongodb::{MongoConfig, MongoMatchStore}},
                storage::StorageError,
            };
            use hitstreak_back::services::storage_supervisor;

            let state = AppState::new(config);
            tokio::spawn(storage_supervisor::run(state.clone(), || async {
                let mongo_config = MongoConfig::from_env().await.map_err(StorageError::from)?;
                let store = MongoMatchStore::connect(mongo_config)
                    .await
                    .map_err(StorageError::from)?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
            }));
            Ok(state)
        }
        other => anyhow::bail!("unsupported STORAGE_BACKEND `{other}`"),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
