//! Per-room durable write queue.
//!
//! Rooms hand every state change to a [`PersistQueue`] and move on; a single
//! worker task writes the jobs in order with bounded retries. Jobs that target
//! the same field and are still waiting are coalesced so that only the newest
//! value is written.

use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::PersistPolicy,
    dao::models::{MatchStatus, SequenceEntity},
    dto::ws::ServerMessage,
    error::ServiceError,
    state::{SharedState, room::Outbox},
};

/// A durable write requested by a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistJob {
    /// Overwrite one player's stored sequence.
    Sequence {
        /// Player whose sequence is written.
        player: String,
        /// Encoded tokens to store.
        sequence: SequenceEntity,
    },
    /// Overwrite the match status and start instant.
    Status {
        /// New status.
        status: MatchStatus,
        /// Countdown start, once started.
        start: Option<SystemTime>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PersistKey {
    Sequence(String),
    Status,
}

impl PersistJob {
    fn key(&self) -> PersistKey {
        match self {
            PersistJob::Sequence { player, .. } => PersistKey::Sequence(player.clone()),
            PersistJob::Status { .. } => PersistKey::Status,
        }
    }

    fn player(&self) -> Option<&str> {
        match self {
            PersistJob::Sequence { player, .. } => Some(player),
            PersistJob::Status { .. } => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            PersistJob::Sequence { player, .. } => format!("sequence of `{player}`"),
            PersistJob::Status { .. } => "match status".to_string(),
        }
    }

    async fn write(&self, state: &SharedState, match_id: Uuid) -> Result<(), ServiceError> {
        let store = state.match_store().await.ok_or(ServiceError::Degraded)?;
        match self {
            PersistJob::Sequence { player, sequence } => {
                store
                    .save_sequence(match_id, player.clone(), sequence.clone())
                    .await?
            }
            PersistJob::Status { status, start } => {
                store.save_match_status(match_id, *status, *start).await?
            }
        }
        Ok(())
    }
}

struct QueuedJob {
    job: PersistJob,
    origin: Option<Outbox>,
}

/// Sending side of a room's persistence worker.
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    worker: JoinHandle<()>,
}

impl PersistQueue {
    /// Spawn the worker for `match_id`.
    pub fn spawn(state: SharedState, match_id: Uuid) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(state, match_id, rx));
        Self { tx, worker }
    }

    /// Queue a write. `origin` is told when the write finally fails.
    pub fn enqueue(&self, job: PersistJob, origin: Option<Outbox>) {
        if self.tx.send(QueuedJob { job, origin }).is_err() {
            warn!("persistence worker stopped; dropping durable write");
        }
    }

    /// Stop accepting jobs and wait until every queued job has been handled.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.worker.await {
            error!(error = %err, "persistence worker panicked");
        }
    }
}

async fn run(state: SharedState, match_id: Uuid, mut rx: mpsc::UnboundedReceiver<QueuedJob>) {
    let policy = state.config().persist;
    let mut pending: IndexMap<PersistKey, QueuedJob> = IndexMap::new();

    loop {
        if pending.is_empty() {
            match rx.recv().await {
                Some(queued) => {
                    pending.insert(queued.job.key(), queued);
                }
                None => break,
            }
        }
        // Anything that piled up while the previous write was in flight
        // collapses onto its key, keeping the first position.
        while let Ok(queued) = rx.try_recv() {
            pending.insert(queued.job.key(), queued);
        }

        if let Some((_, queued)) = pending.shift_remove_index(0) {
            persist_with_retry(&state, match_id, policy, queued).await;
        }
    }
}

async fn persist_with_retry(
    state: &SharedState,
    match_id: Uuid,
    policy: PersistPolicy,
    queued: QueuedJob,
) {
    let mut delay: Duration = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        match queued.job.write(state, match_id).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(match_id = %match_id, attempt, job = %queued.job.describe(), "durable write recovered");
                }
                return;
            }
            Err(err) if attempt >= policy.max_attempts => {
                error!(
                    match_id = %match_id,
                    attempts = attempt,
                    job = %queued.job.describe(),
                    error = %err,
                    "durable write failed; giving up"
                );
                if let Some(origin) = &queued.origin {
                    let _ = origin.send(ServerMessage::SaveFailed {
                        match_id,
                        player: queued.job.player().map(str::to_owned),
                        message: format!("could not save {}: {err}", queued.job.describe()),
                    });
                }
                return;
            }
            Err(err) => {
                warn!(
                    match_id = %match_id,
                    attempt,
                    job = %queued.job.describe(),
                    error = %err,
                    "durable write failed; retrying"
                );
                sleep(delay).await;
                delay = policy.next_backoff(delay);
                attempt += 1;
            }
        }
    }
}
