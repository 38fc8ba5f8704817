//! Match rooms.
//!
//! Every live match has one dispatcher task that owns the match session and
//! consumes a command channel. Joins, updates and snapshots are handled to
//! completion one at a time, so a join always sees a snapshot consistent with
//! the broadcasts that follow it, and two updates for the same match never
//! interleave. Results are fanned out on a broadcast channel to every
//! subscriber, the sender included.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use indexmap::IndexMap;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{MatchEntity, MatchStatus},
    dto::{format_system_time, matches::MatchSnapshot, ws::{ClientMessage, ServerMessage}},
    error::{ServiceError, UpdateRejection},
    services::persistence::{PersistJob, PersistQueue},
    state::{
        SharedState,
        lifecycle::{MatchEvent, MatchPhase},
        match_session::MatchSession,
        scoring::Scoreboard,
        sequence::{EncodedSequence, Event},
        store::SequenceStore,
    },
};

/// Direct channel to one client, for messages that must not reach the room.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

const JOIN_ATTEMPTS: usize = 3;

/// A mutation submitted by a room member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchUpdate {
    /// Start the countdown.
    Start,
    /// Freeze the match.
    Complete {
        /// Completion before the deadline was confirmed.
        confirmed: bool,
    },
    /// Replace the sequence of every player.
    ReplaceSequences(IndexMap<String, EncodedSequence>),
    /// Append events to one player's sequence.
    Append {
        /// Target player.
        player: String,
        /// Events in recording order.
        events: Vec<Event>,
    },
    /// Remove the last event of one player's sequence.
    Undo {
        /// Target player.
        player: String,
    },
}

impl MatchUpdate {
    /// Convert a client message; `None` for messages that are not updates.
    pub fn from_client(message: ClientMessage) -> Option<Self> {
        match message {
            ClientMessage::Start {} => Some(Self::Start),
            ClientMessage::Complete { confirmed } => Some(Self::Complete { confirmed }),
            ClientMessage::Sequences { sequences } => Some(Self::ReplaceSequences(sequences)),
            ClientMessage::Append { player, events } => Some(Self::Append { player, events }),
            ClientMessage::Undo { player } => Some(Self::Undo { player }),
            ClientMessage::Join { .. } | ClientMessage::Unknown => None,
        }
    }

    /// Wire name of the update.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete { .. } => "complete",
            Self::ReplaceSequences(_) => "sequences",
            Self::Append { .. } => "append",
            Self::Undo { .. } => "undo",
        }
    }
}

/// Result of joining a room: the state at join time and every broadcast after it.
pub struct Subscription {
    /// Room state when the join was handled.
    pub snapshot: MatchSnapshot,
    /// Every broadcast published after the snapshot.
    pub receiver: broadcast::Receiver<Arc<ServerMessage>>,
}

enum RoomCommand {
    Join {
        client: Uuid,
        outbox: Option<Outbox>,
        reply: oneshot::Sender<Subscription>,
    },
    Leave {
        client: Uuid,
    },
    Update {
        client: Uuid,
        update: MatchUpdate,
        reply: oneshot::Sender<Result<u64, UpdateRejection>>,
    },
    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },
}

/// Cloneable address of a running room.
#[derive(Clone)]
pub struct RoomHandle {
    match_id: Uuid,
    instance: Uuid,
    commands: mpsc::Sender<RoomCommand>,
    closed: watch::Receiver<bool>,
}

impl RoomHandle {
    /// Match served by this room.
    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// Subscribe `client`; `outbox` receives rejections and save failures.
    pub async fn join(
        &self,
        client: Uuid,
        outbox: Option<Outbox>,
    ) -> Result<Subscription, UpdateRejection> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join {
                client,
                outbox,
                reply,
            })
            .await
            .map_err(|_| UpdateRejection::RoomClosed)?;
        response.await.map_err(|_| UpdateRejection::RoomClosed)
    }

    /// Unsubscribe `client`. The room closes once its last member leaves,
    /// unless the countdown is running.
    pub async fn leave(&self, client: Uuid) {
        let _ = self.commands.send(RoomCommand::Leave { client }).await;
    }

    /// Apply an update, returning the revision of the resulting broadcast.
    pub async fn update(&self, client: Uuid, update: MatchUpdate) -> Result<u64, UpdateRejection> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Update {
                client,
                update,
                reply,
            })
            .await
            .map_err(|_| UpdateRejection::RoomClosed)?;
        response.await.map_err(|_| UpdateRejection::RoomClosed)?
    }

    /// Current state of the room.
    pub async fn snapshot(&self) -> Result<MatchSnapshot, UpdateRejection> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Snapshot { reply })
            .await
            .map_err(|_| UpdateRejection::RoomClosed)?;
        response.await.map_err(|_| UpdateRejection::RoomClosed)
    }

    /// Resolve once the room has flushed its durable writes and released the match.
    pub async fn wait_closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

/// Live rooms keyed by match id.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
    deleting: DashSet<Uuid>,
}

/// Keeps rooms of a match from opening while it is being deleted.
pub struct DeletionGuard<'a> {
    registry: &'a RoomRegistry,
    match_id: Uuid,
}

impl Drop for DeletionGuard<'_> {
    fn drop(&mut self) {
        self.registry.deleting.remove(&self.match_id);
    }
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the live room for `match_id`, if any.
    pub fn get(&self, match_id: Uuid) -> Option<RoomHandle> {
        self.rooms.get(&match_id).map(|entry| entry.clone())
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is live.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Block new rooms for `match_id` until the guard drops. `None` when a
    /// room is live or another deletion is in flight.
    pub fn reserve_deletion(&self, match_id: Uuid) -> Option<DeletionGuard<'_>> {
        // The vacant entry holds the shard lock that `open_room` takes too.
        match self.rooms.entry(match_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(_) => self.deleting.insert(match_id).then(|| DeletionGuard {
                registry: self,
                match_id,
            }),
        }
    }

    fn remove_instance(&self, match_id: Uuid, instance: Uuid) {
        self.rooms
            .remove_if(&match_id, |_, handle| handle.instance == instance);
    }
}

/// Join the room of `match_id`, opening it from storage when needed.
pub async fn join_room(
    state: &SharedState,
    match_id: Uuid,
    client: Uuid,
    outbox: Option<Outbox>,
) -> Result<(RoomHandle, Subscription), UpdateRejection> {
    for _ in 0..JOIN_ATTEMPTS {
        let handle = open_room(state, match_id)
            .await
            .map_err(|err| match err {
                ServiceError::NotFound(_) => UpdateRejection::UnknownMatch(match_id),
                other => other.into(),
            })?;

        match handle.join(client, outbox.clone()).await {
            Ok(subscription) => return Ok((handle, subscription)),
            Err(UpdateRejection::RoomClosed) => {
                // The room is shutting down; reopen once its writes are flushed.
                handle.wait_closed().await;
                state.rooms().remove_instance(match_id, handle.instance);
            }
            Err(other) => return Err(other),
        }
    }

    Err(UpdateRejection::RoomClosed)
}

/// Snapshot of the live room for `match_id`, if one is open.
pub async fn live_snapshot(state: &SharedState, match_id: Uuid) -> Option<MatchSnapshot> {
    let handle = state.rooms().get(match_id)?;
    match handle.snapshot().await {
        Ok(snapshot) => Some(snapshot),
        Err(_) => {
            handle.wait_closed().await;
            None
        }
    }
}

async fn open_room(state: &SharedState, match_id: Uuid) -> Result<RoomHandle, ServiceError> {
    if let Some(handle) = state.rooms().get(match_id) {
        return Ok(handle);
    }

    let store = state.require_match_store().await?;
    let entity = store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}` not found")))?;

    let handle = match state.rooms().rooms.entry(match_id) {
        Entry::Occupied(existing) => existing.get().clone(),
        Entry::Vacant(_) if state.rooms().deleting.contains(&match_id) => {
            return Err(ServiceError::NotFound(format!("match `{match_id}` is being deleted")));
        }
        Entry::Vacant(slot) => {
            let handle = Room::spawn(state.clone(), entity);
            slot.insert(handle.clone());
            handle
        }
    };
    Ok(handle)
}

struct Room {
    session: MatchSession,
    revision: u64,
    sequences: Arc<dyn SequenceStore>,
    broadcaster: broadcast::Sender<Arc<ServerMessage>>,
    members: HashMap<Uuid, Option<Outbox>>,
    persist: PersistQueue,
}

impl Room {
    fn spawn(state: SharedState, entity: MatchEntity) -> RoomHandle {
        let (session, sequences) = MatchSession::from_entity(entity);
        let match_id = session.id;
        let writable = matches!(session.phase(), MatchPhase::Ongoing { .. });
        state.sequences().open(match_id, sequences, writable);

        let config = state.config();
        let (commands_tx, commands_rx) = mpsc::channel(config.room_command_capacity);
        let (broadcaster, _) = broadcast::channel(config.room_broadcast_capacity);
        let (closed_tx, closed_rx) = watch::channel(false);
        let instance = Uuid::new_v4();

        let room = Room {
            session,
            revision: 0,
            sequences: state.sequences().clone(),
            broadcaster,
            members: HashMap::new(),
            persist: PersistQueue::spawn(state.clone(), match_id),
        };
        tokio::spawn(room.run(state, instance, commands_rx, closed_tx));
        info!(match_id = %match_id, "match room opened");

        RoomHandle {
            match_id,
            instance,
            commands: commands_tx,
            closed: closed_rx,
        }
    }

    async fn run(
        mut self,
        state: SharedState,
        instance: Uuid,
        mut commands: mpsc::Receiver<RoomCommand>,
        closed: watch::Sender<bool>,
    ) {
        let match_id = self.session.id;

        loop {
            let command = tokio::select! {
                command = commands.recv() => command,
                () = countdown_elapsed(self.countdown_expiry()) => {
                    if self.members.is_empty() {
                        info!(match_id = %match_id, "countdown elapsed in an empty room");
                        break;
                    }
                    continue;
                }
            };
            let Some(command) = command else {
                break;
            };

            let shrank = match command {
                RoomCommand::Join {
                    client,
                    outbox,
                    reply,
                } => {
                    let receiver = self.broadcaster.subscribe();
                    let snapshot = self.snapshot();
                    self.members.insert(client, outbox);
                    if reply.send(Subscription { snapshot, receiver }).is_err() {
                        self.members.remove(&client);
                        true
                    } else {
                        info!(match_id = %match_id, client = %client, members = self.members.len(), "client joined match room");
                        false
                    }
                }
                RoomCommand::Leave { client } => {
                    if self.members.remove(&client).is_some() {
                        info!(match_id = %match_id, client = %client, members = self.members.len(), "client left match room");
                    }
                    true
                }
                RoomCommand::Update {
                    client,
                    update,
                    reply,
                } => {
                    let request = update.kind();
                    let result = self.apply(client, update);
                    if let Err(err) = &result {
                        warn!(match_id = %match_id, client = %client, request, error = %err, "rejected match update");
                    }
                    let _ = reply.send(result);
                    false
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                    false
                }
            };

            let running = self.session.lifecycle.countdown_running(SystemTime::now());
            if shrank && self.members.is_empty() && !running {
                break;
            }
        }

        // Queued commands are dropped unanswered; their senders see the room as closed.
        commands.close();
        while commands.try_recv().is_ok() {}

        self.persist.shutdown().await;
        state.sequences().close(match_id);
        state.rooms().remove_instance(match_id, instance);
        let _ = closed.send(true);
        info!(match_id = %match_id, "match room closed");
    }

    /// Instant the running countdown reaches zero, if it is running.
    fn countdown_expiry(&self) -> Option<Instant> {
        let now = SystemTime::now();
        if !self.session.lifecycle.countdown_running(now) {
            return None;
        }
        let remaining = self.session.lifecycle.remaining(now)?;
        Some(Instant::now() + remaining)
    }

    fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot::capture(
            &self.session,
            self.sequences.snapshot(self.session.id),
            self.revision,
            SystemTime::now(),
        )
    }

    fn apply(&mut self, client: Uuid, update: MatchUpdate) -> Result<u64, UpdateRejection> {
        let origin = self
            .members
            .get(&client)
            .ok_or(UpdateRejection::NotJoined)?
            .clone();
        let match_id = self.session.id;
        let now = SystemTime::now();
        let timestamp = format_system_time(now);

        let message = match update {
            MatchUpdate::Start => {
                self.session.lifecycle.apply(MatchEvent::Start { at: now })?;
                self.sequences.set_writable(match_id, true);
                self.persist.enqueue(
                    PersistJob::Status {
                        status: MatchStatus::Ongoing,
                        start: Some(now),
                    },
                    origin,
                );
                info!(match_id = %match_id, "match started");
                ServerMessage::Start {
                    match_id,
                    revision: self.next_revision(),
                    timestamp: timestamp.clone(),
                    start_timestamp: timestamp,
                    remaining_seconds: self
                        .session
                        .lifecycle
                        .remaining(now)
                        .map_or(0, |remaining| remaining.as_secs()),
                }
            }
            MatchUpdate::Complete { confirmed } => {
                let phase = self
                    .session
                    .lifecycle
                    .apply(MatchEvent::Complete { at: now, confirmed })?;
                self.sequences.set_writable(match_id, false);
                self.persist.enqueue(
                    PersistJob::Status {
                        status: MatchStatus::Completed,
                        start: phase.started_at(),
                    },
                    origin,
                );
                let sequences = self.sequences.snapshot(match_id);
                let scoreboard = Scoreboard::rank(&sequences);
                let winner = scoreboard.winner().map(|row| row.player.clone());
                info!(match_id = %match_id, winner = ?winner, "match completed");
                ServerMessage::Complete {
                    match_id,
                    revision: self.next_revision(),
                    timestamp,
                    status: MatchStatus::Completed,
                    sequences,
                    scoreboard,
                    winner,
                }
            }
            MatchUpdate::ReplaceSequences(replacements) => {
                self.session.lifecycle.ensure_accepts_mutations()?;
                if let Some(unknown) = replacements
                    .keys()
                    .find(|player| !self.session.has_player(player))
                {
                    return Err(UpdateRejection::UnknownPlayer(unknown.clone()));
                }
                if let Some(missing) = self
                    .session
                    .players
                    .iter()
                    .find(|player| !replacements.contains_key(player.as_str()))
                {
                    return Err(UpdateRejection::MissingPlayer(missing.clone()));
                }
                for (player, sequence) in replacements {
                    let stored = self.sequences.replace_all(match_id, &player, sequence)?;
                    self.persist_sequence(player, &stored, origin.clone());
                }
                let sequences = self.sequences.snapshot(match_id);
                ServerMessage::Sequences {
                    match_id,
                    revision: self.next_revision(),
                    timestamp,
                    scoreboard: Scoreboard::rank(&sequences),
                    sequences,
                }
            }
            MatchUpdate::Append { player, events } => {
                self.session.lifecycle.ensure_accepts_mutations()?;
                self.ensure_player(&player)?;
                if events.is_empty() {
                    return Err(UpdateRejection::EmptyAppend);
                }
                let sequence = self.sequences.append(match_id, &player, &events)?;
                self.persist_sequence(player.clone(), &sequence, origin);
                debug!(match_id = %match_id, player = %player, events = events.len(), "appended events");
                ServerMessage::Append {
                    match_id,
                    revision: self.next_revision(),
                    timestamp,
                    scoreboard: Scoreboard::rank(&self.sequences.snapshot(match_id)),
                    player,
                    events,
                    sequence,
                }
            }
            MatchUpdate::Undo { player } => {
                self.session.lifecycle.ensure_accepts_mutations()?;
                self.ensure_player(&player)?;
                let sequence = self.sequences.undo(match_id, &player)?;
                self.persist_sequence(player.clone(), &sequence, origin);
                debug!(match_id = %match_id, player = %player, "undid last event");
                ServerMessage::Undo {
                    match_id,
                    revision: self.next_revision(),
                    timestamp,
                    scoreboard: Scoreboard::rank(&self.sequences.snapshot(match_id)),
                    player,
                    sequence,
                }
            }
        };

        let revision = self.revision;
        // No receivers is fine: the sender may have left already.
        let _ = self.broadcaster.send(Arc::new(message));
        Ok(revision)
    }

    fn ensure_player(&self, player: &str) -> Result<(), UpdateRejection> {
        if self.session.has_player(player) {
            Ok(())
        } else {
            Err(UpdateRejection::UnknownPlayer(player.to_string()))
        }
    }

    fn persist_sequence(&self, player: String, sequence: &EncodedSequence, origin: Option<Outbox>) {
        self.persist.enqueue(
            PersistJob::Sequence {
                player,
                sequence: sequence.to_strings(),
            },
            origin,
        );
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

async fn countdown_elapsed(expiry: Option<Instant>) {
    match expiry {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::{MatchStore, memory::MemoryMatchStore},
        state::{AppState, lifecycle::LifecycleError, store::SequenceLocked},
    };

    async fn setup() -> (SharedState, MemoryMatchStore, Uuid) {
        let store = MemoryMatchStore::new();
        let entity = MatchEntity::new(1, vec!["Alice".into(), "Bob".into()]);
        let match_id = entity.id;
        store.save_match(entity).await.unwrap();
        let state = AppState::with_store(AppConfig::default(), Arc::new(store.clone()));
        (state, store, match_id)
    }

    async fn recv(subscription: &mut Subscription) -> Arc<ServerMessage> {
        tokio::time::timeout(Duration::from_secs(1), subscription.receiver.recv())
            .await
            .expect("broadcast timed out")
            .expect("room closed")
    }

    #[tokio::test]
    async fn pending_matches_refuse_appends_until_started() {
        let (state, _, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, mut subscription) = join_room(&state, match_id, client, None).await.unwrap();
        assert_eq!(subscription.snapshot.revision, 0);

        let append = MatchUpdate::Append {
            player: "Alice".into(),
            events: vec![Event::Hit],
        };
        assert_eq!(
            room.update(client, append.clone()).await,
            Err(UpdateRejection::Lifecycle(LifecycleError::ReadOnly("pending")))
        );

        assert_eq!(room.update(client, MatchUpdate::Start).await, Ok(1));
        assert!(matches!(*recv(&mut subscription).await, ServerMessage::Start { .. }));

        assert_eq!(room.update(client, append).await, Ok(2));
        let message = recv(&mut subscription).await;
        let ServerMessage::Append { sequence, scoreboard, .. } = message.as_ref() else {
            panic!("expected an append broadcast");
        };
        assert_eq!(sequence.to_strings(), ["+1"]);
        assert_eq!(scoreboard.winner().map(|row| row.player.as_str()), Some("Alice"));
    }

    #[tokio::test]
    async fn double_start_is_rejected_without_resetting_the_clock() {
        let (state, _, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, _subscription) = join_room(&state, match_id, client, None).await.unwrap();

        room.update(client, MatchUpdate::Start).await.unwrap();
        let first = room.snapshot().await.unwrap().start_timestamp;
        assert_eq!(
            room.update(client, MatchUpdate::Start).await,
            Err(UpdateRejection::Lifecycle(LifecycleError::AlreadyStarted))
        );
        let snapshot = room.snapshot().await.unwrap();
        assert_eq!(snapshot.start_timestamp, first);
        assert_eq!(snapshot.revision, 1);
    }

    #[tokio::test]
    async fn updates_require_membership_and_known_players() {
        let (state, _, match_id) = setup().await;
        let member = Uuid::new_v4();
        let (room, _subscription) = join_room(&state, match_id, member, None).await.unwrap();
        room.update(member, MatchUpdate::Start).await.unwrap();

        assert_eq!(
            room.update(Uuid::new_v4(), MatchUpdate::Undo { player: "Alice".into() })
                .await,
            Err(UpdateRejection::NotJoined)
        );
        assert_eq!(
            room.update(member, MatchUpdate::Undo { player: "Carol".into() })
                .await,
            Err(UpdateRejection::UnknownPlayer("Carol".into()))
        );
        assert_eq!(
            room.update(
                member,
                MatchUpdate::Append {
                    player: "Bob".into(),
                    events: Vec::new(),
                }
            )
            .await,
            Err(UpdateRejection::EmptyAppend)
        );

        let mut replacements = IndexMap::new();
        replacements.insert("Bob".to_string(), EncodedSequence::parse_lenient(["+2"]));
        replacements.insert("Zed".to_string(), EncodedSequence::new());
        assert_eq!(
            room.update(member, MatchUpdate::ReplaceSequences(replacements))
                .await,
            Err(UpdateRejection::UnknownPlayer("Zed".into()))
        );
        assert!(room.snapshot().await.unwrap().sequences["Bob"].is_empty());
    }

    #[tokio::test]
    async fn sequence_replacement_must_cover_every_player() {
        let (state, _, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, mut subscription) = join_room(&state, match_id, client, None).await.unwrap();
        room.update(client, MatchUpdate::Start).await.unwrap();
        recv(&mut subscription).await;

        let mut partial = IndexMap::new();
        partial.insert("Alice".to_string(), EncodedSequence::parse_lenient(["+2"]));
        assert_eq!(
            room.update(client, MatchUpdate::ReplaceSequences(partial.clone()))
                .await,
            Err(UpdateRejection::MissingPlayer("Bob".into()))
        );
        assert!(room.snapshot().await.unwrap().sequences["Alice"].is_empty());

        partial.insert("Bob".to_string(), EncodedSequence::parse_lenient(["-0"]));
        assert_eq!(
            room.update(client, MatchUpdate::ReplaceSequences(partial))
                .await,
            Ok(2)
        );
        let message = recv(&mut subscription).await;
        let ServerMessage::Sequences { sequences, .. } = message.as_ref() else {
            panic!("expected a sequences broadcast");
        };
        assert_eq!(sequences["Alice"].to_strings(), ["+2"]);
        assert_eq!(sequences["Bob"].to_strings(), ["-0"]);
    }

    #[tokio::test]
    async fn completion_freezes_sequences_and_names_the_winner() {
        let (state, _, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, mut subscription) = join_room(&state, match_id, client, None).await.unwrap();
        room.update(client, MatchUpdate::Start).await.unwrap();
        room.update(
            client,
            MatchUpdate::Append {
                player: "Bob".into(),
                events: vec![Event::Hit, Event::Hit],
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            room.update(client, MatchUpdate::Complete { confirmed: false }).await,
            Err(UpdateRejection::Lifecycle(LifecycleError::CountdownRunning { .. }))
        ));
        room.update(client, MatchUpdate::Complete { confirmed: true })
            .await
            .unwrap();

        assert_eq!(
            state.sequences().append(match_id, "Bob", &[Event::Hit]),
            Err(SequenceLocked(match_id))
        );
        assert!(matches!(
            room.update(client, MatchUpdate::Undo { player: "Bob".into() }).await,
            Err(UpdateRejection::Lifecycle(LifecycleError::ReadOnly("completed")))
        ));

        let mut last = recv(&mut subscription).await;
        while !matches!(*last, ServerMessage::Complete { .. }) {
            last = recv(&mut subscription).await;
        }
        let ServerMessage::Complete { winner, .. } = last.as_ref() else {
            unreachable!();
        };
        assert_eq!(winner.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn last_leave_flushes_writes_and_closes_the_room() {
        let (state, store, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, _subscription) = join_room(&state, match_id, client, None).await.unwrap();
        room.update(client, MatchUpdate::Start).await.unwrap();
        room.update(
            client,
            MatchUpdate::Append {
                player: "Alice".into(),
                events: vec![Event::Hit, Event::Miss],
            },
        )
        .await
        .unwrap();
        room.update(client, MatchUpdate::Complete { confirmed: true })
            .await
            .unwrap();

        room.leave(client).await;
        room.wait_closed().await;

        assert!(state.rooms().get(match_id).is_none());
        assert!(state.sequences().snapshot(match_id).is_empty());
        let stored = store.find_match(match_id).await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Completed);
        assert_eq!(stored.sequences["Alice"], ["+1", "-0"]);
        assert!(stored.start_timestamp.is_some());
    }

    #[tokio::test]
    async fn rejoining_after_close_reloads_from_storage() {
        let (state, _, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, _) = join_room(&state, match_id, client, None).await.unwrap();
        room.leave(client).await;
        room.wait_closed().await;

        let (reopened, subscription) = join_room(&state, match_id, client, None).await.unwrap();
        assert_eq!(reopened.match_id(), match_id);
        assert_eq!(subscription.snapshot.players, ["Alice", "Bob"]);
        assert_eq!(state.rooms().len(), 1);
    }

    #[tokio::test]
    async fn maximal_runs_keep_the_room_usable() {
        let (state, store, match_id) = setup().await;
        let client = Uuid::new_v4();
        let (room, _subscription) = join_room(&state, match_id, client, None).await.unwrap();
        room.update(client, MatchUpdate::Start).await.unwrap();

        let mut replacements = IndexMap::new();
        replacements.insert(
            "Alice".to_string(),
            EncodedSequence::parse_lenient(["+4294967295", "-0", "+1"]),
        );
        replacements.insert("Bob".to_string(), EncodedSequence::new());
        assert_eq!(
            room.update(client, MatchUpdate::ReplaceSequences(replacements))
                .await,
            Ok(2)
        );
        room.update(
            client,
            MatchUpdate::Append {
                player: "Alice".into(),
                events: vec![Event::Hit],
            },
        )
        .await
        .unwrap();

        room.leave(client).await;
        room.wait_closed().await;
        assert_eq!(
            store.find_match(match_id).await.unwrap().unwrap().sequences["Alice"],
            ["+4294967295", "-0", "+2"]
        );

        let (_, rejoined) = join_room(&state, match_id, client, None).await.unwrap();
        assert_eq!(rejoined.snapshot.revision, 0);
        assert_eq!(
            rejoined.snapshot.sequences["Alice"].to_strings(),
            ["+4294967295", "-0", "+2"]
        );
    }

    async fn started_match(started_ago: Duration) -> (SharedState, Uuid) {
        let store = MemoryMatchStore::new();
        let mut entity = MatchEntity::new(1, vec!["Alice".into()]);
        entity.start_timestamp = Some(SystemTime::now() - started_ago);
        let match_id = entity.id;
        store.save_match(entity).await.unwrap();
        (AppState::with_store(AppConfig::default(), Arc::new(store)), match_id)
    }

    #[tokio::test]
    async fn expired_match_room_closes_after_last_leave() {
        let (state, match_id) = started_match(Duration::from_secs(3600)).await;
        let client = Uuid::new_v4();
        let (room, subscription) = join_room(&state, match_id, client, None).await.unwrap();
        assert_eq!(subscription.snapshot.remaining_seconds, Some(0));

        room.leave(client).await;
        tokio::time::timeout(Duration::from_secs(2), room.wait_closed())
            .await
            .expect("expired room stayed open");
        assert!(state.rooms().is_empty());
        assert!(state.sequences().snapshot(match_id).is_empty());
    }

    #[tokio::test]
    async fn empty_room_closes_when_its_countdown_elapses() {
        let (state, match_id) = started_match(Duration::from_secs(58)).await;
        let client = Uuid::new_v4();
        let (room, _subscription) = join_room(&state, match_id, client, None).await.unwrap();

        room.leave(client).await;
        assert!(room.snapshot().await.is_ok(), "room closed while the countdown ran");
        assert_eq!(state.rooms().len(), 1);

        tokio::time::timeout(Duration::from_secs(5), room.wait_closed())
            .await
            .expect("room outlived its countdown");
        assert!(state.rooms().is_empty());
    }

    #[tokio::test]
    async fn rooms_cannot_open_while_a_deletion_is_reserved() {
        let (state, _, match_id) = setup().await;
        let guard = state.rooms().reserve_deletion(match_id).unwrap();
        assert!(state.rooms().reserve_deletion(match_id).is_none());

        assert!(matches!(
            join_room(&state, match_id, Uuid::new_v4(), None).await,
            Err(UpdateRejection::UnknownMatch(id)) if id == match_id
        ));
        assert!(state.rooms().is_empty());

        drop(guard);
        let client = Uuid::new_v4();
        let (room, _subscription) = join_room(&state, match_id, client, None).await.unwrap();
        assert!(state.rooms().reserve_deletion(match_id).is_none());
        room.leave(client).await;
    }

    #[tokio::test]
    async fn unknown_matches_cannot_be_joined() {
        let (state, _, _) = setup().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            join_room(&state, missing, Uuid::new_v4(), None).await,
            Err(UpdateRejection::UnknownMatch(id)) if id == missing
        ));
        assert!(state.rooms().is_empty());
    }
}
