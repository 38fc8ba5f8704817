use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::UpdateRejection,
    state::{
        SharedState,
        room::{self, MatchUpdate, Outbox, RoomHandle, Subscription},
    },
};

/// The writer task is gone; the connection should be torn down.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Room membership of one WebSocket connection.
struct ClientSession {
    room: RoomHandle,
    broadcasts: tokio::sync::broadcast::Receiver<Arc<ServerMessage>>,
}

/// Handle the full lifecycle of a scoring client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let client = Uuid::new_v4();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let join_timeout = state.config().join_timeout;
    let initial_message = match tokio::time::timeout(join_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(client = %client, "websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let Ok(ClientMessage::Join { match_id }) = serde_json::from_str::<ClientMessage>(&initial_message)
    else {
        warn!(client = %client, "first message was not a join");
        let _ = send_message_to_websocket(
            &outbound_tx,
            &rejected(None, "join", "first message must be a join"),
        );
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let mut current = join(&state, match_id, client, &direct_tx, &outbound_tx).await;
    if current.is_none() {
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let result = handle_text(&state, client, &text, &mut current, &direct_tx, &outbound_tx).await;
                    if result.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(client = %client, "client closed websocket");
                    let _ = outbound_tx.send(Message::Close(frame));
                    break;
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Err(err)) => {
                    warn!(client = %client, error = %err, "websocket error");
                    break;
                }
                None => break,
            },
            broadcast = next_broadcast(&mut current) => match broadcast {
                Ok(message) => {
                    if send_message_to_websocket(&outbound_tx, message.as_ref()).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(client = %client, skipped, "client lagged behind room broadcasts; resynchronising");
                    if resync(client, &mut current, &direct_tx, &outbound_tx).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => {
                    current = None;
                }
            },
            Some(direct) = direct_rx.recv() => {
                if send_message_to_websocket(&outbound_tx, &direct).is_err() {
                    break;
                }
            }
        }
    }

    if let Some(session) = current {
        session.room.leave(client).await;
    }
    info!(client = %client, "scoring client disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn handle_text(
    state: &SharedState,
    client: Uuid,
    text: &str,
    current: &mut Option<ClientSession>,
    direct_tx: &Outbox,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ConnectionClosed> {
    let current_match = current.as_ref().map(|session| session.room.match_id());

    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(client = %client, error = %err, "failed to parse client message");
            return send_message_to_websocket(
                outbound_tx,
                &rejected(current_match, "unknown", &format!("invalid message: {err}")),
            );
        }
    };

    if let ClientMessage::Join { match_id } = message {
        if current_match == Some(match_id) {
            return Ok(());
        }
        if let Some(previous) = current.take() {
            previous.room.leave(client).await;
        }
        *current = join(state, match_id, client, direct_tx, outbound_tx).await;
        return Ok(());
    }

    let request = message.kind();
    let Some(update) = MatchUpdate::from_client(message) else {
        warn!(client = %client, "ignoring unsupported message type");
        return send_message_to_websocket(
            outbound_tx,
            &rejected(current_match, request, "unsupported message type"),
        );
    };

    let Some(session) = current.as_ref() else {
        return send_message_to_websocket(
            outbound_tx,
            &rejected(None, request, &UpdateRejection::NotJoined.to_string()),
        );
    };

    match session.room.update(client, update).await {
        Ok(_) => Ok(()),
        Err(rejection) => send_message_to_websocket(
            outbound_tx,
            &rejected(current_match, request, &rejection.to_string()),
        ),
    }
}

/// Join a room and send the snapshot. Failures are reported to the client.
async fn join(
    state: &SharedState,
    match_id: Uuid,
    client: Uuid,
    direct_tx: &Outbox,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Option<ClientSession> {
    match room::join_room(state, match_id, client, Some(direct_tx.clone())).await {
        Ok((room, subscription)) => {
            match deliver_snapshot(room.clone(), subscription, outbound_tx) {
                Ok(session) => Some(session),
                Err(ConnectionClosed) => {
                    room.leave(client).await;
                    None
                }
            }
        }
        Err(rejection) => {
            warn!(client = %client, match_id = %match_id, error = %rejection, "join refused");
            let _ = send_message_to_websocket(
                outbound_tx,
                &rejected(Some(match_id), "join", &rejection.to_string()),
            );
            None
        }
    }
}

/// Replace a lagged receiver with a fresh subscription and snapshot.
async fn resync(
    client: Uuid,
    current: &mut Option<ClientSession>,
    direct_tx: &Outbox,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ConnectionClosed> {
    let Some(session) = current.take() else {
        return Ok(());
    };
    match session.room.join(client, Some(direct_tx.clone())).await {
        Ok(subscription) => {
            let room = session.room.clone();
            match deliver_snapshot(session.room, subscription, outbound_tx) {
                Ok(fresh) => {
                    *current = Some(fresh);
                    Ok(())
                }
                Err(closed) => {
                    room.leave(client).await;
                    Err(closed)
                }
            }
        }
        Err(rejection) => send_message_to_websocket(
            outbound_tx,
            &rejected(Some(session.room.match_id()), "join", &rejection.to_string()),
        ),
    }
}

fn deliver_snapshot(
    room: RoomHandle,
    subscription: Subscription,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Result<ClientSession, ConnectionClosed> {
    send_message_to_websocket(outbound_tx, &ServerMessage::Snapshot(subscription.snapshot))?;
    Ok(ClientSession {
        room,
        broadcasts: subscription.receiver,
    })
}

/// Next room broadcast; never resolves while the client is in no room.
async fn next_broadcast(
    current: &mut Option<ClientSession>,
) -> Result<Arc<ServerMessage>, RecvError> {
    match current {
        Some(session) => session.broadcasts.recv().await,
        None => std::future::pending().await,
    }
}

fn rejected(match_id: Option<Uuid>, request: &str, reason: &str) -> ServerMessage {
    ServerMessage::Rejected {
        match_id,
        request: request.to_string(),
        reason: reason.to_string(),
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; a closed writer is reported
/// so the caller can tear the connection down.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
