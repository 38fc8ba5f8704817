use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{sse::ServerEvent, ws::ServerMessage},
    error::UpdateRejection,
    state::{
        SharedState,
        room::{self, RoomHandle, Subscription},
    },
};

/// Read-only member of a match room fed to an SSE response.
pub struct Spectator {
    room: RoomHandle,
    client: Uuid,
    subscription: Subscription,
}

/// Join the room of `match_id` as a spectator.
pub async fn subscribe_match(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Spectator, UpdateRejection> {
    let client = Uuid::new_v4();
    let (room, subscription) = room::join_room(state, match_id, client, None).await?;
    info!(match_id = %match_id, client = %client, "spectator connected");
    Ok(Spectator {
        room,
        client,
        subscription,
    })
}

/// Convert a spectator subscription into an SSE response. The snapshot goes
/// out first, then every room broadcast; the spectator leaves the room once
/// the client disconnects.
pub fn to_sse_stream(spectator: Spectator) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let Spectator {
            room,
            client,
            subscription,
        } = spectator;
        let Subscription {
            snapshot,
            mut receiver,
        } = subscription;

        if forward(&tx, &ServerMessage::Snapshot(snapshot)).await {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    recv_result = receiver.recv() => {
                        match recv_result {
                            Ok(message) => {
                                if !forward(&tx, &message).await {
                                    break;
                                }
                            }
                            Err(RecvError::Closed) => break,
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(client = %client, skipped, "spectator lagged behind; resending snapshot");
                                let Ok(fresh) = room.join(client, None).await else {
                                    break;
                                };
                                receiver = fresh.receiver;
                                if !forward(&tx, &ServerMessage::Snapshot(fresh.snapshot)).await {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        room.leave(client).await;
        info!(match_id = %room.match_id(), client = %client, "spectator disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Push one room message to the response; `false` once the client is gone.
async fn forward(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    message: &ServerMessage,
) -> bool {
    let payload = match ServerEvent::from_message(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize SSE event");
            return true;
        }
    };

    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    tx.send(Ok(event)).await.is_ok()
}
