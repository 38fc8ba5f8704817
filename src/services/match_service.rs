use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{MatchEntity, MatchStatus},
    },
    dto::matches::{CreateMatchRequest, MatchListItem, MatchSnapshot},
    error::ServiceError,
    state::{SharedState, match_session::MatchSession, room},
};

/// Persist a new pending match with an empty sequence per player.
pub async fn create_match(
    state: &SharedState,
    request: CreateMatchRequest,
) -> Result<MatchSnapshot, ServiceError> {
    let store = state.require_match_store().await?;

    let players = request
        .players
        .iter()
        .map(|player| player.trim().to_string())
        .collect();
    let entity = MatchEntity::new(request.duration, players);
    store.save_match(entity.clone()).await?;
    info!(match_id = %entity.id, duration = entity.duration_minutes, "match created");

    let (session, sequences) = MatchSession::from_entity(entity);
    Ok(MatchSnapshot::capture(
        &session,
        sequences,
        0,
        SystemTime::now(),
    ))
}

/// Stored matches, newest first. `ongoing` also covers never-started matches.
pub async fn list_matches(
    state: &SharedState,
    status: Option<MatchStatus>,
) -> Result<Vec<MatchListItem>, ServiceError> {
    let store = state.require_match_store().await?;
    let mut entities = store.list_matches().await?;
    entities.retain(|entity| status.is_none_or(|status| entity.status == status));
    entities.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(entities.iter().map(MatchListItem::from).collect())
}

/// Full state of a match, from its live room when one is open.
pub async fn get_match(state: &SharedState, id: Uuid) -> Result<MatchSnapshot, ServiceError> {
    if let Some(snapshot) = room::live_snapshot(state, id).await {
        return Ok(snapshot);
    }

    let store = state.require_match_store().await?;
    let entity = find_match(store.as_ref(), id).await?;
    let (session, sequences) = MatchSession::from_entity(entity);
    Ok(MatchSnapshot::capture(
        &session,
        sequences,
        0,
        SystemTime::now(),
    ))
}

/// Delete a match that was never started.
pub async fn delete_match(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_match_store().await?;
    let entity = find_match(store.as_ref(), id).await?;

    if !entity.is_pending() {
        return Err(ServiceError::InvalidState(
            "only matches that never started can be deleted".into(),
        ));
    }
    let Some(_reservation) = state.rooms().reserve_deletion(id) else {
        return Err(ServiceError::InvalidState(
            "cannot delete a match while clients are connected".into(),
        ));
    };

    if store.delete_match(id).await? {
        info!(match_id = %id, "match deleted");
        Ok(())
    } else {
        Err(not_found(id))
    }
}

async fn find_match(store: &dyn MatchStore, id: Uuid) -> Result<MatchEntity, ServiceError> {
    store.find_match(id).await?.ok_or_else(|| not_found(id))
}

fn not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("match `{id}` not found"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::MemoryMatchStore,
        dto::matches::VisibleMatchPhase,
        error::UpdateRejection,
        state::AppState,
    };

    fn state() -> SharedState {
        AppState::with_store(AppConfig::default(), Arc::new(MemoryMatchStore::new()))
    }

    fn request(players: &[&str]) -> CreateMatchRequest {
        CreateMatchRequest {
            duration: 10,
            players: players.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn created_match_is_pending_with_trimmed_players() {
        let state = state();
        let created = create_match(&state, request(&[" Alice ", "Bob"]))
            .await
            .unwrap();

        assert_eq!(created.phase, VisibleMatchPhase::Pending);
        assert_eq!(created.players, ["Alice", "Bob"]);
        assert!(created.sequences.values().all(|sequence| sequence.is_empty()));

        let loaded = get_match(&state, created.match_id).await.unwrap();
        assert_eq!(loaded.players, created.players);
        assert_eq!(loaded.revision, 0);
    }

    #[tokio::test]
    async fn listing_filters_by_status_newest_first() {
        let state = state();
        let first = create_match(&state, request(&["Alice"])).await.unwrap();
        let second = create_match(&state, request(&["Bob"])).await.unwrap();

        let store = state.require_match_store().await.unwrap();
        store
            .save_match_status(first.match_id, MatchStatus::Completed, Some(SystemTime::now()))
            .await
            .unwrap();

        let ongoing = list_matches(&state, Some(MatchStatus::Ongoing)).await.unwrap();
        assert_eq!(ongoing.len(), 1);
        assert_eq!(ongoing[0].id, second.match_id);

        let all = list_matches(&state, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at >= all[1].created_at);
    }

    #[tokio::test]
    async fn only_pending_matches_can_be_deleted() {
        let state = state();
        let pending = create_match(&state, request(&["Alice"])).await.unwrap();
        let started = create_match(&state, request(&["Bob"])).await.unwrap();

        let store = state.require_match_store().await.unwrap();
        store
            .save_match_status(started.match_id, MatchStatus::Ongoing, Some(SystemTime::now()))
            .await
            .unwrap();

        assert!(matches!(
            delete_match(&state, started.match_id).await,
            Err(ServiceError::InvalidState(_))
        ));
        delete_match(&state, pending.match_id).await.unwrap();
        assert!(matches!(
            get_match(&state, pending.match_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn matches_with_a_live_room_cannot_be_deleted() {
        let state = state();
        let pending = create_match(&state, request(&["Alice"])).await.unwrap();
        let client = Uuid::new_v4();
        let (room, _subscription) = room::join_room(&state, pending.match_id, client, None)
            .await
            .unwrap();

        assert!(matches!(
            delete_match(&state, pending.match_id).await,
            Err(ServiceError::InvalidState(_))
        ));

        room.leave(client).await;
        room.wait_closed().await;
        delete_match(&state, pending.match_id).await.unwrap();
        assert!(matches!(
            room::join_room(&state, pending.match_id, client, None).await,
            Err(UpdateRejection::UnknownMatch(_))
        ));
    }

    #[tokio::test]
    async fn degraded_state_refuses_crud() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            create_match(&state, request(&["Alice"])).await,
            Err(ServiceError::Degraded)
        ));
    }
}
