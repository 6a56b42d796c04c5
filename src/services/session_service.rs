//! Joining, pairing and inspecting two-party sessions.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{ProgressEntity, SessionEntity},
        session_store::SessionStore,
    },
    dto::{
        session::{
            GameProgressView, JoinRequest, JoinResponse, OverviewResponse, RewardView,
            SessionView, SessionWaitResponse,
        },
        validation::JOIN_CODE_LEN,
    },
    error::ServiceError,
    services::{sse_events, sse_service},
    state::{
        SharedState,
        game::{GameKind, Seat},
    },
};

/// Join code alphabet without look-alike characters.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_ATTEMPTS: usize = 5;

/// Resolve a participant display name to its seat.
pub fn resolve_seat(state: &SharedState, participant: &str) -> Result<Seat, ServiceError> {
    state.config().seat_for(participant).ok_or_else(|| {
        ServiceError::InvalidInput(format!("unknown participant `{}`", participant.trim()))
    })
}

pub(crate) async fn load_session(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}

/// Join a session as `participant`.
///
/// With a code the matching session is joined; otherwise the newest open session is
/// claimed, and a fresh one (with its four progress rows) is created when none is open.
pub async fn join(state: &SharedState, request: JoinRequest) -> Result<JoinResponse, ServiceError> {
    let seat = resolve_seat(state, &request.participant)?;
    let store = state.require_store().await?;
    let config = state.config();

    let (session, created) = state
        .run_join(|| async {
            if let Some(code) = request.code.as_deref() {
                let existing = store
                    .find_session_by_code(code.to_owned())
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("no session with code `{code}`"))
                    })?;
                let session = store.connect(existing.id, seat).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("session `{}` not found", existing.id))
                })?;
                return Ok((session, false));
            }

            if let Some(session) = store.claim_open_session(seat).await? {
                return Ok((session, false));
            }

            let code = unused_code(&store).await?;
            let session = SessionEntity::new(code, seat);
            let progress = GameKind::ALL
                .into_iter()
                .map(|game| ProgressEntity::initial(session.id, game))
                .collect();
            store.create_session(session.clone(), progress).await?;
            Ok((session, true))
        })
        .await?;

    info!(
        session_id = %session.id,
        seat = seat.as_str(),
        created,
        both_connected = session.both_connected(),
        "participant joined session"
    );
    sse_events::broadcast_session_updated(state, &session, &config);

    Ok(JoinResponse {
        participant: config.participant_name(seat).to_owned(),
        seat,
        created,
        session: SessionView::new(session, &config),
    })
}

async fn unused_code(store: &Arc<dyn SessionStore>) -> Result<String, ServiceError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code();
        if store.find_session_by_code(code.clone()).await?.is_none() {
            return Ok(code);
        }
        debug!(code = %code, "join code already taken; drawing another one");
    }
    Err(ServiceError::InvalidState(
        "could not allocate a unique join code".into(),
    ))
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .filter_map(|_| CODE_ALPHABET.choose(&mut rng).map(|byte| char::from(*byte)))
        .collect()
}

/// Current view of a session.
pub async fn get_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    Ok(SessionView::new(session, &state.config()))
}

/// Main menu data: per-game progress, completion and the reward once everything is done.
pub async fn get_overview(
    state: &SharedState,
    session_id: Uuid,
) -> Result<OverviewResponse, ServiceError> {
    let store = state.require_store().await?;
    let session = load_session(&store, session_id).await?;
    let progress = store.list_progress(session_id).await?;
    let config = state.config();

    let finished = all_completed(&progress);
    Ok(OverviewResponse {
        session: SessionView::new(session, &config),
        games: progress.into_iter().map(GameProgressView::from).collect(),
        all_completed: finished,
        reward: finished.then(|| RewardView::from(config.reward())),
    })
}

/// Every game has a progress row and all of them are completed.
pub fn all_completed(progress: &[ProgressEntity]) -> bool {
    GameKind::ALL.iter().all(|game| {
        progress
            .iter()
            .any(|row| row.game == *game && row.completed)
    })
}

/// Wait until both participants are connected or `timeout_secs` elapses.
pub async fn wait_until_connected(
    state: &SharedState,
    session_id: Uuid,
    timeout_secs: Option<u64>,
) -> Result<SessionWaitResponse, ServiceError> {
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;
    let limit = state.config().wait_timeout(timeout_secs);

    let reached = sse_service::wait_until(state, session_id, limit, || {
        let store = store.clone();
        async move {
            let session = load_session(&store, session_id).await?;
            Ok(session.both_connected())
        }
    })
    .await?;

    let session = load_session(&store, session_id).await?;
    Ok(SessionWaitResponse {
        reached,
        session: SessionView::new(session, &state.config()),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::memory::MemorySessionStore, state::AppState,
    };

    async fn state() -> SharedState {
        AppState::with_store(AppConfig::default(), Arc::new(MemorySessionStore::new())).await
    }

    fn join_as(name: &str) -> JoinRequest {
        JoinRequest {
            participant: name.into(),
            code: None,
        }
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        let code = generate_code();
        assert_eq!(code.len(), JOIN_CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn second_participant_pairs_with_the_open_session() {
        let state = state().await;

        let first = join(&state, join_as("Guille")).await.unwrap();
        assert!(first.created);
        assert_eq!(first.seat, Seat::First);
        assert!(!first.session.both_connected);

        let second = join(&state, join_as("delfina")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.participant, "Delfina");
        assert_eq!(second.session.id, first.session.id);
        assert!(second.session.both_connected);

        let overview = get_overview(&state, first.session.id).await.unwrap();
        assert_eq!(overview.games.len(), GameKind::ALL.len());
        assert!(overview.games.iter().all(|g| g.current_round == 1 && !g.completed));
        assert!(!overview.all_completed);
        assert!(overview.reward.is_none());
    }

    #[tokio::test]
    async fn joining_by_code_targets_that_session() {
        let state = state().await;
        let first = join(&state, join_as("Guille")).await.unwrap();

        let request = JoinRequest {
            participant: "Delfina".into(),
            code: Some(first.session.code.clone()),
        };
        let second = join(&state, request).await.unwrap();
        assert_eq!(second.session.id, first.session.id);

        let missing = JoinRequest {
            participant: "Delfina".into(),
            code: Some("ZZZZZZ".into()),
        };
        assert!(matches!(
            join(&state, missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_participants_are_rejected() {
        let state = state().await;
        assert!(matches!(
            join(&state, join_as("Mallory")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn wait_until_connected_resolves_on_join() {
        let state = state().await;
        let first = join(&state, join_as("Guille")).await.unwrap();

        let waiter = {
            let state = state.clone();
            let id = first.session.id;
            tokio::spawn(async move { wait_until_connected(&state, id, Some(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        join(&state, join_as("Delfina")).await.unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert!(outcome.reached);
        assert!(outcome.session.both_connected);
    }

    #[tokio::test]
    async fn degraded_state_refuses_joins() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            join(&state, join_as("Guille")).await,
            Err(ServiceError::Degraded)
        ));
    }
}
