use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{ProgressEntity, SessionEntity},
    dto::{
        session::{GameProgressView, RewardView, SessionView},
        sse::{
            GameCompletedEvent, ProgressUpdatedEvent, RewardUnlockedEvent, RoundAdvancedEvent,
            RoundReadyEvent, RoundResultsEvent, RoundSubmittedEvent, ServerEvent,
            SessionUpdatedEvent,
        },
    },
    state::{
        SharedState,
        game::{GameKind, Seat},
    },
};

const EVENT_SESSION_UPDATED: &str = "session.updated";
const EVENT_PROGRESS_UPDATED: &str = "progress.updated";
const EVENT_ROUND_SUBMITTED: &str = "round.submitted";
const EVENT_ROUND_RESULTS: &str = "round.results";
const EVENT_ROUND_READY: &str = "round.ready";
const EVENT_ROUND_ADVANCED: &str = "round.advanced";
const EVENT_GAME_COMPLETED: &str = "game.completed";
const EVENT_REWARD_UNLOCKED: &str = "reward.unlocked";

/// Broadcast the connection flags of a session.
pub fn broadcast_session_updated(state: &SharedState, session: &SessionEntity, config: &AppConfig) {
    let payload = SessionUpdatedEvent(SessionView::new(session.clone(), config));
    send_session_event(state, session.id, EVENT_SESSION_UPDATED, &payload);
}

/// Broadcast a progress row after it changed.
pub fn broadcast_progress_updated(state: &SharedState, progress: &ProgressEntity) {
    let payload = ProgressUpdatedEvent(GameProgressView::from(progress.clone()));
    send_session_event(state, progress.session_id, EVENT_PROGRESS_UPDATED, &payload);
}

/// Broadcast that an answer was stored.
pub fn broadcast_round_submitted(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    round: u8,
    seat: Seat,
    timed_out: bool,
) {
    let payload = RoundSubmittedEvent {
        game,
        round,
        seat,
        timed_out,
    };
    send_session_event(state, session_id, EVENT_ROUND_SUBMITTED, &payload);
}

/// Broadcast that both answers of a round are available.
pub fn broadcast_round_results(state: &SharedState, session_id: Uuid, game: GameKind, round: u8) {
    let payload = RoundResultsEvent { game, round };
    send_session_event(state, session_id, EVENT_ROUND_RESULTS, &payload);
}

/// Broadcast a ready acknowledgement.
pub fn broadcast_round_ready(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    round: u8,
    seat: Seat,
) {
    let payload = RoundReadyEvent { game, round, seat };
    send_session_event(state, session_id, EVENT_ROUND_READY, &payload);
}

/// Broadcast that a game opened its next round.
pub fn broadcast_round_advanced(state: &SharedState, session_id: Uuid, game: GameKind, round: u8) {
    let payload = RoundAdvancedEvent { game, round };
    send_session_event(state, session_id, EVENT_ROUND_ADVANCED, &payload);
}

/// Broadcast that a game is completed.
pub fn broadcast_game_completed(state: &SharedState, session_id: Uuid, game: GameKind) {
    let payload = GameCompletedEvent { game };
    send_session_event(state, session_id, EVENT_GAME_COMPLETED, &payload);
}

/// Broadcast the reward once the last game is completed.
pub fn broadcast_reward_unlocked(state: &SharedState, session_id: Uuid) {
    let payload = RewardUnlockedEvent(RewardView::from(state.config().reward()));
    send_session_event(state, session_id, EVENT_REWARD_UNLOCKED, &payload);
}

fn send_session_event(
    state: &SharedState,
    session_id: Uuid,
    event: &str,
    payload: &impl Serialize,
) {
    match ServerEvent::json(session_id, Some(event.to_string()), payload) {
        Ok(event) => state.events().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize session SSE payload"),
    }
}
