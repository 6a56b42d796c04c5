use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::session::{GameProgressView, RewardView, SessionView},
    state::game::{GameKind, Seat},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the session change feed.
pub struct ServerEvent {
    /// Session the event belongs to.
    pub session_id: Uuid,
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already serialised payload.
    pub fn new(session_id: Uuid, event: Option<String>, data: String) -> Self {
        Self {
            session_id,
            event,
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(session_id: Uuid, event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            session_id,
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    pub session_id: Uuid,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    pub session: SessionView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever a connection flag changes.
pub struct SessionUpdatedEvent(pub SessionView);

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever a progress row changes.
pub struct ProgressUpdatedEvent(pub GameProgressView);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an answer is stored.
pub struct RoundSubmittedEvent {
    pub game: GameKind,
    pub round: u8,
    pub seat: Seat,
    pub timed_out: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when both answers of a round are in.
pub struct RoundResultsEvent {
    pub game: GameKind,
    pub round: u8,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a participant acknowledged the results.
pub struct RoundReadyEvent {
    pub game: GameKind,
    pub round: u8,
    pub seat: Seat,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a game moves to its next round.
pub struct RoundAdvancedEvent {
    pub game: GameKind,
    pub round: u8,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the final round of a game closes.
pub struct GameCompletedEvent {
    pub game: GameKind,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast once every game is completed.
pub struct RewardUnlockedEvent(pub RewardView);
