use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{AppConfig, Reward},
    dao::models::{ProgressEntity, SessionEntity},
    dto::{
        format_system_time,
        validation::{validate_join_code, validate_participant},
    },
    state::game::{GameKind, Seat},
};

/// Payload used to enter a session as one of the two participants.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Display name of the participant (one of the configured names).
    #[validate(length(max = 64), custom(function = "validate_participant"))]
    pub participant: String,
    /// Join code of a specific session; omitted to pair with the newest open session.
    #[serde(default)]
    #[validate(custom(function = "validate_join_code"))]
    pub code: Option<String>,
}

/// Display names of the two seats.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantsView {
    /// Name bound to the first seat.
    pub first: String,
    /// Name bound to the second seat.
    pub second: String,
}

impl ParticipantsView {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            first: config.participant_name(Seat::First).to_owned(),
            second: config.participant_name(Seat::Second).to_owned(),
        }
    }
}

/// Public view of a session and its connection flags.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    pub id: Uuid,
    pub code: String,
    pub first_connected: bool,
    pub second_connected: bool,
    /// True once both participants joined.
    pub both_connected: bool,
    pub participants: ParticipantsView,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionView {
    pub fn new(session: SessionEntity, config: &AppConfig) -> Self {
        Self {
            both_connected: session.both_connected(),
            id: session.id,
            code: session.code,
            first_connected: session.first_connected,
            second_connected: session.second_connected,
            participants: ParticipantsView::from_config(config),
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Response returned after a successful join.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub session: SessionView,
    /// Seat the caller was bound to.
    pub seat: Seat,
    /// Canonical display name of the caller.
    pub participant: String,
    /// Whether this call created the session.
    pub created: bool,
}

/// Progress of one game as shown on the main menu.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameProgressView {
    pub game: GameKind,
    pub completed: bool,
    pub current_round: u8,
    pub max_rounds: u8,
}

impl From<ProgressEntity> for GameProgressView {
    fn from(progress: ProgressEntity) -> Self {
        Self {
            game: progress.game,
            completed: progress.completed,
            current_round: progress.current_round,
            max_rounds: progress.game.max_rounds(),
        }
    }
}

/// Reward link revealed once every game is done.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RewardView {
    pub title: String,
    pub url: String,
}

impl From<&Reward> for RewardView {
    fn from(reward: &Reward) -> Self {
        Self {
            title: reward.title.clone(),
            url: reward.url.clone(),
        }
    }
}

/// Main menu: session, per-game progress and the reward when unlocked.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct OverviewResponse {
    pub session: SessionView,
    pub games: Vec<GameProgressView>,
    pub all_completed: bool,
    /// Present only when all games are completed.
    pub reward: Option<RewardView>,
}

/// Query accepted by long-poll waits.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WaitQuery {
    /// Seconds to wait before giving up (default 25, capped at 60).
    pub timeout_secs: Option<u64>,
}

/// Outcome of waiting for both participants to connect.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionWaitResponse {
    /// Whether both participants were connected before the timeout.
    pub reached: bool,
    pub session: SessionView,
}

/// Question bank of one game.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameQuestions {
    pub game: GameKind,
    pub max_rounds: u8,
    pub prompts: Vec<String>,
}

/// Question bank of every game in menu order.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionBankResponse {
    pub games: Vec<GameQuestions>,
}

impl From<&AppConfig> for QuestionBankResponse {
    fn from(config: &AppConfig) -> Self {
        Self {
            games: config
                .questions()
                .iter()
                .map(|(game, prompts)| GameQuestions {
                    game: *game,
                    max_rounds: game.max_rounds(),
                    prompts: prompts.clone(),
                })
                .collect(),
        }
    }
}
