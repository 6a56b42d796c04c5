use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    config::AppConfig,
    dao::models::ResponseEntity,
    dto::{format_system_time, validation::validate_participant},
    state::{
        game::{Answer, DrawRole, GameKind, Seat},
        state_machine::{RoundPhase, SeatRoundState},
    },
};

/// Query identifying the participant asking for the round view.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ParticipantQuery {
    /// Display name of the participant.
    #[validate(custom(function = "validate_participant"))]
    pub participant: String,
}

/// Answer submitted for one round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitRequest {
    #[validate(custom(function = "validate_participant"))]
    pub participant: String,
    pub answer: Answer,
}

/// Acknowledgement that a participant is done looking at the results.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReadyRequest {
    #[validate(custom(function = "validate_participant"))]
    pub participant: String,
}

/// Condition a round wait blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WaitTarget {
    /// Both participants submitted their answer.
    BothSubmitted,
    /// Both participants acknowledged the results.
    BothReady,
}

/// Query accepted by the round wait endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoundWaitQuery {
    pub target: WaitTarget,
    /// Seconds to wait before giving up (default 25, capped at 60).
    pub timeout_secs: Option<u64>,
}

/// Per-seat boolean flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SeatFlags {
    pub first: bool,
    pub second: bool,
}

impl SeatFlags {
    pub fn from_seats(seats: impl IntoIterator<Item = Seat>) -> Self {
        seats.into_iter().fold(Self::default(), |mut flags, seat| {
            match seat {
                Seat::First => flags.first = true,
                Seat::Second => flags.second = true,
            }
            flags
        })
    }

    /// Both flags are set.
    pub fn both(self) -> bool {
        self.first && self.second
    }
}

/// Round as seen by one participant.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundView {
    pub game: GameKind,
    pub round: u8,
    pub max_rounds: u8,
    /// Prompt of the round; hidden from the drawful guesser until results.
    pub prompt: Option<String>,
    pub participant: String,
    pub seat: Seat,
    pub state: SeatRoundState,
    pub phase: RoundPhase,
    /// Drawful role of the participant.
    pub role: Option<DrawRole>,
    pub submitted: SeatFlags,
    pub ready: SeatFlags,
    /// Seconds left before missing drawful answers are filled in.
    pub timer_remaining_secs: Option<u64>,
}

/// Stored answer of one participant.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResponseView {
    pub participant: String,
    pub seat: Seat,
    pub round: u8,
    pub question: Option<String>,
    pub answer: Answer,
    pub timed_out: bool,
    pub created_at: String,
}

impl ResponseView {
    pub fn new(response: ResponseEntity, config: &AppConfig) -> Self {
        Self {
            participant: config.participant_name(response.participant).to_owned(),
            seat: response.participant,
            round: response.round,
            question: response.question,
            answer: response.answer,
            timed_out: response.timed_out,
            created_at: format_system_time(response.created_at),
        }
    }
}

/// Result of a submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    /// Stored answer (the first one when the submission was repeated).
    pub response: ResponseView,
    /// True when an answer for this round already existed.
    pub duplicate: bool,
    pub round: RoundView,
}

/// Both answers of a round, side by side.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct ResultsResponse {
    pub game: GameKind,
    pub round: u8,
    pub prompt: Option<String>,
    pub responses: Vec<ResponseView>,
}

/// Result of a ready acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// This call moved the game to its next round.
    pub advanced: bool,
    /// The game is completed.
    pub completed: bool,
    /// Every game of the session is completed.
    pub all_completed: bool,
    /// Round view after the acknowledgement.
    pub round: RoundView,
}

/// Outcome of a round wait.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundWaitResponse {
    pub target: WaitTarget,
    /// Whether the target held before the timeout.
    pub reached: bool,
    pub round: u8,
    pub submitted: SeatFlags,
    pub ready: SeatFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_flags_collect_seats() {
        assert!(!SeatFlags::from_seats([]).both());
        let one = SeatFlags::from_seats([Seat::Second]);
        assert!(one.second && !one.first);
        assert!(SeatFlags::from_seats(Seat::BOTH).both());
    }

    #[test]
    fn submit_request_parses_tagged_answers() {
        let request: SubmitRequest = serde_json::from_str(
            r#"{"participant":"Delfina","answer":{"kind":"choice","yes":true}}"#,
        )
        .unwrap();
        assert_eq!(request.answer, Answer::Choice { yes: true });
        assert!(request.validate().is_ok());
    }

    #[test]
    fn wait_target_uses_snake_case() {
        let query: RoundWaitQuery =
            serde_json::from_str(r#"{"target":"both_ready","timeout_secs":3}"#).unwrap();
        assert_eq!(query.target, WaitTarget::BothReady);
        assert_eq!(query.timeout_secs, Some(3));
    }
}
