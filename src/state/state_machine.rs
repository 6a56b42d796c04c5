use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::game::{GameKind, Seat};

/// Server-side phase of the current round of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Fewer than two participants have submitted.
    Collecting,
    /// Both answers are in; results are visible and the ready handshake is open.
    Results,
    /// The final round closed and the game is completed.
    Completed,
}

/// Round state as seen by one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeatRoundState {
    /// The participant still has to submit.
    Answering,
    /// Submitted; the counterpart has not.
    WaitingForOther,
    /// Both submitted; results are shown until the participant is ready.
    Results,
    /// Ready for the next round; the counterpart is not yet.
    WaitingForReady,
    /// The game is over.
    Completed,
}

/// Events that can be applied to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// A participant stored an answer.
    Submit(Seat),
    /// A participant acknowledged the results.
    Ready(Seat),
}

/// What the caller must do after a transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEffect {
    /// The event was already recorded; nothing changes.
    Duplicate,
    /// Record the event; the round stays in its phase.
    Record,
    /// Record the submission; both answers are now in.
    ShowResults,
    /// Record the ready mark and move to the next round.
    Advance {
        /// Round number that opens.
        next_round: u8,
    },
    /// Record the ready mark and mark the game completed.
    Complete,
}

/// Error returned when an event cannot be applied in the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {phase:?}")]
pub struct InvalidTransition {
    /// Phase the round was in.
    pub phase: RoundPhase,
    /// Rejected event.
    pub event: RoundEvent,
}

/// Accepted transition with its effect and the resulting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Event that was planned.
    pub event: RoundEvent,
    /// Side effect the caller has to persist.
    pub effect: RoundEffect,
    /// Phase once the effect is applied (for the round that was current).
    pub to: RoundPhase,
}

/// Snapshot of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Game the round belongs to.
    pub game: GameKind,
    /// Current round number (1-based).
    pub round: u8,
    /// Current phase.
    pub phase: RoundPhase,
    /// Seats that submitted an answer for this round.
    pub submitted: Vec<Seat>,
    /// Seats that acknowledged the results of this round.
    pub ready: Vec<Seat>,
}

/// State machine driving the submit → results → ready handshake of a game.
///
/// It is rebuilt from storage for every mutation and never holds state across
/// requests; the caller serializes mutations per (session, game).
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    game: GameKind,
    round: u8,
    completed: bool,
    submitted: BTreeSet<Seat>,
    ready: BTreeSet<Seat>,
}

impl RoundStateMachine {
    /// Fresh machine positioned on round one.
    pub fn new(game: GameKind) -> Self {
        Self {
            game,
            round: 1,
            completed: false,
            submitted: BTreeSet::new(),
            ready: BTreeSet::new(),
        }
    }

    /// Rebuild the machine from persisted progress and the marks of the current round.
    pub fn restore(
        game: GameKind,
        round: u8,
        completed: bool,
        submitted: impl IntoIterator<Item = Seat>,
        ready: impl IntoIterator<Item = Seat>,
    ) -> Self {
        Self {
            game,
            round: round.clamp(1, game.max_rounds()),
            completed,
            submitted: submitted.into_iter().collect(),
            ready: ready.into_iter().collect(),
        }
    }

    /// Current round number.
    pub fn round(&self) -> u8 {
        self.round
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoundPhase {
        if self.completed {
            RoundPhase::Completed
        } else if self.submitted.len() == Seat::BOTH.len() {
            RoundPhase::Results
        } else {
            RoundPhase::Collecting
        }
    }

    /// Whether `seat` already submitted this round.
    pub fn has_submitted(&self, seat: Seat) -> bool {
        self.submitted.contains(&seat)
    }

    /// Per-participant view of the round.
    pub fn seat_state(&self, seat: Seat) -> SeatRoundState {
        match self.phase() {
            RoundPhase::Completed => SeatRoundState::Completed,
            RoundPhase::Collecting if self.submitted.contains(&seat) => {
                SeatRoundState::WaitingForOther
            }
            RoundPhase::Collecting => SeatRoundState::Answering,
            RoundPhase::Results if self.ready.contains(&seat) => SeatRoundState::WaitingForReady,
            RoundPhase::Results => SeatRoundState::Results,
        }
    }

    /// Create a snapshot of the current round.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            game: self.game,
            round: self.round,
            phase: self.phase(),
            submitted: self.submitted.iter().copied().collect(),
            ready: self.ready.iter().copied().collect(),
        }
    }

    /// Validate `event` against the current phase and compute its effect.
    pub fn plan(&self, event: RoundEvent) -> Result<Plan, InvalidTransition> {
        let phase = self.phase();
        let (effect, to) = match (phase, event) {
            (RoundPhase::Collecting, RoundEvent::Submit(seat))
                if self.submitted.contains(&seat) =>
            {
                (RoundEffect::Duplicate, phase)
            }
            (RoundPhase::Collecting, RoundEvent::Submit(_)) => {
                if self.submitted.len() + 1 == Seat::BOTH.len() {
                    (RoundEffect::ShowResults, RoundPhase::Results)
                } else {
                    (RoundEffect::Record, RoundPhase::Collecting)
                }
            }
            // Late retries of a submission that already landed are harmless.
            (RoundPhase::Results, RoundEvent::Submit(_)) => (RoundEffect::Duplicate, phase),
            (RoundPhase::Results, RoundEvent::Ready(seat)) if self.ready.contains(&seat) => {
                (RoundEffect::Duplicate, phase)
            }
            (RoundPhase::Results, RoundEvent::Ready(_)) => {
                if self.ready.len() + 1 < Seat::BOTH.len() {
                    (RoundEffect::Record, RoundPhase::Results)
                } else {
                    self.closing()
                }
            }
            (phase, event) => return Err(InvalidTransition { phase, event }),
        };

        Ok(Plan { event, effect, to })
    }

    /// Close a round whose acknowledgements are all stored but whose progress row was not
    /// moved forward.
    ///
    /// Returns `None` unless the round is in results with every seat ready.
    pub fn pending_close(&self, seat: Seat) -> Option<Plan> {
        if self.phase() != RoundPhase::Results || self.ready.len() < Seat::BOTH.len() {
            return None;
        }
        let (effect, to) = self.closing();
        Some(Plan {
            event: RoundEvent::Ready(seat),
            effect,
            to,
        })
    }

    fn closing(&self) -> (RoundEffect, RoundPhase) {
        if self.round < self.game.max_rounds() {
            (
                RoundEffect::Advance {
                    next_round: self.round + 1,
                },
                RoundPhase::Collecting,
            )
        } else {
            (RoundEffect::Complete, RoundPhase::Completed)
        }
    }

    /// Apply a previously planned transition to the in-memory machine.
    pub fn apply(&mut self, plan: Plan) {
        match (plan.event, plan.effect) {
            (_, RoundEffect::Duplicate) => {}
            (RoundEvent::Submit(seat), _) => {
                self.submitted.insert(seat);
            }
            (RoundEvent::Ready(_), RoundEffect::Advance { next_round }) => {
                self.round = next_round;
                self.submitted.clear();
                self.ready.clear();
            }
            (RoundEvent::Ready(_), RoundEffect::Complete) => {
                self.completed = true;
            }
            (RoundEvent::Ready(seat), _) => {
                self.ready.insert(seat);
            }
        }
    }
}
