use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::game::{Answer, GameKind, Seat};

/// Two-party session row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Short human-friendly code participants can use to join explicitly.
    pub code: String,
    /// Whether the first participant has connected.
    pub first_connected: bool,
    /// Whether the second participant has connected.
    pub second_connected: bool,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time a connection flag changed.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Build a new session with only `seat` connected.
    pub fn new(code: String, seat: Seat) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            code,
            first_connected: seat == Seat::First,
            second_connected: seat == Seat::Second,
            created_at: now,
            updated_at: now,
        }
    }

    /// Connection flag of `seat`.
    pub fn is_connected(&self, seat: Seat) -> bool {
        match seat {
            Seat::First => self.first_connected,
            Seat::Second => self.second_connected,
        }
    }

    /// Both participants are connected.
    pub fn both_connected(&self) -> bool {
        self.first_connected && self.second_connected
    }

    /// At least one participant slot is still free.
    pub fn is_open(&self) -> bool {
        !self.both_connected()
    }
}

/// Per (session, game) progress row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEntity {
    /// Owning session.
    pub session_id: Uuid,
    /// Game tracked by this row.
    pub game: GameKind,
    /// Set once the final round closes; never reverts.
    pub completed: bool,
    /// Round currently open (1-based, never above the game maximum).
    pub current_round: u8,
    /// Last time the row changed.
    pub updated_at: SystemTime,
}

impl ProgressEntity {
    /// Initial progress for `game`: round one, not completed.
    pub fn initial(session_id: Uuid, game: GameKind) -> Self {
        Self {
            session_id,
            game,
            completed: false,
            current_round: 1,
            updated_at: SystemTime::now(),
        }
    }
}

/// One participant's answer for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseEntity {
    /// Owning session.
    pub session_id: Uuid,
    /// Game the round belongs to.
    pub game: GameKind,
    /// Author of the answer.
    pub participant: Seat,
    /// Round number (1-based).
    pub round: u8,
    /// Prompt shown when the answer was given.
    pub question: Option<String>,
    /// Answer payload.
    pub answer: Answer,
    /// Inserted by the countdown rather than by the participant.
    pub timed_out: bool,
    /// Insertion timestamp.
    pub created_at: SystemTime,
}

/// Marks a participant as ready to leave the results of a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadyEntity {
    /// Owning session.
    pub session_id: Uuid,
    /// Game the round belongs to.
    pub game: GameKind,
    /// Participant who acknowledged the results.
    pub participant: Seat,
    /// Round number (1-based).
    pub round: u8,
    /// Insertion timestamp.
    pub created_at: SystemTime,
}

/// Result of an insert keyed by a natural composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The record was stored.
    Inserted(T),
    /// A record with the same key already existed; it is returned unchanged.
    Existing(T),
}

impl<T> InsertOutcome<T> {
    /// Stored record regardless of whether it was new.
    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Inserted(value) | InsertOutcome::Existing(value) => value,
        }
    }

    /// Whether this call created the record.
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_connects_only_the_creator() {
        let session = SessionEntity::new("ABC123".into(), Seat::Second);
        assert!(!session.first_connected);
        assert!(session.second_connected);
        assert!(session.is_open());
        assert!(!session.both_connected());
    }

    #[test]
    fn both_connected_requires_both_flags() {
        let mut session = SessionEntity::new("ABC123".into(), Seat::First);
        for (first, second) in [(false, false), (true, false), (false, true), (true, true)] {
            session.first_connected = first;
            session.second_connected = second;
            assert_eq!(session.both_connected(), first && second);
        }
    }
}
