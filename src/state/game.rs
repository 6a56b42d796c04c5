//! Core domain vocabulary: the four mini-games, the two participant seats and the
//! answer payloads each game accepts.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Number of entries a top-10 list must contain.
pub const TOP10_ITEMS: usize = 10;

/// Identifier of one of the four mini-games.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Each participant writes a ten-item list for the prompt.
    Top10,
    /// Free-text predictions about the future.
    PredictFuture,
    /// One participant draws the prompt while the other guesses.
    Drawful,
    /// Yes/no answers to "would you do this for me" questions.
    WouldYouDo,
}

impl GameKind {
    /// All games in menu order.
    pub const ALL: [GameKind; 4] = [
        GameKind::Top10,
        GameKind::PredictFuture,
        GameKind::Drawful,
        GameKind::WouldYouDo,
    ];

    /// Fixed number of rounds for this game.
    pub fn max_rounds(self) -> u8 {
        match self {
            GameKind::Top10 => 3,
            GameKind::PredictFuture => 3,
            GameKind::Drawful => 6,
            GameKind::WouldYouDo => 5,
        }
    }

    /// Stable identifier used on the wire and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::Top10 => "top10",
            GameKind::PredictFuture => "predict_future",
            GameKind::Drawful => "drawful",
            GameKind::WouldYouDo => "would_you_do",
        }
    }

    /// Parse the wire identifier back into a game.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|game| game.as_str() == value)
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two participant slots of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// First configured participant.
    First,
    /// Second configured participant.
    Second,
}

impl Seat {
    /// Both seats in a stable order.
    pub const BOTH: [Seat; 2] = [Seat::First, Seat::Second];

    /// The counterpart seat.
    pub fn other(self) -> Self {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    /// Storage identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Seat::First => "first",
            Seat::Second => "second",
        }
    }

    /// Parse the storage identifier.
    pub fn parse(value: &str) -> Option<Self> {
        Self::BOTH.into_iter().find(|seat| seat.as_str() == value)
    }
}

/// Role a participant plays during a drawful round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DrawRole {
    /// Draws the prompt; strokes are mirrored to the other participant.
    Drawer,
    /// Watches the drawing and types a guess.
    Guesser,
}

/// Roles alternate by round parity: the first seat draws on odd rounds.
pub fn drawful_role(seat: Seat, round: u8) -> DrawRole {
    let drawer = drawful_drawer(round);
    if seat == drawer {
        DrawRole::Drawer
    } else {
        DrawRole::Guesser
    }
}

/// Seat holding the pen for the given drawful round.
pub fn drawful_drawer(round: u8) -> Seat {
    if round % 2 == 1 {
        Seat::First
    } else {
        Seat::Second
    }
}

/// Answer payload submitted by a participant for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// Ordered top-10 list.
    List {
        /// Exactly ten non-empty entries.
        items: Vec<String>,
    },
    /// Free-text answer.
    Text {
        /// Non-empty answer text.
        text: String,
    },
    /// Binary yes/no answer.
    Choice {
        /// `true` for yes.
        yes: bool,
    },
    /// Final canvas of the drawer.
    Drawing {
        /// Optional `data:image/...` URL of the final canvas.
        #[serde(default)]
        snapshot: Option<String>,
    },
    /// Guess typed by the non-drawing participant.
    Guess {
        /// `None` only when the countdown expired before a guess was sent.
        #[serde(default)]
        text: Option<String>,
    },
}

/// Reasons an answer cannot be accepted for a round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    /// The payload kind does not belong to this game (or role).
    #[error("`{got}` answers are not accepted here; expected `{expected}`")]
    WrongKind {
        /// Expected payload kind.
        expected: &'static str,
        /// Received payload kind.
        got: &'static str,
    },
    /// A top-10 list does not have exactly ten entries.
    #[error("top 10 lists need exactly {TOP10_ITEMS} items (got {0})")]
    ItemCount(usize),
    /// A required text field is blank.
    #[error("{0} must not be empty")]
    Empty(&'static str),
    /// The drawing snapshot is not an image data URL.
    #[error("drawing snapshot must be a data:image URL")]
    SnapshotFormat,
    /// The drawing snapshot exceeds the configured size cap.
    #[error("drawing snapshot is too large ({size} bytes, limit {limit})")]
    SnapshotTooLarge {
        /// Received size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
}

impl Answer {
    /// Short identifier of the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Answer::List { .. } => "list",
            Answer::Text { .. } => "text",
            Answer::Choice { .. } => "choice",
            Answer::Drawing { .. } => "drawing",
            Answer::Guess { .. } => "guess",
        }
    }

    /// Placeholder recorded for a participant whose drawful countdown ran out.
    pub fn timed_out(role: DrawRole) -> Self {
        match role {
            DrawRole::Drawer => Answer::Drawing { snapshot: None },
            DrawRole::Guesser => Answer::Guess { text: None },
        }
    }

    /// Check that the payload fits `game` and that every required field is filled.
    ///
    /// `role` is only consulted for drawful rounds.
    pub fn validate_for(
        &self,
        game: GameKind,
        role: Option<DrawRole>,
        max_snapshot_bytes: usize,
    ) -> Result<(), AnswerError> {
        let expected = match (game, role) {
            (GameKind::Top10, _) => "list",
            (GameKind::PredictFuture, _) => "text",
            (GameKind::WouldYouDo, _) => "choice",
            (GameKind::Drawful, Some(DrawRole::Drawer)) => "drawing",
            (GameKind::Drawful, _) => "guess",
        };
        if self.kind() != expected {
            return Err(AnswerError::WrongKind {
                expected,
                got: self.kind(),
            });
        }

        match self {
            Answer::List { items } => {
                if items.len() != TOP10_ITEMS {
                    return Err(AnswerError::ItemCount(items.len()));
                }
                if items.iter().any(|item| item.trim().is_empty()) {
                    return Err(AnswerError::Empty("list items"));
                }
            }
            Answer::Text { text } => {
                if text.trim().is_empty() {
                    return Err(AnswerError::Empty("answer text"));
                }
            }
            Answer::Guess { text } => match text {
                Some(text) if !text.trim().is_empty() => {}
                _ => return Err(AnswerError::Empty("guess")),
            },
            Answer::Drawing {
                snapshot: Some(snapshot),
            } => {
                if !snapshot.starts_with("data:image/") {
                    return Err(AnswerError::SnapshotFormat);
                }
                if snapshot.len() > max_snapshot_bytes {
                    return Err(AnswerError::SnapshotTooLarge {
                        size: snapshot.len(),
                        limit: max_snapshot_bytes,
                    });
                }
            }
            Answer::Drawing { snapshot: None } | Answer::Choice { .. } => {}
        }

        Ok(())
    }

    /// Trim surrounding whitespace from free-text fields before storing.
    pub fn normalized(self) -> Self {
        match self {
            Answer::List { items } => Answer::List {
                items: items.into_iter().map(|item| item.trim().to_owned()).collect(),
            },
            Answer::Text { text } => Answer::Text {
                text: text.trim().to_owned(),
            },
            Answer::Guess { text } => Answer::Guess {
                text: text.map(|text| text.trim().to_owned()),
            },
            other => other,
        }
    }
}
