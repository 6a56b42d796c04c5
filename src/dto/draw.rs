use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::game::{DrawRole, Seat};

/// Rejected drawing frame.
#[derive(Debug, Error)]
pub enum DrawMessageError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("coordinates must be finite numbers")]
    NonFiniteCoordinate,
}

/// Messages accepted from drawing WebSocket clients.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawInbound {
    /// First frame of every connection.
    Identify { participant: String },
    /// Pen down.
    Start { x: f64, y: f64 },
    /// Pen moved while down.
    Draw { x: f64, y: f64 },
    /// Pen up.
    Stop,
    /// Wipe the canvas.
    Clear,
    #[serde(other)]
    Unknown,
}

impl DrawInbound {
    /// Parse a text frame and reject non-finite coordinates.
    pub fn from_json_str(text: &str) -> Result<Self, DrawMessageError> {
        let message: Self = serde_json::from_str(text)?;
        match &message {
            Self::Start { x, y } | Self::Draw { x, y } if !(x.is_finite() && y.is_finite()) => {
                Err(DrawMessageError::NonFiniteCoordinate)
            }
            _ => Ok(message),
        }
    }

    /// Whether the frame changes the canvas and is therefore reserved to the drawer.
    pub fn is_stroke(&self) -> bool {
        matches!(
            self,
            Self::Start { .. } | Self::Draw { .. } | Self::Stop | Self::Clear
        )
    }

    /// Outbound mirror of a stroke frame.
    pub fn to_outbound(&self) -> Option<DrawOutbound> {
        match self {
            Self::Start { x, y } => Some(DrawOutbound::Start { x: *x, y: *y }),
            Self::Draw { x, y } => Some(DrawOutbound::Draw { x: *x, y: *y }),
            Self::Stop => Some(DrawOutbound::Stop),
            Self::Clear => Some(DrawOutbound::Clear),
            Self::Identify { .. } | Self::Unknown => None,
        }
    }
}

/// Messages pushed to drawing WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawOutbound {
    /// Sent after identification.
    Welcome {
        seat: Seat,
        round: u8,
        role: DrawRole,
        /// Only the drawer receives the word.
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timer_remaining_secs: Option<u64>,
    },
    Start {
        x: f64,
        y: f64,
    },
    Draw {
        x: f64,
        y: f64,
    },
    Stop,
    Clear,
    /// A drawful answer landed for the round.
    Submitted {
        seat: Seat,
        round: u8,
        timed_out: bool,
    },
    /// A new round opened with a new drawer.
    Round {
        round: u8,
        drawer: Seat,
        #[serde(skip_serializing_if = "Option::is_none")]
        timer_secs: Option<u64>,
    },
    Error {
        message: String,
    },
}
