use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{ProgressEntity, ReadyEntity, ResponseEntity, SessionEntity},
    state::game::{Answer, GameKind, Seat},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    code: String,
    first_connected: bool,
    second_connected: bool,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProgressDocument {
    session_id: String,
    game: GameKind,
    completed: bool,
    current_round: i32,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoResponseDocument {
    session_id: String,
    game: GameKind,
    participant: Seat,
    round: i32,
    question: Option<String>,
    answer: Answer,
    #[serde(default)]
    timed_out: bool,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoReadyDocument {
    session_id: String,
    game: GameKind,
    participant: Seat,
    round: i32,
    created_at: DateTime,
}

fn parse_id(value: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(value).map_err(|err| MongoDaoError::Decode {
        reason: format!("invalid uuid `{value}`: {err}"),
    })
}

fn parse_round(value: i32) -> Result<u8, MongoDaoError> {
    u8::try_from(value).map_err(|_| MongoDaoError::Decode {
        reason: format!("round `{value}` out of range"),
    })
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            code: value.code,
            first_connected: value.first_connected,
            second_connected: value.second_connected,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            code: value.code,
            first_connected: value.first_connected,
            second_connected: value.second_connected,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<ProgressEntity> for MongoProgressDocument {
    fn from(value: ProgressEntity) -> Self {
        Self {
            session_id: value.session_id.to_string(),
            game: value.game,
            completed: value.completed,
            current_round: i32::from(value.current_round),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoProgressDocument> for ProgressEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoProgressDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: parse_id(&value.session_id)?,
            game: value.game,
            completed: value.completed,
            current_round: parse_round(value.current_round)?,
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<ResponseEntity> for MongoResponseDocument {
    fn from(value: ResponseEntity) -> Self {
        Self {
            session_id: value.session_id.to_string(),
            game: value.game,
            participant: value.participant,
            round: i32::from(value.round),
            question: value.question,
            answer: value.answer,
            timed_out: value.timed_out,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoResponseDocument> for ResponseEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoResponseDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: parse_id(&value.session_id)?,
            game: value.game,
            participant: value.participant,
            round: parse_round(value.round)?,
            question: value.question,
            answer: value.answer,
            timed_out: value.timed_out,
            created_at: value.created_at.to_system_time(),
        })
    }
}

impl From<ReadyEntity> for MongoReadyDocument {
    fn from(value: ReadyEntity) -> Self {
        Self {
            session_id: value.session_id.to_string(),
            game: value.game,
            participant: value.participant,
            round: i32::from(value.round),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoReadyDocument> for ReadyEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoReadyDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: parse_id(&value.session_id)?,
            game: value.game,
            participant: value.participant,
            round: parse_round(value.round)?,
            created_at: value.created_at.to_system_time(),
        })
    }
}

pub fn session_filter(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn progress_filter(session_id: Uuid, game: GameKind) -> Document {
    doc! {"session_id": session_id.to_string(), "game": game.as_str()}
}

pub fn round_filter(session_id: Uuid, game: GameKind, round: u8) -> Document {
    doc! {
        "session_id": session_id.to_string(),
        "game": game.as_str(),
        "round": i32::from(round),
    }
}

pub fn round_seat_filter(session_id: Uuid, game: GameKind, seat: Seat, round: u8) -> Document {
    let mut filter = round_filter(session_id, game, round);
    filter.insert("participant", seat.as_str());
    filter
}
