use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save session `{id}`")]
    SaveSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load sessions")]
    LoadSession {
        #[source]
        source: MongoError,
    },
    #[error("failed to save progress of session `{session_id}`")]
    SaveProgress {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load progress of session `{session_id}`")]
    LoadProgress {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save round record of session `{session_id}`")]
    SaveRound {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load round records of session `{session_id}`")]
    LoadRound {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("stored document is malformed: {reason}")]
    Decode { reason: String },
}
