pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{InsertOutcome, ProgressEntity, ReadyEntity, ResponseEntity, SessionEntity};
use crate::dao::storage::StorageResult;
use crate::state::game::{GameKind, Seat};

/// Abstraction over the persistence layer for sessions, progress and round answers.
///
/// Responses and ready marks are unique on (session, game, participant, round); inserting
/// a duplicate returns the stored record instead of creating a second one.
pub trait SessionStore: Send + Sync {
    /// Atomically set `seat`'s connection flag on the newest session that still has a free
    /// slot, returning the updated session.
    fn claim_open_session(
        &self,
        seat: Seat,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Persist a new session together with its initial progress rows.
    fn create_session(
        &self,
        session: SessionEntity,
        progress: Vec<ProgressEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Set `seat`'s connection flag on a given session.
    fn connect(
        &self,
        id: Uuid,
        seat: Seat,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn list_progress(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>>;
    fn find_progress(
        &self,
        session_id: Uuid,
        game: GameKind,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>>;
    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn insert_response(
        &self,
        response: ResponseEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome<ResponseEntity>>>;
    fn list_responses(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>>;
    fn insert_ready(
        &self,
        ready: ReadyEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome<ReadyEntity>>>;
    fn list_ready(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<ReadyEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
