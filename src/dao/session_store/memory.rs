//! In-process [`SessionStore`] used when no database is configured and by the test suite.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    dao::{
        models::{InsertOutcome, ProgressEntity, ReadyEntity, ResponseEntity, SessionEntity},
        session_store::SessionStore,
        storage::StorageResult,
    },
    state::game::{GameKind, Seat},
};

type RoundKey = (Uuid, GameKind, Seat, u8);

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, SessionEntity>,
    progress: HashMap<(Uuid, GameKind), ProgressEntity>,
    responses: HashMap<RoundKey, ResponseEntity>,
    ready: HashMap<RoundKey, ReadyEntity>,
}

/// Memory-backed store; every table lives behind a single async lock.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored responses, across every session.
    pub async fn response_count(&self) -> usize {
        self.tables.read().await.responses.len()
    }
}

fn set_flag(session: &mut SessionEntity, seat: Seat) {
    match seat {
        Seat::First => session.first_connected = true,
        Seat::Second => session.second_connected = true,
    }
    session.updated_at = SystemTime::now();
}

fn round_rows<T: Clone>(
    rows: &HashMap<RoundKey, T>,
    session_id: Uuid,
    game: GameKind,
    round: u8,
) -> Vec<T> {
    Seat::BOTH
        .into_iter()
        .filter_map(|seat| rows.get(&(session_id, game, seat, round)).cloned())
        .collect()
}

impl SessionStore for MemorySessionStore {
    fn claim_open_session(
        &self,
        seat: Seat,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let newest = tables
                .sessions
                .values_mut()
                .filter(|session| session.is_open())
                .max_by_key(|session| session.created_at);

            Ok(newest.map(|session| {
                set_flag(session, seat);
                session.clone()
            }))
        })
    }

    fn create_session(
        &self,
        session: SessionEntity,
        progress: Vec<ProgressEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            for row in progress {
                tables.progress.insert((row.session_id, row.game), row);
            }
            tables.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.sessions.get(&id).cloned()) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .sessions
                .values()
                .find(|session| session.code == code)
                .cloned())
        })
    }

    fn connect(
        &self,
        id: Uuid,
        seat: Seat,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            Ok(tables.sessions.get_mut(&id).map(|session| {
                set_flag(session, seat);
                session.clone()
            }))
        })
    }

    fn list_progress(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(GameKind::ALL
                .into_iter()
                .filter_map(|game| tables.progress.get(&(session_id, game)).cloned())
                .collect())
        })
    }

    fn find_progress(
        &self,
        session_id: Uuid,
        game: GameKind,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .tables
                .read()
                .await
                .progress
                .get(&(session_id, game))
                .cloned())
        })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            tables
                .progress
                .insert((progress.session_id, progress.game), progress);
            Ok(())
        })
    }

    fn insert_response(
        &self,
        response: ResponseEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome<ResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let key = (
                response.session_id,
                response.game,
                response.participant,
                response.round,
            );
            if let Some(existing) = tables.responses.get(&key) {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
            tables.responses.insert(key, response.clone());
            Ok(InsertOutcome::Inserted(response))
        })
    }

    fn list_responses(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(round_rows(&tables.responses, session_id, game, round))
        })
    }

    fn insert_ready(
        &self,
        ready: ReadyEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome<ReadyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.tables.write().await;
            let key = (ready.session_id, ready.game, ready.participant, ready.round);
            if let Some(existing) = tables.ready.get(&key) {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
            tables.ready.insert(key, ready.clone());
            Ok(InsertOutcome::Inserted(ready))
        })
    }

    fn list_ready(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<ReadyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(round_rows(&tables.ready, session_id, game, round))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
