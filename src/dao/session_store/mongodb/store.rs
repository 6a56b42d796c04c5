use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoProgressDocument, MongoReadyDocument, MongoResponseDocument, MongoSessionDocument,
        progress_filter, round_filter, round_seat_filter, session_filter,
    },
};
use crate::{
    dao::{
        models::{InsertOutcome, ProgressEntity, ReadyEntity, ResponseEntity, SessionEntity},
        session_store::SessionStore,
        storage::StorageResult,
    },
    state::game::{GameKind, Seat},
};

const SESSION_COLLECTION_NAME: &str = "game_sessions";
const PROGRESS_COLLECTION_NAME: &str = "game_progress";
const RESPONSE_COLLECTION_NAME: &str = "game_responses";
const READY_COLLECTION_NAME: &str = "round_ready";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`SessionStore`] implementation.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(Some(name.to_owned()))
                .unique(Some(true))
                .build(),
        )
        .build()
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes = [
            (
                SESSION_COLLECTION_NAME,
                "code",
                unique_index(doc! {"code": 1}, "session_code_idx"),
            ),
            (
                PROGRESS_COLLECTION_NAME,
                "session_id,game",
                unique_index(doc! {"session_id": 1, "game": 1}, "progress_game_idx"),
            ),
            (
                RESPONSE_COLLECTION_NAME,
                "session_id,game,participant,round",
                unique_index(
                    doc! {"session_id": 1, "game": 1, "participant": 1, "round": 1},
                    "response_round_idx",
                ),
            ),
            (
                READY_COLLECTION_NAME,
                "session_id,game,participant,round",
                unique_index(
                    doc! {"session_id": 1, "game": 1, "participant": 1, "round": 1},
                    "ready_round_idx",
                ),
            ),
        ];

        for (collection, index, model) in indexes {
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSION_COLLECTION_NAME)
    }

    async fn progress(&self) -> Collection<MongoProgressDocument> {
        self.database().await.collection(PROGRESS_COLLECTION_NAME)
    }

    async fn responses(&self) -> Collection<MongoResponseDocument> {
        self.database().await.collection(RESPONSE_COLLECTION_NAME)
    }

    async fn ready_marks(&self) -> Collection<MongoReadyDocument> {
        self.database().await.collection(READY_COLLECTION_NAME)
    }

    async fn set_connected(
        &self,
        filter: Document,
        seat: Seat,
        newest_first: bool,
    ) -> MongoResult<Option<SessionEntity>> {
        let field = match seat {
            Seat::First => "first_connected",
            Seat::Second => "second_connected",
        };
        let mut set = Document::new();
        set.insert(field, true);
        set.insert("updated_at", DateTime::now());

        let sessions = self.sessions().await;
        let action = sessions
            .find_one_and_update(filter, doc! {"$set": set})
            .return_document(ReturnDocument::After);
        let action = if newest_first {
            action.sort(doc! {"created_at": -1})
        } else {
            action
        };

        action
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?
            .map(SessionEntity::try_from)
            .transpose()
    }

    async fn claim_open_session(&self, seat: Seat) -> MongoResult<Option<SessionEntity>> {
        let open = doc! {"$or": [{"first_connected": false}, {"second_connected": false}]};
        self.set_connected(open, seat, true).await
    }

    async fn create_session(
        &self,
        session: SessionEntity,
        progress: Vec<ProgressEntity>,
    ) -> MongoResult<()> {
        let id = session.id;
        self.sessions()
            .await
            .insert_one(MongoSessionDocument::from(session))
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;

        let documents: Vec<MongoProgressDocument> = progress.into_iter().map(Into::into).collect();
        if !documents.is_empty() {
            self.progress()
                .await
                .insert_many(documents)
                .await
                .map_err(|source| MongoDaoError::SaveProgress {
                    session_id: id,
                    source,
                })?;
        }

        Ok(())
    }

    async fn find_session(&self, filter: Document) -> MongoResult<Option<SessionEntity>> {
        self.sessions()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?
            .map(SessionEntity::try_from)
            .transpose()
    }

    async fn list_progress(&self, session_id: Uuid) -> MongoResult<Vec<ProgressEntity>> {
        let documents: Vec<MongoProgressDocument> = self
            .progress()
            .await
            .find(doc! {"session_id": session_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::LoadProgress { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadProgress { session_id, source })?;

        let mut rows = documents
            .into_iter()
            .map(ProgressEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;
        rows.sort_by_key(|row| row.game);
        Ok(rows)
    }

    async fn find_progress(
        &self,
        session_id: Uuid,
        game: GameKind,
    ) -> MongoResult<Option<ProgressEntity>> {
        self.progress()
            .await
            .find_one(progress_filter(session_id, game))
            .await
            .map_err(|source| MongoDaoError::LoadProgress { session_id, source })?
            .map(ProgressEntity::try_from)
            .transpose()
    }

    async fn save_progress(&self, progress: ProgressEntity) -> MongoResult<()> {
        let session_id = progress.session_id;
        let filter = progress_filter(session_id, progress.game);
        self.progress()
            .await
            .replace_one(filter, MongoProgressDocument::from(progress))
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveProgress { session_id, source })?;
        Ok(())
    }

    async fn insert_response(
        &self,
        response: ResponseEntity,
    ) -> MongoResult<InsertOutcome<ResponseEntity>> {
        let session_id = response.session_id;
        let filter = round_seat_filter(
            session_id,
            response.game,
            response.participant,
            response.round,
        );
        let collection = self.responses().await;

        match collection
            .insert_one(MongoResponseDocument::from(response.clone()))
            .await
        {
            Ok(_) => Ok(InsertOutcome::Inserted(response)),
            Err(err) if is_duplicate_key(&err) => {
                let existing = collection
                    .find_one(filter)
                    .await
                    .map_err(|source| MongoDaoError::LoadRound { session_id, source })?
                    .ok_or_else(|| MongoDaoError::Decode {
                        reason: "duplicate response vanished".into(),
                    })?;
                Ok(InsertOutcome::Existing(existing.try_into()?))
            }
            Err(source) => Err(MongoDaoError::SaveRound { session_id, source }),
        }
    }

    async fn list_responses(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> MongoResult<Vec<ResponseEntity>> {
        let documents: Vec<MongoResponseDocument> = self
            .responses()
            .await
            .find(round_filter(session_id, game, round))
            .sort(doc! {"participant": 1})
            .await
            .map_err(|source| MongoDaoError::LoadRound { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRound { session_id, source })?;

        documents.into_iter().map(ResponseEntity::try_from).collect()
    }

    async fn insert_ready(&self, ready: ReadyEntity) -> MongoResult<InsertOutcome<ReadyEntity>> {
        let session_id = ready.session_id;
        let filter = round_seat_filter(session_id, ready.game, ready.participant, ready.round);
        let collection = self.ready_marks().await;

        match collection
            .insert_one(MongoReadyDocument::from(ready.clone()))
            .await
        {
            Ok(_) => Ok(InsertOutcome::Inserted(ready)),
            Err(err) if is_duplicate_key(&err) => {
                let existing = collection
                    .find_one(filter)
                    .await
                    .map_err(|source| MongoDaoError::LoadRound { session_id, source })?
                    .ok_or_else(|| MongoDaoError::Decode {
                        reason: "duplicate ready mark vanished".into(),
                    })?;
                Ok(InsertOutcome::Existing(existing.try_into()?))
            }
            Err(source) => Err(MongoDaoError::SaveRound { session_id, source }),
        }
    }

    async fn list_ready(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> MongoResult<Vec<ReadyEntity>> {
        let documents: Vec<MongoReadyDocument> = self
            .ready_marks()
            .await
            .find(round_filter(session_id, game, round))
            .await
            .map_err(|source| MongoDaoError::LoadRound { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRound { session_id, source })?;

        documents.into_iter().map(ReadyEntity::try_from).collect()
    }
}

impl SessionStore for MongoSessionStore {
    fn claim_open_session(
        &self,
        seat: Seat,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.claim_open_session(seat).await.map_err(Into::into) })
    }

    fn create_session(
        &self,
        session: SessionEntity,
        progress: Vec<ProgressEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .create_session(session, progress)
                .await
                .map_err(Into::into)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_session(session_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_session(doc! {"code": code})
                .await
                .map_err(Into::into)
        })
    }

    fn connect(
        &self,
        id: Uuid,
        seat: Seat,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_connected(session_filter(id), seat, false)
                .await
                .map_err(Into::into)
        })
    }

    fn list_progress(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_progress(session_id).await.map_err(Into::into) })
    }

    fn find_progress(
        &self,
        session_id: Uuid,
        game: GameKind,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_progress(session_id, game)
                .await
                .map_err(Into::into)
        })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_progress(progress).await.map_err(Into::into) })
    }

    fn insert_response(
        &self,
        response: ResponseEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome<ResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.insert_response(response).await.map_err(Into::into) })
    }

    fn list_responses(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_responses(session_id, game, round)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_ready(
        &self,
        ready: ReadyEntity,
    ) -> BoxFuture<'static, StorageResult<InsertOutcome<ReadyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.insert_ready(ready).await.map_err(Into::into) })
    }

    fn list_ready(
        &self,
        session_id: Uuid,
        game: GameKind,
        round: u8,
    ) -> BoxFuture<'static, StorageResult<Vec<ReadyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_ready(session_id, game, round)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
