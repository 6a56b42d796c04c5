pub mod drawing;
pub mod game;
mod sse;
pub mod state_machine;

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, RwLock, watch},
    task::AbortHandle,
    time::timeout,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::session_store::SessionStore, error::ServiceError,
    state::game::GameKind,
};

pub use self::drawing::{DrawingRooms, RoomFrame};
pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_CAPACITY: usize = 64;

/// Pending drawful countdown of a session.
pub struct GuessTimer {
    /// Round the countdown belongs to.
    pub round: u8,
    /// Moment the missing answers get filled in.
    pub deadline: Instant,
    /// Handle used to cancel the countdown task.
    pub handle: AbortHandle,
}

/// Central application state storing persistent connections and database handles.
pub struct AppState {
    config: Arc<AppConfig>,
    store: RwLock<Option<Arc<dyn SessionStore>>>,
    events: SseHub,
    drawing_rooms: DrawingRooms,
    round_gates: DashMap<(Uuid, GameKind), Arc<Mutex<()>>>,
    join_gate: Mutex<()>,
    guess_timers: DashMap<Uuid, GuessTimer>,
    degraded: watch::Sender<bool>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            store: RwLock::new(None),
            events: SseHub::new(EVENT_CAPACITY),
            drawing_rooms: DrawingRooms::default(),
            round_gates: DashMap::new(),
            join_gate: Mutex::new(()),
            guess_timers: DashMap::new(),
            degraded: degraded_tx,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Build a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn SessionStore>) -> SharedState {
        let state = Self::new(config);
        state.set_store(store).await;
        state
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub for the per-session change feed.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    /// Live drawing rooms.
    pub fn drawing_rooms(&self) -> &DrawingRooms {
        &self.drawing_rooms
    }

    /// Pending drawful countdowns keyed by session.
    pub fn guess_timers(&self) -> &DashMap<Uuid, GuessTimer> {
        &self.guess_timers
    }

    /// Seconds left on the countdown of `round`, if one is running.
    pub fn guess_timer_remaining(&self, session_id: Uuid, round: u8) -> Option<u64> {
        self.guess_timers
            .get(&session_id)
            .filter(|timer| timer.round == round)
            .map(|timer| {
                timer
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs()
            })
    }

    /// Cancel the countdown of `round`, if it is still pending.
    pub fn disarm_guess_timer(&self, session_id: Uuid, round: u8) {
        if let Some((_, timer)) = self
            .guess_timers
            .remove_if(&session_id, |_, timer| timer.round == round)
        {
            timer.handle.abort();
        }
    }

    /// Run `work` while holding the gate of one (session, game) pair.
    ///
    /// Mutations of a game are serialized; a hung store call surfaces as
    /// [`ServiceError::Timeout`].
    pub async fn run_gated<F, Fut, T>(
        &self,
        session_id: Uuid,
        game: GameKind,
        work: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self
            .round_gates
            .entry((session_id, game))
            .or_default()
            .clone();
        let _guard = gate.lock().await;
        self.bounded(work()).await.inspect_err(|err| {
            if matches!(err, ServiceError::Timeout) {
                warn!(%session_id, %game, "round transition timed out");
            }
        })
    }

    /// Forget the gate of a game that accepts no more transitions.
    pub fn release_gate(&self, session_id: Uuid, game: GameKind) {
        self.round_gates.remove(&(session_id, game));
    }

    #[cfg(test)]
    pub(crate) fn has_gate(&self, session_id: Uuid, game: GameKind) -> bool {
        self.round_gates.contains_key(&(session_id, game))
    }

    /// Run `work` while holding the process-wide join gate.
    pub async fn run_join<F, Fut, T>(&self, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let _guard = self.join_gate.lock().await;
        self.bounded(work()).await
    }

    async fn bounded<Fut, T>(&self, work: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.transition_timeout {
            Some(limit) => timeout(limit, work)
                .await
                .unwrap_or(Err(ServiceError::Timeout)),
            None => work.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::session_store::memory::MemorySessionStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state.set_store(Arc::new(MemorySessionStore::new())).await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_store().await;
        assert!(state.is_degraded());
    }

    #[tokio::test]
    async fn gated_work_times_out() {
        let state = AppState::new(AppConfig::default());
        let result: Result<(), _> = state
            .run_gated(Uuid::new_v4(), GameKind::Top10, || {
                std::future::pending::<Result<(), ServiceError>>()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));
    }

    #[tokio::test]
    async fn released_gates_are_dropped() {
        let state = AppState::new(AppConfig::default());
        let session_id = Uuid::new_v4();
        state
            .run_gated(session_id, GameKind::Drawful, || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(state.round_gates.len(), 1);

        state.release_gate(session_id, GameKind::Drawful);
        assert!(state.round_gates.is_empty());
    }

    #[tokio::test]
    async fn disarm_only_cancels_the_matching_round() {
        let state = AppState::new(AppConfig::default());
        let session_id = Uuid::new_v4();
        let task = tokio::spawn(std::future::pending::<()>());
        state.guess_timers().insert(
            session_id,
            GuessTimer {
                round: 2,
                deadline: Instant::now() + Duration::from_secs(30),
                handle: task.abort_handle(),
            },
        );

        state.disarm_guess_timer(session_id, 1);
        assert!(state.guess_timer_remaining(session_id, 2).is_some());
        assert!(state.guess_timer_remaining(session_id, 1).is_none());

        state.disarm_guess_timer(session_id, 2);
        assert!(state.guess_timer_remaining(session_id, 2).is_none());
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
