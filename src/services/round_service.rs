//! Round-gated protocol shared by every game: submit, results, ready handshake, advance.

use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{InsertOutcome, ProgressEntity, ReadyEntity, ResponseEntity},
        session_store::SessionStore,
    },
    dto::{
        draw::DrawOutbound,
        round::{
            ReadyRequest, ReadyResponse, ResponseView, ResultsResponse, RoundView,
            RoundWaitResponse, SeatFlags, SubmitRequest, SubmitResponse, WaitTarget,
        },
    },
    error::ServiceError,
    services::{
        session_service::{self, load_session, resolve_seat},
        sse_events, sse_service,
    },
    state::{
        GuessTimer, RoomFrame, SharedState,
        game::{Answer, DrawRole, GameKind, Seat, drawful_drawer, drawful_role},
        state_machine::{Plan, RoundEffect, RoundEvent, RoundPhase, RoundStateMachine},
    },
};

/// Persisted rows of the open round of one game, with the machine rebuilt from them.
struct RoundContext {
    progress: ProgressEntity,
    responses: Vec<ResponseEntity>,
    machine: RoundStateMachine,
}

impl RoundContext {
    fn response_of(&self, seat: Seat) -> Option<&ResponseEntity> {
        self.responses.iter().find(|row| row.participant == seat)
    }
}

async fn load_round(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    game: GameKind,
) -> Result<RoundContext, ServiceError> {
    let progress = store
        .find_progress(session_id, game)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no {game} progress for session `{session_id}`"))
        })?;
    let round = progress.current_round;
    let responses = store.list_responses(session_id, game, round).await?;
    let ready = store.list_ready(session_id, game, round).await?;
    let machine = RoundStateMachine::restore(
        game,
        round,
        progress.completed,
        responses.iter().map(|row| row.participant),
        ready.iter().map(|row| row.participant),
    );

    Ok(RoundContext {
        progress,
        responses,
        machine,
    })
}

fn round_view(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    seat: Seat,
    machine: &RoundStateMachine,
) -> RoundView {
    let config = state.config();
    let snapshot = machine.snapshot();
    let role = (game == GameKind::Drawful).then(|| drawful_role(seat, snapshot.round));
    let prompt_visible =
        role != Some(DrawRole::Guesser) || snapshot.phase != RoundPhase::Collecting;

    RoundView {
        game,
        round: snapshot.round,
        max_rounds: game.max_rounds(),
        prompt: prompt_visible
            .then(|| config.prompt(game, snapshot.round))
            .flatten(),
        participant: config.participant_name(seat).to_owned(),
        seat,
        state: machine.seat_state(seat),
        phase: snapshot.phase,
        role,
        submitted: SeatFlags::from_seats(snapshot.submitted),
        ready: SeatFlags::from_seats(snapshot.ready),
        timer_remaining_secs: (game == GameKind::Drawful)
            .then(|| state.guess_timer_remaining(session_id, snapshot.round))
            .flatten(),
    }
}

/// Current round of `game` from the point of view of `participant`.
pub async fn get_round(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    participant: &str,
) -> Result<RoundView, ServiceError> {
    let seat = resolve_seat(state, participant)?;
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;

    let mut ctx = load_round(&store, session_id, game).await?;
    if ctx.machine.pending_close(seat).is_some() {
        let (plan, repaired) = state
            .run_gated(session_id, game, || async {
                let mut ctx = load_round(&store, session_id, game).await?;
                let plan = close_pending(&store, &mut ctx, seat).await?;
                Ok((plan, ctx))
            })
            .await?;
        if let Some(plan) = plan {
            announce_round_closed(state, &store, session_id, game, plan).await?;
        }
        ctx = repaired;
    }
    if game == GameKind::Drawful && ctx.machine.phase() == RoundPhase::Collecting {
        arm_guess_timer(state, session_id, ctx.machine.round());
    }
    Ok(round_view(state, session_id, game, seat, &ctx.machine))
}

/// Outcome of recording one answer under the gate.
struct Recorded {
    response: ResponseEntity,
    plan: Plan,
    inserted: bool,
    machine: RoundStateMachine,
}

/// Record an answer of `seat` for the open round. Must run under the (session, game) gate.
async fn record_answer(
    store: &Arc<dyn SessionStore>,
    ctx: RoundContext,
    seat: Seat,
    question: Option<String>,
    answer: Answer,
    timed_out: bool,
) -> Result<Recorded, ServiceError> {
    let RoundContext {
        progress,
        responses,
        mut machine,
    } = ctx;
    let plan = machine.plan(RoundEvent::Submit(seat))?;

    if plan.effect == RoundEffect::Duplicate {
        if let Some(existing) = responses.into_iter().find(|row| row.participant == seat) {
            return Ok(Recorded {
                response: existing,
                plan,
                inserted: false,
                machine,
            });
        }
    }

    let outcome = store
        .insert_response(ResponseEntity {
            session_id: progress.session_id,
            game: progress.game,
            participant: seat,
            round: machine.round(),
            question,
            answer,
            timed_out,
            created_at: SystemTime::now(),
        })
        .await?;

    let inserted = outcome.is_inserted();
    machine.apply(plan);
    Ok(Recorded {
        response: outcome.into_inner(),
        plan,
        inserted,
        machine,
    })
}

fn announce_recorded(state: &SharedState, session_id: Uuid, game: GameKind, recorded: &Recorded) {
    if !recorded.inserted {
        return;
    }
    let round = recorded.response.round;
    let seat = recorded.response.participant;
    let timed_out = recorded.response.timed_out;

    sse_events::broadcast_round_submitted(state, session_id, game, round, seat, timed_out);
    if game == GameKind::Drawful {
        state.drawing_rooms().publish(
            session_id,
            RoomFrame {
                origin: None,
                message: DrawOutbound::Submitted {
                    seat,
                    round,
                    timed_out,
                },
            },
        );
    }

    if recorded.plan.effect == RoundEffect::ShowResults {
        info!(%session_id, %game, round, "both answers in; showing results");
        if game == GameKind::Drawful {
            state.disarm_guess_timer(session_id, round);
        }
        sse_events::broadcast_round_results(state, session_id, game, round);
    }
}

/// Store the answer of `request.participant` for `round`.
///
/// A repeated submission returns the stored answer unchanged.
pub async fn submit(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    round: u8,
    request: SubmitRequest,
) -> Result<SubmitResponse, ServiceError> {
    let seat = resolve_seat(state, &request.participant)?;
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;
    let config = state.config();

    let role = (game == GameKind::Drawful).then(|| drawful_role(seat, round));
    request
        .answer
        .validate_for(game, role, config.max_snapshot_bytes())?;
    let answer = request.answer.normalized();

    let recorded = state
        .run_gated(session_id, game, || async {
            let ctx = load_round(&store, session_id, game).await?;
            ensure_open_round(&ctx, round)?;
            record_answer(
                &store,
                ctx,
                seat,
                config.prompt(game, round),
                answer,
                false,
            )
            .await
        })
        .await?;

    if !recorded.inserted {
        debug!(%session_id, %game, round, seat = seat.as_str(), "duplicate submission ignored");
    }
    announce_recorded(state, session_id, game, &recorded);

    Ok(SubmitResponse {
        round: round_view(state, session_id, game, seat, &recorded.machine),
        duplicate: !recorded.inserted,
        response: ResponseView::new(recorded.response, &config),
    })
}

fn ensure_open_round(ctx: &RoundContext, round: u8) -> Result<(), ServiceError> {
    if ctx.progress.completed {
        return Err(ServiceError::InvalidState("game already completed".into()));
    }
    let current = ctx.machine.round();
    if round != current {
        return Err(ServiceError::InvalidState(format!(
            "round {round} is not open (current round is {current})"
        )));
    }
    Ok(())
}

/// Both answers of `round`, available once both participants submitted.
pub async fn get_results(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    round: u8,
) -> Result<ResultsResponse, ServiceError> {
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;
    if round == 0 || round > game.max_rounds() {
        return Err(ServiceError::NotFound(format!(
            "{game} has no round {round}"
        )));
    }

    let responses = store.list_responses(session_id, game, round).await?;
    if responses.len() < Seat::BOTH.len() {
        return Err(ServiceError::InvalidState(
            "results are not available until both participants submit".into(),
        ));
    }

    let config = state.config();
    let prompt = responses
        .iter()
        .find_map(|row| row.question.clone())
        .or_else(|| config.prompt(game, round));
    Ok(ResultsResponse {
        game,
        round,
        prompt,
        responses: responses
            .into_iter()
            .map(|row| ResponseView::new(row, &config))
            .collect(),
    })
}

/// Mark `request.participant` ready to leave the results of `round`.
///
/// The second acknowledgement closes the round: the game advances, or completes after its
/// final round.
pub async fn ready(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    round: u8,
    request: ReadyRequest,
) -> Result<ReadyResponse, ServiceError> {
    let seat = resolve_seat(state, &request.participant)?;
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;

    let (plan, machine, inserted) = state
        .run_gated(session_id, game, || async {
            let mut ctx = load_round(&store, session_id, game).await?;
            let current = ctx.machine.round();

            if round < current || (ctx.progress.completed && round == current) {
                // The round already closed; a late retry is a no-op.
                let seats = store.list_ready(session_id, game, round).await?;
                if seats.iter().any(|row| row.participant == seat) {
                    let plan = Plan {
                        event: RoundEvent::Ready(seat),
                        effect: RoundEffect::Duplicate,
                        to: ctx.machine.phase(),
                    };
                    return Ok((plan, ctx.machine, false));
                }
                return Err(ServiceError::InvalidState(format!(
                    "round {round} is already closed"
                )));
            }
            if round > current {
                return Err(ServiceError::InvalidState(format!(
                    "round {round} is not open (current round is {current})"
                )));
            }

            if let Some(plan) = close_pending(&store, &mut ctx, seat).await? {
                return Ok((plan, ctx.machine, true));
            }

            let plan = ctx.machine.plan(RoundEvent::Ready(seat))?;
            if plan.effect == RoundEffect::Duplicate {
                return Ok((plan, ctx.machine, false));
            }

            let outcome = store
                .insert_ready(ReadyEntity {
                    session_id,
                    game,
                    participant: seat,
                    round,
                    created_at: SystemTime::now(),
                })
                .await?;
            if let InsertOutcome::Existing(_) = outcome {
                return Ok((plan, ctx.machine, false));
            }

            persist_close(&store, &mut ctx.progress, plan.effect).await?;
            ctx.machine.apply(plan);
            Ok((plan, ctx.machine, true))
        })
        .await?;

    let mut all_completed = false;
    if inserted {
        sse_events::broadcast_round_ready(state, session_id, game, round, seat);
        all_completed = announce_round_closed(state, &store, session_id, game, plan).await?;
    } else {
        debug!(%session_id, %game, round, seat = seat.as_str(), "duplicate ready ignored");
        if machine.phase() == RoundPhase::Completed {
            let progress = store.list_progress(session_id).await?;
            all_completed = session_service::all_completed(&progress);
        }
    }

    Ok(ReadyResponse {
        advanced: matches!(plan.effect, RoundEffect::Advance { .. }) && inserted,
        completed: machine.phase() == RoundPhase::Completed,
        all_completed,
        round: round_view(state, session_id, game, seat, &machine),
    })
}

/// Move the progress row forward when `effect` closes the round.
async fn persist_close(
    store: &Arc<dyn SessionStore>,
    progress: &mut ProgressEntity,
    effect: RoundEffect,
) -> Result<(), ServiceError> {
    match effect {
        RoundEffect::Advance { next_round } => progress.current_round = next_round,
        RoundEffect::Complete => progress.completed = true,
        _ => return Ok(()),
    }
    progress.updated_at = SystemTime::now();
    store.save_progress(progress.clone()).await?;
    Ok(())
}

/// Finish a round whose acknowledgements are all stored but whose progress write was lost.
///
/// Must run under the game's gate.
async fn close_pending(
    store: &Arc<dyn SessionStore>,
    ctx: &mut RoundContext,
    seat: Seat,
) -> Result<Option<Plan>, ServiceError> {
    let Some(plan) = ctx.machine.pending_close(seat) else {
        return Ok(None);
    };
    warn!(
        session_id = %ctx.progress.session_id,
        game = %ctx.progress.game,
        round = ctx.machine.round(),
        "both participants were ready but the round never closed; closing it now"
    );
    persist_close(store, &mut ctx.progress, plan.effect).await?;
    ctx.machine.apply(plan);
    Ok(Some(plan))
}

/// Publish the consequences of a closing round. Returns whether every game is now completed.
async fn announce_round_closed(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    game: GameKind,
    plan: Plan,
) -> Result<bool, ServiceError> {
    match plan.effect {
        RoundEffect::Advance { next_round } => {
            info!(%session_id, %game, round = next_round, "round advanced");
            sse_events::broadcast_round_advanced(state, session_id, game, next_round);
            publish_progress(state, store, session_id, game).await?;

            if game == GameKind::Drawful {
                let timer = arm_guess_timer(state, session_id, next_round);
                state.drawing_rooms().publish(
                    session_id,
                    RoomFrame {
                        origin: None,
                        message: DrawOutbound::Round {
                            round: next_round,
                            drawer: drawful_drawer(next_round),
                            timer_secs: timer.map(|limit| limit.as_secs()),
                        },
                    },
                );
            }
            Ok(false)
        }
        RoundEffect::Complete => {
            info!(%session_id, %game, "game completed");
            state.release_gate(session_id, game);
            sse_events::broadcast_game_completed(state, session_id, game);
            publish_progress(state, store, session_id, game).await?;

            let progress = store.list_progress(session_id).await?;
            let finished = session_service::all_completed(&progress);
            if finished {
                info!(%session_id, "every game completed; reward unlocked");
                sse_events::broadcast_reward_unlocked(state, session_id);
            }
            Ok(finished)
        }
        _ => Ok(false),
    }
}

async fn publish_progress(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    game: GameKind,
) -> Result<(), ServiceError> {
    if let Some(progress) = store.find_progress(session_id, game).await? {
        sse_events::broadcast_progress_updated(state, &progress);
    }
    Ok(())
}

/// Wait until both participants submitted (or acknowledged) `round`.
pub async fn wait_round(
    state: &SharedState,
    session_id: Uuid,
    game: GameKind,
    round: u8,
    target: WaitTarget,
    timeout_secs: Option<u64>,
) -> Result<RoundWaitResponse, ServiceError> {
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;
    let limit = state.config().wait_timeout(timeout_secs);

    let reached = sse_service::wait_until(state, session_id, limit, || {
        let store = store.clone();
        async move {
            let flags = round_flags(&store, session_id, game, round).await?;
            Ok(target_reached(target, flags))
        }
    })
    .await?;

    let (submitted, ready) = round_flags(&store, session_id, game, round).await?;
    Ok(RoundWaitResponse {
        target,
        reached,
        round,
        submitted,
        ready,
    })
}

fn target_reached(target: WaitTarget, (submitted, ready): (SeatFlags, SeatFlags)) -> bool {
    match target {
        WaitTarget::BothSubmitted => submitted.both(),
        WaitTarget::BothReady => ready.both(),
    }
}

async fn round_flags(
    store: &Arc<dyn SessionStore>,
    session_id: Uuid,
    game: GameKind,
    round: u8,
) -> Result<(SeatFlags, SeatFlags), ServiceError> {
    let responses = store.list_responses(session_id, game, round).await?;
    let ready = store.list_ready(session_id, game, round).await?;
    Ok((
        SeatFlags::from_seats(responses.iter().map(|row| row.participant)),
        SeatFlags::from_seats(ready.iter().map(|row| row.participant)),
    ))
}

/// Start the countdown of a drawful round unless one is already running for it.
///
/// Returns the configured countdown when a timer covers the round.
fn arm_guess_timer(state: &SharedState, session_id: Uuid, round: u8) -> Option<Duration> {
    let limit = state.config().guess_timer()?;

    match state.guess_timers().entry(session_id) {
        Entry::Occupied(entry) if entry.get().round == round => {}
        entry => {
            let task_state = state.clone();
            let task = tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                task_state
                    .guess_timers()
                    .remove_if(&session_id, |_, timer| timer.round == round);
                if let Err(err) = expire_drawful_round(&task_state, session_id, round).await {
                    warn!(%session_id, round, error = %err, "failed to fill in timed out answers");
                }
            });
            let timer = GuessTimer {
                round,
                deadline: Instant::now() + limit,
                handle: task.abort_handle(),
            };
            match entry {
                Entry::Occupied(mut entry) => entry.insert(timer).handle.abort(),
                Entry::Vacant(entry) => {
                    entry.insert(timer);
                }
            }
            debug!(%session_id, round, secs = limit.as_secs(), "drawful countdown started");
        }
    }
    Some(limit)
}

/// Fill in the answers still missing when the countdown of `round` runs out.
async fn expire_drawful_round(
    state: &SharedState,
    session_id: Uuid,
    round: u8,
) -> Result<(), ServiceError> {
    let game = GameKind::Drawful;
    let store = state.require_store().await?;
    let config = state.config();

    let recorded = state
        .run_gated(session_id, game, || async {
            let mut recorded = Vec::new();
            for seat in Seat::BOTH {
                let ctx = load_round(&store, session_id, game).await?;
                if ctx.progress.completed
                    || ctx.machine.round() != round
                    || ctx.machine.phase() != RoundPhase::Collecting
                    || ctx.response_of(seat).is_some()
                {
                    continue;
                }
                let answer = Answer::timed_out(drawful_role(seat, round));
                recorded.push(
                    record_answer(
                        &store,
                        ctx,
                        seat,
                        config.prompt(game, round),
                        answer,
                        true,
                    )
                    .await?,
                );
            }
            Ok(recorded)
        })
        .await?;

    if !recorded.is_empty() {
        info!(%session_id, round, missing = recorded.len(), "drawful countdown expired");
    }
    for entry in &recorded {
        announce_recorded(state, session_id, game, entry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::SessionEntity,
            session_store::memory::MemorySessionStore,
            storage::{StorageError, StorageResult},
        },
        dto::session::JoinRequest,
        state::{AppState, state_machine::SeatRoundState},
    };

    const FIRST: &str = "Guille";
    const SECOND: &str = "Delfina";

    async fn pair_up(state: &SharedState) -> Uuid {
        let mut session_id = Uuid::nil();
        for name in [FIRST, SECOND] {
            let joined = session_service::join(
                state,
                JoinRequest {
                    participant: name.into(),
                    code: None,
                },
            )
            .await
            .unwrap();
            session_id = joined.session.id;
        }
        session_id
    }

    async fn paired() -> (SharedState, Arc<MemorySessionStore>, Uuid) {
        let store = Arc::new(MemorySessionStore::new());
        let state = AppState::with_store(AppConfig::default(), store.clone()).await;
        let session_id = pair_up(&state).await;
        (state, store, session_id)
    }

    /// Memory store whose progress writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySessionStore,
        failing_progress_saves: AtomicUsize,
    }

    impl FlakyStore {
        fn fail_progress_saves(&self, count: usize) {
            self.failing_progress_saves.store(count, Ordering::SeqCst);
        }
    }

    impl SessionStore for FlakyStore {
        fn claim_open_session(
            &self,
            seat: Seat,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.claim_open_session(seat)
        }
        fn create_session(
            &self,
            session: SessionEntity,
            progress: Vec<ProgressEntity>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_session(session, progress)
        }
        fn find_session(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.find_session(id)
        }
        fn find_session_by_code(
            &self,
            code: String,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.find_session_by_code(code)
        }
        fn connect(
            &self,
            id: Uuid,
            seat: Seat,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.connect(id, seat)
        }
        fn list_progress(
            &self,
            session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
            self.inner.list_progress(session_id)
        }
        fn find_progress(
            &self,
            session_id: Uuid,
            game: GameKind,
        ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
            self.inner.find_progress(session_id, game)
        }
        fn save_progress(
            &self,
            progress: ProgressEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            let failing = self
                .failing_progress_saves
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Box::pin(async {
                    Err(StorageError::unavailable(
                        "progress write rejected".into(),
                        std::io::Error::other("connection reset"),
                    ))
                });
            }
            self.inner.save_progress(progress)
        }
        fn insert_response(
            &self,
            response: ResponseEntity,
        ) -> BoxFuture<'static, StorageResult<InsertOutcome<ResponseEntity>>> {
            self.inner.insert_response(response)
        }
        fn list_responses(
            &self,
            session_id: Uuid,
            game: GameKind,
            round: u8,
        ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>> {
            self.inner.list_responses(session_id, game, round)
        }
        fn insert_ready(
            &self,
            ready: ReadyEntity,
        ) -> BoxFuture<'static, StorageResult<InsertOutcome<ReadyEntity>>> {
            self.inner.insert_ready(ready)
        }
        fn list_ready(
            &self,
            session_id: Uuid,
            game: GameKind,
            round: u8,
        ) -> BoxFuture<'static, StorageResult<Vec<ReadyEntity>>> {
            self.inner.list_ready(session_id, game, round)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    async fn answer_round(state: &SharedState, id: Uuid, game: GameKind, round: u8) {
        for name in [FIRST, SECOND] {
            submit(state, id, game, round, text(name, "same answer"))
                .await
                .unwrap();
        }
    }

    fn text(participant: &str, text: &str) -> SubmitRequest {
        SubmitRequest {
            participant: participant.into(),
            answer: Answer::Text { text: text.into() },
        }
    }

    fn ready_as(participant: &str) -> ReadyRequest {
        ReadyRequest {
            participant: participant.into(),
        }
    }

    #[tokio::test]
    async fn round_flows_through_results_and_ready() {
        let (state, _, id) = paired().await;
        let game = GameKind::PredictFuture;

        let view = get_round(&state, id, game, FIRST).await.unwrap();
        assert_eq!(view.round, 1);
        assert_eq!(view.state, SeatRoundState::Answering);
        assert!(view.prompt.is_some());

        let first = submit(&state, id, game, 1, text(FIRST, "a dog")).await.unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.round.state, SeatRoundState::WaitingForOther);
        assert!(matches!(
            get_results(&state, id, game, 1).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            ready(&state, id, game, 1, ready_as(FIRST)).await,
            Err(ServiceError::InvalidState(_))
        ));

        let second = submit(&state, id, game, 1, text(SECOND, "two cats")).await.unwrap();
        assert_eq!(second.round.phase, RoundPhase::Results);

        let results = get_results(&state, id, game, 1).await.unwrap();
        assert_eq!(results.responses.len(), 2);

        let waiting = ready(&state, id, game, 1, ready_as(FIRST)).await.unwrap();
        assert!(!waiting.advanced);
        assert_eq!(waiting.round.state, SeatRoundState::WaitingForReady);

        let advanced = ready(&state, id, game, 1, ready_as(SECOND)).await.unwrap();
        assert!(advanced.advanced);
        assert_eq!(advanced.round.round, 2);
        assert_eq!(advanced.round.state, SeatRoundState::Answering);

        let late = ready(&state, id, game, 1, ready_as(FIRST)).await.unwrap();
        assert!(!late.advanced);
        assert_eq!(late.round.round, 2);
    }

    #[tokio::test]
    async fn duplicate_submission_keeps_the_first_answer() {
        let (state, store, id) = paired().await;
        let game = GameKind::PredictFuture;

        submit(&state, id, game, 1, text(FIRST, "first")).await.unwrap();
        let again = submit(&state, id, game, 1, text(FIRST, "second")).await.unwrap();

        assert!(again.duplicate);
        assert_eq!(
            again.response.answer,
            Answer::Text {
                text: "first".into()
            }
        );
        assert_eq!(store.response_count().await, 1);
    }

    #[tokio::test]
    async fn blank_answers_write_nothing() {
        let (state, store, id) = paired().await;

        let err = submit(&state, id, GameKind::PredictFuture, 1, text(FIRST, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let short_list = SubmitRequest {
            participant: FIRST.into(),
            answer: Answer::List {
                items: vec!["one".into(); 9],
            },
        };
        assert!(matches!(
            submit(&state, id, GameKind::Top10, 1, short_list).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(store.response_count().await, 0);
    }

    #[tokio::test]
    async fn submissions_for_other_rounds_conflict() {
        let (state, _, id) = paired().await;
        assert!(matches!(
            submit(&state, id, GameKind::PredictFuture, 2, text(FIRST, "early")).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn wait_round_resolves_when_the_second_answer_lands() {
        let (state, _, id) = paired().await;
        let game = GameKind::WouldYouDo;
        let choice = |participant: &str| SubmitRequest {
            participant: participant.into(),
            answer: Answer::Choice { yes: true },
        };
        submit(&state, id, game, 1, choice(FIRST)).await.unwrap();

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move {
                wait_round(&state, id, game, 1, WaitTarget::BothSubmitted, Some(5)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        submit(&state, id, game, 1, choice(SECOND)).await.unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert!(outcome.reached);
        assert!(outcome.submitted.both());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn drawful_roles_and_prompt_visibility() {
        let (state, _, id) = paired().await;
        let game = GameKind::Drawful;

        let drawer = get_round(&state, id, game, FIRST).await.unwrap();
        assert_eq!(drawer.role, Some(DrawRole::Drawer));
        assert_eq!(drawer.prompt.as_deref(), Some("Olivia"));
        assert!(drawer.timer_remaining_secs.is_some());

        let guesser = get_round(&state, id, game, SECOND).await.unwrap();
        assert_eq!(guesser.role, Some(DrawRole::Guesser));
        assert_eq!(guesser.prompt, None);

        let wrong_kind = SubmitRequest {
            participant: SECOND.into(),
            answer: Answer::Drawing { snapshot: None },
        };
        assert!(matches!(
            submit(&state, id, game, 1, wrong_kind).await,
            Err(ServiceError::InvalidInput(_))
        ));

        submit(
            &state,
            id,
            game,
            1,
            SubmitRequest {
                participant: FIRST.into(),
                answer: Answer::Drawing { snapshot: None },
            },
        )
        .await
        .unwrap();
        let closed = submit(
            &state,
            id,
            game,
            1,
            SubmitRequest {
                participant: SECOND.into(),
                answer: Answer::Guess {
                    text: Some("a dog".into()),
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(closed.round.phase, RoundPhase::Results);
        assert_eq!(closed.round.prompt.as_deref(), Some("Olivia"));
        assert!(state.guess_timer_remaining(id, 1).is_none());
    }

    #[tokio::test]
    async fn expired_countdown_fills_missing_answers() {
        let (state, store, id) = paired().await;
        let game = GameKind::Drawful;

        submit(
            &state,
            id,
            game,
            1,
            SubmitRequest {
                participant: FIRST.into(),
                answer: Answer::Drawing { snapshot: None },
            },
        )
        .await
        .unwrap();

        expire_drawful_round(&state, id, 1).await.unwrap();

        let results = get_results(&state, id, game, 1).await.unwrap();
        let guess = results
            .responses
            .iter()
            .find(|row| row.seat == Seat::Second)
            .unwrap();
        assert!(guess.timed_out);
        assert_eq!(guess.answer, Answer::Guess { text: None });
        assert_eq!(store.response_count().await, 2);

        // A second expiry of the same round changes nothing.
        expire_drawful_round(&state, id, 1).await.unwrap();
        assert_eq!(store.response_count().await, 2);
    }

    #[tokio::test]
    async fn lost_progress_write_is_finished_by_the_next_call() {
        let store = Arc::new(FlakyStore::default());
        let state = AppState::with_store(AppConfig::default(), store.clone()).await;
        let id = pair_up(&state).await;
        let game = GameKind::PredictFuture;

        answer_round(&state, id, game, 1).await;
        ready(&state, id, game, 1, ready_as(FIRST)).await.unwrap();
        store.fail_progress_saves(1);
        assert!(matches!(
            ready(&state, id, game, 1, ready_as(SECOND)).await,
            Err(ServiceError::Unavailable(_))
        ));

        let retried = ready(&state, id, game, 1, ready_as(SECOND)).await.unwrap();
        assert!(retried.advanced);
        assert_eq!(retried.round.round, 2);
        assert_eq!(retried.round.state, SeatRoundState::Answering);

        answer_round(&state, id, game, 2).await;
        ready(&state, id, game, 2, ready_as(FIRST)).await.unwrap();
        ready(&state, id, game, 2, ready_as(SECOND)).await.unwrap();
        answer_round(&state, id, game, 3).await;
        ready(&state, id, game, 3, ready_as(FIRST)).await.unwrap();
        store.fail_progress_saves(1);
        assert!(ready(&state, id, game, 3, ready_as(SECOND)).await.is_err());

        // A plain read closes the final round as well.
        let view = get_round(&state, id, game, SECOND).await.unwrap();
        assert_eq!(view.phase, RoundPhase::Completed);
        assert_eq!(view.round, 3);
        let progress = store.find_progress(id, game).await.unwrap().unwrap();
        assert!(progress.completed);
        assert!(!state.has_gate(id, game));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_fills_missing_answers_and_rearms_after_advance() {
        let (state, store, id) = paired().await;
        let game = GameKind::Drawful;
        let limit = state.config().guess_timer().unwrap();

        get_round(&state, id, game, SECOND).await.unwrap();
        submit(
            &state,
            id,
            game,
            1,
            SubmitRequest {
                participant: FIRST.into(),
                answer: Answer::Drawing { snapshot: None },
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(limit + Duration::from_secs(1)).await;

        let results = get_results(&state, id, game, 1).await.unwrap();
        let guess = results
            .responses
            .iter()
            .find(|row| row.seat == Seat::Second)
            .unwrap();
        assert!(guess.timed_out);
        assert!(state.guess_timer_remaining(id, 1).is_none());

        ready(&state, id, game, 1, ready_as(FIRST)).await.unwrap();
        let advanced = ready(&state, id, game, 1, ready_as(SECOND)).await.unwrap();
        assert!(advanced.advanced);
        assert!(state.guess_timer_remaining(id, 2).is_some());

        tokio::time::sleep(limit + Duration::from_secs(1)).await;

        let results = get_results(&state, id, game, 2).await.unwrap();
        assert_eq!(results.responses.len(), 2);
        assert!(results.responses.iter().all(|row| row.timed_out));
        assert_eq!(store.response_count().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_or_closed_countdowns_never_fire() {
        let (state, store, id) = paired().await;
        let game = GameKind::Drawful;
        let limit = state.config().guess_timer().unwrap();

        get_round(&state, id, game, FIRST).await.unwrap();
        for (name, answer) in [
            (FIRST, Answer::Drawing { snapshot: None }),
            (
                SECOND,
                Answer::Guess {
                    text: Some("a cat".into()),
                },
            ),
        ] {
            submit(
                &state,
                id,
                game,
                1,
                SubmitRequest {
                    participant: name.into(),
                    answer,
                },
            )
            .await
            .unwrap();
        }
        assert!(state.guess_timer_remaining(id, 1).is_none());

        ready(&state, id, game, 1, ready_as(FIRST)).await.unwrap();
        ready(&state, id, game, 1, ready_as(SECOND)).await.unwrap();
        assert!(state.guess_timer_remaining(id, 2).is_some());

        // A countdown for a later round takes over and aborts the pending one.
        arm_guess_timer(&state, id, 3);
        assert!(state.guess_timer_remaining(id, 2).is_none());

        tokio::time::sleep(limit + Duration::from_secs(1)).await;

        assert_eq!(store.response_count().await, 2);
        let view = get_round(&state, id, game, FIRST).await.unwrap();
        assert_eq!(view.round, 2);
        assert_eq!(view.phase, RoundPhase::Collecting);
    }
}
