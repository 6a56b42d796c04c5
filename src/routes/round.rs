use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::round::{
        ParticipantQuery, ReadyRequest, ReadyResponse, ResultsResponse, RoundView,
        RoundWaitQuery, RoundWaitResponse, SubmitRequest, SubmitResponse,
    },
    error::AppError,
    services::round_service,
    state::{SharedState, game::GameKind},
};

/// Routes of the round-gated protocol shared by every game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/games/{game}/round", get(get_round))
        .route(
            "/sessions/{id}/games/{game}/rounds/{round}/responses",
            post(submit_response),
        )
        .route(
            "/sessions/{id}/games/{game}/rounds/{round}/results",
            get(get_results),
        )
        .route(
            "/sessions/{id}/games/{game}/rounds/{round}/ready",
            post(mark_ready),
        )
        .route(
            "/sessions/{id}/games/{game}/rounds/{round}/wait",
            get(wait_round),
        )
}

/// Current round of a game as seen by one participant.
#[utoipa::path(
    get,
    path = "/sessions/{id}/games/{game}/round",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("game" = GameKind, Path, description = "Game identifier"),
        ParticipantQuery
    ),
    responses(
        (status = 200, description = "Round view", body = RoundView),
        (status = 400, description = "Unknown participant"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_round(
    State(state): State<SharedState>,
    Path((id, game)): Path<(Uuid, GameKind)>,
    Valid(Query(query)): Valid<Query<ParticipantQuery>>,
) -> Result<Json<RoundView>, AppError> {
    let view = round_service::get_round(&state, id, game, &query.participant).await?;
    Ok(Json(view))
}

/// Submit the answer of a participant for a round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/games/{game}/rounds/{round}/responses",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("game" = GameKind, Path, description = "Game identifier"),
        ("round" = u8, Path, description = "Round number (1-based)")
    ),
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Stored answer", body = SubmitResponse),
        (status = 400, description = "Answer rejected"),
        (status = 409, description = "Round not open or game completed")
    )
)]
pub async fn submit_response(
    State(state): State<SharedState>,
    Path((id, game, round)): Path<(Uuid, GameKind, u8)>,
    Valid(Json(payload)): Valid<Json<SubmitRequest>>,
) -> Result<Json<SubmitResponse>, AppError> {
    let submitted = round_service::submit(&state, id, game, round, payload).await?;
    Ok(Json(submitted))
}

/// Both answers of a round, once available.
#[utoipa::path(
    get,
    path = "/sessions/{id}/games/{game}/rounds/{round}/results",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("game" = GameKind, Path, description = "Game identifier"),
        ("round" = u8, Path, description = "Round number (1-based)")
    ),
    responses(
        (status = 200, description = "Round results", body = ResultsResponse),
        (status = 409, description = "Results not available yet")
    )
)]
pub async fn get_results(
    State(state): State<SharedState>,
    Path((id, game, round)): Path<(Uuid, GameKind, u8)>,
) -> Result<Json<ResultsResponse>, AppError> {
    let results = round_service::get_results(&state, id, game, round).await?;
    Ok(Json(results))
}

/// Acknowledge the results of a round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/games/{game}/rounds/{round}/ready",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("game" = GameKind, Path, description = "Game identifier"),
        ("round" = u8, Path, description = "Round number (1-based)")
    ),
    request_body = ReadyRequest,
    responses(
        (status = 200, description = "Acknowledgement recorded", body = ReadyResponse),
        (status = 409, description = "Results not available yet or round closed")
    )
)]
pub async fn mark_ready(
    State(state): State<SharedState>,
    Path((id, game, round)): Path<(Uuid, GameKind, u8)>,
    Valid(Json(payload)): Valid<Json<ReadyRequest>>,
) -> Result<Json<ReadyResponse>, AppError> {
    let outcome = round_service::ready(&state, id, game, round, payload).await?;
    Ok(Json(outcome))
}

/// Wait until both participants submitted or acknowledged a round.
#[utoipa::path(
    get,
    path = "/sessions/{id}/games/{game}/rounds/{round}/wait",
    tag = "rounds",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("game" = GameKind, Path, description = "Game identifier"),
        ("round" = u8, Path, description = "Round number (1-based)"),
        RoundWaitQuery
    ),
    responses((status = 200, description = "Wait outcome", body = RoundWaitResponse))
)]
pub async fn wait_round(
    State(state): State<SharedState>,
    Path((id, game, round)): Path<(Uuid, GameKind, u8)>,
    Query(query): Query<RoundWaitQuery>,
) -> Result<Json<RoundWaitResponse>, AppError> {
    let outcome =
        round_service::wait_round(&state, id, game, round, query.target, query.timeout_secs)
            .await?;
    Ok(Json(outcome))
}
