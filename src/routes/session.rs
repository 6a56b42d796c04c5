use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        JoinRequest, JoinResponse, OverviewResponse, QuestionBankResponse, SessionView,
        SessionWaitResponse, WaitQuery,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling session pairing and the main menu.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/join", post(join_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/wait", get(wait_session))
        .route("/sessions/{id}/overview", get(get_overview))
        .route("/questions", get(list_questions))
}

/// Join a session as one of the two participants, creating it when none is open.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined session", body = JoinResponse),
        (status = 400, description = "Unknown participant or malformed code"),
        (status = 404, description = "No session matches the code"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<JoinResponse>, AppError> {
    let joined = session_service::join(&state, payload).await?;
    Ok(Json(joined))
}

/// Fetch a session and its connection flags.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_service::get_session(&state, id).await?;
    Ok(Json(session))
}

/// Wait until both participants are connected.
#[utoipa::path(
    get,
    path = "/sessions/{id}/wait",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier"), WaitQuery),
    responses(
        (status = 200, description = "Wait outcome", body = SessionWaitResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn wait_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<SessionWaitResponse>, AppError> {
    let outcome = session_service::wait_until_connected(&state, id, query.timeout_secs).await?;
    Ok(Json(outcome))
}

/// Main menu: progress of every game and the reward once they are all completed.
#[utoipa::path(
    get,
    path = "/sessions/{id}/overview",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session overview", body = OverviewResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_overview(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OverviewResponse>, AppError> {
    let overview = session_service::get_overview(&state, id).await?;
    Ok(Json(overview))
}

/// List the question bank of every game.
#[utoipa::path(
    get,
    path = "/questions",
    tag = "sessions",
    responses((status = 200, description = "Question bank", body = QuestionBankResponse))
)]
pub async fn list_questions(State(state): State<SharedState>) -> Json<QuestionBankResponse> {
    Json(QuestionBankResponse::from(state.config().as_ref()))
}
