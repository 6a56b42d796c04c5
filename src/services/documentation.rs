use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Pair Play Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::join_session,
        crate::routes::session::get_session,
        crate::routes::session::wait_session,
        crate::routes::session::get_overview,
        crate::routes::session::list_questions,
        crate::routes::round::get_round,
        crate::routes::round::submit_response,
        crate::routes::round::get_results,
        crate::routes::round::mark_ready,
        crate::routes::round::wait_round,
        crate::routes::sse::session_stream,
        crate::routes::drawing::drawing_ws,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::JoinRequest,
            crate::dto::session::JoinResponse,
            crate::dto::session::SessionView,
            crate::dto::session::OverviewResponse,
            crate::dto::session::SessionWaitResponse,
            crate::dto::session::QuestionBankResponse,
            crate::dto::round::RoundView,
            crate::dto::round::SubmitRequest,
            crate::dto::round::SubmitResponse,
            crate::dto::round::ResultsResponse,
            crate::dto::round::ReadyRequest,
            crate::dto::round::ReadyResponse,
            crate::dto::round::RoundWaitResponse,
            crate::dto::round::WaitTarget,
            crate::dto::draw::DrawInbound,
            crate::dto::draw::DrawOutbound,
            crate::dto::sse::Handshake,
            crate::dto::sse::RoundSubmittedEvent,
            crate::dto::sse::RoundResultsEvent,
            crate::dto::sse::RoundReadyEvent,
            crate::dto::sse::RoundAdvancedEvent,
            crate::dto::sse::GameCompletedEvent,
            crate::state::game::Answer,
            crate::state::game::GameKind,
            crate::state::game::Seat,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Joining and inspecting sessions"),
        (name = "rounds", description = "Round-gated game protocol"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "drawing", description = "WebSocket relay for drawful strokes"),
    )
)]
pub struct ApiDoc;
