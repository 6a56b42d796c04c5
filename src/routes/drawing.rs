use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{services::drawing_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{id}/drawing/ws",
    tag = "drawing",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a drawing relay socket for the session.
pub async fn drawing_ws(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| drawing_service::handle_socket(state, id, socket))
}

/// Configure the drawing WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/drawing/ws", get(drawing_ws))
}
