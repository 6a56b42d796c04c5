use std::{convert::Infallible, future::Future, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    time::{Instant, timeout_at},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        session::SessionView,
        sse::{Handshake, ServerEvent},
    },
    error::ServiceError,
    services::session_service,
    state::SharedState,
};

/// Subscribe to the change feed of one session, queueing a handshake as the first event.
pub async fn subscribe_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(broadcast::Receiver<ServerEvent>, ServerEvent), ServiceError> {
    let receiver = state.events().subscribe();
    let session: SessionView = session_service::get_session(state, session_id).await?;
    let handshake = Handshake {
        session_id,
        degraded: state.is_degraded(),
        session,
    };
    let event = ServerEvent::json(session_id, Some("handshake".to_string()), &handshake)
        .map_err(|err| ServiceError::InvalidState(err.to_string()))?;
    Ok((receiver, event))
}

/// Convert a broadcast receiver into an SSE response carrying the events of `session_id`.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    session_id: Uuid,
    handshake: ServerEvent,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if tx.send(Ok(to_event(handshake))).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) if payload.session_id != session_id => continue,
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        info!(%session_id, "session SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Block until `check` holds, re-evaluating it whenever the session publishes an event.
///
/// Returns `false` when the timeout expires first. The subscription is taken before the
/// first check so no change can slip in between.
pub async fn wait_until<F, Fut>(
    state: &SharedState,
    session_id: Uuid,
    limit: Duration,
    mut check: F,
) -> Result<bool, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ServiceError>>,
{
    let mut receiver = state.events().subscribe();
    if check().await? {
        return Ok(true);
    }

    let deadline = Instant::now() + limit;
    loop {
        match timeout_at(deadline, receiver.recv()).await {
            Err(_) | Ok(Err(RecvError::Closed)) => return Ok(false),
            Ok(Ok(event)) if event.session_id != session_id => continue,
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {
                if check().await? {
                    return Ok(true);
                }
            }
        }
    }
}
