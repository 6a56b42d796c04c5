use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::draw::{DrawInbound, DrawOutbound},
    error::ServiceError,
    services::session_service::{load_session, resolve_seat},
    state::{
        RoomFrame, SharedState,
        game::{DrawRole, GameKind, Seat, drawful_drawer, drawful_role},
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures while relaying a drawing frame.
#[derive(Debug, Error)]
enum DrawError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// Stroke sent by the participant who is guessing this round.
    #[error("only the drawer can draw during round {round}")]
    NotDrawer { round: u8 },
    /// Both answers of the round are in, or the game is over.
    #[error("round {round} no longer accepts strokes")]
    RoundClosed { round: u8 },
}

/// Drawful round a socket relays strokes for, kept current from room frames.
#[derive(Debug)]
struct StrokeGate {
    round: AtomicU8,
    /// One bit per seat that already submitted this round.
    submitted: AtomicU8,
    completed: AtomicBool,
}

const ALL_SEATS: u8 = 0b11;

fn seat_bit(seat: Seat) -> u8 {
    match seat {
        Seat::First => 0b01,
        Seat::Second => 0b10,
    }
}

impl StrokeGate {
    fn new(round: u8, submitted: impl IntoIterator<Item = Seat>, completed: bool) -> Self {
        let bits = submitted.into_iter().fold(0, |bits, seat| bits | seat_bit(seat));
        Self {
            round: AtomicU8::new(round),
            submitted: AtomicU8::new(bits),
            completed: AtomicBool::new(completed),
        }
    }

    fn round(&self) -> u8 {
        self.round.load(Ordering::SeqCst)
    }

    /// Track round changes and submissions announced to the room.
    fn observe(&self, message: &DrawOutbound) {
        match *message {
            DrawOutbound::Round { round, .. } => {
                if round > self.round.fetch_max(round, Ordering::SeqCst) {
                    self.submitted.store(0, Ordering::SeqCst);
                }
            }
            DrawOutbound::Submitted { seat, round, .. } if round == self.round() => {
                self.submitted.fetch_or(seat_bit(seat), Ordering::SeqCst);
            }
            _ => {}
        }
    }

    /// Reject strokes from `seat` unless it holds the pen of an open round.
    fn check(&self, seat: Seat) -> Result<(), DrawError> {
        let round = self.round();
        if self.completed.load(Ordering::SeqCst)
            || self.submitted.load(Ordering::SeqCst) == ALL_SEATS
        {
            return Err(DrawError::RoundClosed { round });
        }
        if drawful_drawer(round) != seat {
            return Err(DrawError::NotDrawer { round });
        }
        Ok(())
    }
}

/// Handle the full lifecycle of one drawing WebSocket connection.
pub async fn handle_socket(state: SharedState, session_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(%session_id, "drawing websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let seat = match identify(&state, session_id, &initial_message).await {
        Ok(seat) => seat,
        Err(err) => {
            warn!(%session_id, error = %err, "drawing websocket identification rejected");
            let _ = send_message_to_websocket(
                &outbound_tx,
                &DrawOutbound::Error {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let (room_rx, welcome, gate) = match open_room(&state, session_id, seat).await {
        Ok(opened) => opened,
        Err(err) => {
            warn!(%session_id, error = %err, "failed to load drawful round");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    info!(
        %session_id,
        seat = seat.as_str(),
        sockets = state.drawing_rooms().occupancy(session_id),
        "drawing socket connected"
    );

    if send_message_to_websocket(&outbound_tx, &welcome).is_err() {
        drop(room_rx);
        finalize(writer_task, outbound_tx).await;
        state.drawing_rooms().release(session_id);
        return;
    }

    let relay_task = spawn_room_relay(room_rx, seat, outbound_tx.clone(), gate.clone());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match DrawInbound::from_json_str(&text) {
                Ok(DrawInbound::Identify { .. }) => {
                    warn!(
                        %session_id,
                        seat = seat.as_str(),
                        "ignoring duplicate identification message"
                    );
                }
                Ok(DrawInbound::Unknown) => {
                    warn!(%session_id, seat = seat.as_str(), "ignoring unknown drawing message");
                }
                Ok(inbound) => match relay_stroke(&state, session_id, seat, &gate, &inbound) {
                    Ok(()) => {}
                    Err(DrawError::ConnectionClosed) => break,
                    Err(err) => {
                        let message = DrawOutbound::Error {
                            message: err.to_string(),
                        };
                        if send_message_to_websocket(&outbound_tx, &message).is_err() {
                            break;
                        }
                    }
                },
                Err(err) => {
                    warn!(%session_id, error = %err, "failed to parse drawing message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%session_id, seat = seat.as_str(), "drawing socket closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%session_id, error = %err, "websocket error");
                break;
            }
        }
    }

    relay_task.abort();
    let _ = relay_task.await;
    state.drawing_rooms().release(session_id);
    info!(%session_id, seat = seat.as_str(), "drawing socket disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn identify(
    state: &SharedState,
    session_id: Uuid,
    text: &str,
) -> Result<Seat, ServiceError> {
    let inbound = DrawInbound::from_json_str(text)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let DrawInbound::Identify { participant } = inbound else {
        return Err(ServiceError::InvalidInput(
            "first message must identify the participant".into(),
        ));
    };
    let seat = resolve_seat(state, &participant)?;
    let store = state.require_store().await?;
    load_session(&store, session_id).await?;
    Ok(seat)
}

/// Join the drawing room, then read the round the socket starts in.
///
/// Subscribing first keeps any round change published meanwhile queued for the relay.
async fn open_room(
    state: &SharedState,
    session_id: Uuid,
    seat: Seat,
) -> Result<(broadcast::Receiver<RoomFrame>, DrawOutbound, Arc<StrokeGate>), ServiceError> {
    let room_rx = state.drawing_rooms().subscribe(session_id);
    match welcome_message(state, session_id, seat).await {
        Ok((welcome, gate)) => Ok((room_rx, welcome, Arc::new(gate))),
        Err(err) => {
            drop(room_rx);
            state.drawing_rooms().release(session_id);
            Err(err)
        }
    }
}

async fn welcome_message(
    state: &SharedState,
    session_id: Uuid,
    seat: Seat,
) -> Result<(DrawOutbound, StrokeGate), ServiceError> {
    let store = state.require_store().await?;
    let (round, completed) = store
        .find_progress(session_id, GameKind::Drawful)
        .await?
        .map(|progress| (progress.current_round, progress.completed))
        .unwrap_or((1, false));
    let responses = store
        .list_responses(session_id, GameKind::Drawful, round)
        .await?;
    let role = drawful_role(seat, round);

    let welcome = DrawOutbound::Welcome {
        seat,
        round,
        role,
        prompt: (role == DrawRole::Drawer)
            .then(|| state.config().prompt(GameKind::Drawful, round))
            .flatten(),
        timer_remaining_secs: state.guess_timer_remaining(session_id, round),
    };
    let gate = StrokeGate::new(
        round,
        responses.iter().map(|row| row.participant),
        completed,
    );
    Ok((welcome, gate))
}

/// Mirror a stroke to the other sockets of the room, if `seat` holds the pen.
fn relay_stroke(
    state: &SharedState,
    session_id: Uuid,
    seat: Seat,
    gate: &StrokeGate,
    inbound: &DrawInbound,
) -> Result<(), DrawError> {
    gate.check(seat)?;
    if let Some(message) = inbound.to_outbound() {
        state.drawing_rooms().publish(
            session_id,
            RoomFrame {
                origin: Some(seat),
                message,
            },
        );
    }
    Ok(())
}

/// Forward room frames to this socket, skipping the ones it produced itself.
fn spawn_room_relay(
    mut room_rx: broadcast::Receiver<RoomFrame>,
    seat: Seat,
    outbound_tx: mpsc::UnboundedSender<Message>,
    gate: Arc<StrokeGate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match room_rx.recv().await {
                Ok(frame) if frame.origin == Some(seat) => continue,
                Ok(frame) => {
                    gate.observe(&frame.message);
                    if send_message_to_websocket(&outbound_tx, &frame.message).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "drawing relay lagged; strokes dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Serialize a payload and push it onto the provided WebSocket sender.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), DrawError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| DrawError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::memory::MemorySessionStore,
        dto::{
            round::{ReadyRequest, SubmitRequest},
            session::JoinRequest,
        },
        services::{round_service, session_service},
        state::{AppState, game::Answer},
    };

    async fn session() -> (SharedState, Uuid) {
        let state =
            AppState::with_store(AppConfig::default(), Arc::new(MemorySessionStore::new())).await;
        let joined = session_service::join(
            &state,
            JoinRequest {
                participant: "Guille".into(),
                code: None,
            },
        )
        .await
        .unwrap();
        (state, joined.session.id)
    }

    async fn submit_round(state: &SharedState, session_id: Uuid, round: u8) {
        for seat in Seat::BOTH {
            let participant = state.config().participant_name(seat).to_owned();
            let answer = match drawful_role(seat, round) {
                DrawRole::Drawer => Answer::Drawing { snapshot: None },
                DrawRole::Guesser => Answer::Guess {
                    text: Some("a boat".into()),
                },
            };
            round_service::submit(
                state,
                session_id,
                GameKind::Drawful,
                round,
                SubmitRequest {
                    participant,
                    answer,
                },
            )
            .await
            .unwrap();
        }
    }

    async fn ready_round(state: &SharedState, session_id: Uuid, round: u8) {
        for seat in Seat::BOTH {
            let participant = state.config().participant_name(seat).to_owned();
            round_service::ready(
                state,
                session_id,
                GameKind::Drawful,
                round,
                ReadyRequest { participant },
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn strokes_from_the_guesser_are_rejected() {
        let (state, session_id) = session().await;
        let mut room = state.drawing_rooms().subscribe(session_id);
        let gate = StrokeGate::new(1, [], false);
        let stroke = DrawInbound::Draw { x: 1.0, y: 2.0 };

        let err = relay_stroke(&state, session_id, Seat::Second, &gate, &stroke).unwrap_err();
        assert!(matches!(err, DrawError::NotDrawer { round: 1 }));

        relay_stroke(&state, session_id, Seat::First, &gate, &stroke).unwrap();
        let frame = room.recv().await.unwrap();
        assert_eq!(frame.origin, Some(Seat::First));
        assert!(matches!(frame.message, DrawOutbound::Draw { x, y } if x == 1.0 && y == 2.0));

        let second_round = StrokeGate::new(2, [], false);
        relay_stroke(&state, session_id, Seat::Second, &second_round, &DrawInbound::Clear)
            .unwrap();
    }

    #[test]
    fn gate_follows_room_frames() {
        let gate = StrokeGate::new(1, [Seat::First], false);
        gate.observe(&DrawOutbound::Submitted {
            seat: Seat::Second,
            round: 1,
            timed_out: false,
        });
        assert!(matches!(
            gate.check(Seat::First),
            Err(DrawError::RoundClosed { round: 1 })
        ));

        gate.observe(&DrawOutbound::Round {
            round: 2,
            drawer: Seat::Second,
            timer_secs: None,
        });
        assert!(gate.check(Seat::Second).is_ok());

        // A late frame for an earlier round changes nothing.
        gate.observe(&DrawOutbound::Round {
            round: 1,
            drawer: Seat::First,
            timer_secs: None,
        });
        assert_eq!(gate.round(), 2);
        assert!(gate.check(Seat::Second).is_ok());

        let finished = StrokeGate::new(6, [], true);
        assert!(matches!(
            finished.check(Seat::Second),
            Err(DrawError::RoundClosed { round: 6 })
        ));
    }

    #[tokio::test]
    async fn round_changes_after_joining_the_room_reach_the_socket() {
        let (state, session_id) = session().await;
        let (room_rx, welcome, gate) = open_room(&state, session_id, Seat::Second).await.unwrap();
        assert!(matches!(
            welcome,
            DrawOutbound::Welcome { round: 1, role: DrawRole::Guesser, .. }
        ));

        // The round closes and advances before the relay task starts reading.
        submit_round(&state, session_id, 1).await;
        ready_round(&state, session_id, 1).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = spawn_room_relay(room_rx, Seat::Second, tx, gate.clone());
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }

        assert_eq!(gate.round(), 2);
        let stroke = DrawInbound::Start { x: 0.0, y: 0.0 };
        relay_stroke(&state, session_id, Seat::Second, &gate, &stroke).unwrap();
        assert!(matches!(
            relay_stroke(&state, session_id, Seat::First, &gate, &stroke),
            Err(DrawError::NotDrawer { round: 2 })
        ));

        relay.abort();
    }

    #[tokio::test]
    async fn strokes_stop_once_both_answers_are_in() {
        let (state, session_id) = session().await;
        let (room_rx, _, gate) = open_room(&state, session_id, Seat::First).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = spawn_room_relay(room_rx, Seat::First, tx, gate.clone());

        submit_round(&state, session_id, 1).await;
        for _ in 0..2 {
            rx.recv().await.unwrap();
        }

        assert!(matches!(
            relay_stroke(&state, session_id, Seat::First, &gate, &DrawInbound::Stop),
            Err(DrawError::RoundClosed { round: 1 })
        ));

        // A socket opened afterwards starts closed as well.
        let (_late_rx, _, late) = open_room(&state, session_id, Seat::First).await.unwrap();
        assert!(matches!(
            late.check(Seat::First),
            Err(DrawError::RoundClosed { round: 1 })
        ));

        relay.abort();
    }

    #[tokio::test]
    async fn welcome_reveals_the_word_to_the_drawer_only() {
        let (state, session_id) = session().await;

        let (drawer, _) = welcome_message(&state, session_id, Seat::First).await.unwrap();
        assert!(matches!(
            drawer,
            DrawOutbound::Welcome {
                role: DrawRole::Drawer,
                prompt: Some(ref word),
                ..
            } if word == "Olivia"
        ));

        let (guesser, _) = welcome_message(&state, session_id, Seat::Second).await.unwrap();
        assert!(matches!(
            guesser,
            DrawOutbound::Welcome { role: DrawRole::Guesser, prompt: None, .. }
        ));
    }

    #[tokio::test]
    async fn identification_requires_a_known_participant() {
        let (state, session_id) = session().await;
        let seat = identify(&state, session_id, r#"{"type":"identify","participant":"delfina"}"#)
            .await
            .unwrap();
        assert_eq!(seat, Seat::Second);

        assert!(
            identify(&state, session_id, r#"{"type":"stop"}"#)
                .await
                .is_err()
        );
        assert!(matches!(
            identify(&state, Uuid::new_v4(), r#"{"type":"identify","participant":"Guille"}"#).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
