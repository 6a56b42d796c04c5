use std::{sync::Arc, time::Duration};

use pair_play_back::{
    config::AppConfig,
    dao::session_store::{SessionStore, memory::MemorySessionStore},
    dto::{
        round::{ReadyRequest, SubmitRequest, WaitTarget},
        session::JoinRequest,
    },
    error::ServiceError,
    services::{round_service, session_service},
    state::{
        AppState, SharedState,
        game::{Answer, DrawRole, GameKind, Seat, drawful_role},
    },
};
use uuid::Uuid;

const FIRST: &str = "Guille";
const SECOND: &str = "Delfina";

async fn paired_session() -> (SharedState, Arc<MemorySessionStore>, Uuid) {
    let store = Arc::new(MemorySessionStore::new());
    let state = AppState::with_store(AppConfig::default(), store.clone()).await;

    let first = session_service::join(
        &state,
        JoinRequest {
            participant: FIRST.into(),
            code: None,
        },
    )
    .await
    .unwrap();
    let second = session_service::join(
        &state,
        JoinRequest {
            participant: SECOND.into(),
            code: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(first.session.id, second.session.id);
    assert!(second.session.both_connected);
    (state, store, first.session.id)
}

fn answer_for(game: GameKind, seat: Seat, round: u8) -> Answer {
    match game {
        GameKind::Top10 => Answer::List {
            items: (1..=10).map(|n| format!("{} #{n}", seat.as_str())).collect(),
        },
        GameKind::PredictFuture => Answer::Text {
            text: format!("{} predicts round {round}", seat.as_str()),
        },
        GameKind::Drawful => match drawful_role(seat, round) {
            DrawRole::Drawer => Answer::Drawing {
                snapshot: Some("data:image/png;base64,iVBORw0KGgo=".into()),
            },
            DrawRole::Guesser => Answer::Guess {
                text: Some("a cat".into()),
            },
        },
        GameKind::WouldYouDo => Answer::Choice {
            yes: seat == Seat::First,
        },
    }
}

fn submit_as(participant: &str, seat: Seat, game: GameKind, round: u8) -> SubmitRequest {
    SubmitRequest {
        participant: participant.into(),
        answer: answer_for(game, seat, round),
    }
}

fn ready_as(participant: &str) -> ReadyRequest {
    ReadyRequest {
        participant: participant.into(),
    }
}

async fn play_game(state: &SharedState, store: &MemorySessionStore, id: Uuid, game: GameKind) {
    for round in 1..=game.max_rounds() {
        let view = round_service::get_round(state, id, game, FIRST).await.unwrap();
        assert_eq!(view.round, round);

        let first = submit_as(FIRST, Seat::First, game, round);
        let first = round_service::submit(state, id, game, round, first).await.unwrap();
        assert!(!first.duplicate);

        let repeat = submit_as(FIRST, Seat::First, game, round);
        let repeat = round_service::submit(state, id, game, round, repeat).await.unwrap();
        assert!(repeat.duplicate);

        let second = submit_as(SECOND, Seat::Second, game, round);
        round_service::submit(state, id, game, round, second).await.unwrap();

        let results = round_service::get_results(state, id, game, round).await.unwrap();
        assert_eq!(results.responses.len(), 2);

        round_service::ready(state, id, game, round, ready_as(SECOND))
            .await
            .unwrap();
        let closed = round_service::ready(state, id, game, round, ready_as(FIRST))
            .await
            .unwrap();

        if round < game.max_rounds() {
            assert!(closed.advanced);
            assert_eq!(closed.round.round, round + 1);
        } else {
            assert!(closed.completed);
        }

        let progress = store.find_progress(id, game).await.unwrap().unwrap();
        assert!(progress.current_round <= game.max_rounds());
    }
}

#[tokio::test]
async fn two_players_complete_every_game_and_unlock_the_reward() {
    let (state, store, id) = paired_session().await;

    for (index, game) in GameKind::ALL.into_iter().enumerate() {
        play_game(&state, &store, id, game).await;

        let overview = session_service::get_overview(&state, id).await.unwrap();
        let last = index + 1 == GameKind::ALL.len();
        assert_eq!(overview.all_completed, last);
        assert_eq!(overview.reward.is_some(), last);
    }

    let expected: usize = GameKind::ALL
        .iter()
        .map(|game| usize::from(game.max_rounds()) * 2)
        .sum();
    assert_eq!(store.response_count().await, expected);

    let overview = session_service::get_overview(&state, id).await.unwrap();
    assert!(overview.games.iter().all(|game| game.completed));
    let reward = overview.reward.unwrap();
    assert_eq!(reward.title, "Nuestra playlist");
    assert!(reward.url.starts_with("https://"));

    assert!(matches!(
        round_service::submit(
            &state,
            id,
            GameKind::Top10,
            3,
            submit_as(FIRST, Seat::First, GameKind::Top10, 3),
        )
        .await,
        Err(ServiceError::InvalidState(_))
    ));
}

#[tokio::test]
async fn empty_fields_are_rejected_without_writes() {
    let (state, store, id) = paired_session().await;

    let blank = [
        (GameKind::PredictFuture, Answer::Text { text: " ".into() }),
        (
            GameKind::Top10,
            Answer::List {
                items: vec![String::new(); 10],
            },
        ),
        (GameKind::Drawful, Answer::Guess { text: Some(String::new()) }),
    ];
    for (game, answer) in blank {
        let participant = if game == GameKind::Drawful { SECOND } else { FIRST };
        let result = round_service::submit(
            &state,
            id,
            game,
            1,
            SubmitRequest {
                participant: participant.into(),
                answer,
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))), "{game}");
    }

    assert_eq!(store.response_count().await, 0);
}

#[tokio::test]
async fn both_ready_wait_resolves_on_the_second_acknowledgement() {
    let (state, _, id) = paired_session().await;
    let game = GameKind::WouldYouDo;

    for (name, seat) in [(FIRST, Seat::First), (SECOND, Seat::Second)] {
        round_service::submit(&state, id, game, 1, submit_as(name, seat, game, 1))
            .await
            .unwrap();
    }
    round_service::ready(&state, id, game, 1, ready_as(FIRST)).await.unwrap();

    let waiter = {
        let state = state.clone();
        tokio::spawn(async move {
            round_service::wait_round(&state, id, game, 1, WaitTarget::BothReady, Some(5)).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let started = tokio::time::Instant::now();
    round_service::ready(&state, id, game, 1, ready_as(SECOND)).await.unwrap();

    let outcome = waiter.await.unwrap().unwrap();
    assert!(outcome.reached);
    assert!(outcome.ready.both());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let (state, _, _) = paired_session().await;
    assert!(matches!(
        round_service::get_round(&state, Uuid::new_v4(), GameKind::Top10, FIRST).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        session_service::get_overview(&state, Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    ));
}
