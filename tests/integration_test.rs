use std::sync::Arc;
use std::time::Duration;

use wikiguess::clock::ManualClock;
use wikiguess::config::GameConfig;
use wikiguess::content::{ContentProvider, QuestionPool};
use wikiguess::identity::{IdentityProvider, StaticIdentity};
use wikiguess::progress::{evaluate_achievements, AchievementId, ProfileStats};
use wikiguess::room::{ClientPhase, MemoryRoomStore, RoomClient, RoomService, RoomStore};
use wikiguess::session::{GameSession, SessionEvent};
use wikiguess::types::{Difficulty, RoomSettings, RoomStatus, SessionPhase};

fn pool() -> Arc<dyn ContentProvider> {
    Arc::new(QuestionPool::builtin().expect("builtin pool should parse"))
}

fn single_player() -> (GameSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let session = GameSession::new(pool(), clock.clone(), GameConfig::default());
    (session, clock)
}

/// Easy game, every answer correct after one second
#[tokio::test(start_paused = true)]
async fn test_single_player_full_game() {
    let (session, clock) = single_player();
    session.start_game(Difficulty::Easy).await.unwrap();

    let mut points = Vec::new();
    for round in 1..=5 {
        let state = session.snapshot().await;
        assert_eq!(state.phase(), SessionPhase::Playing);
        let current = state.current().expect("round should be open");
        assert_eq!(current.round_number, round);
        assert_eq!(current.time_limit, 45);
        let answer = current.correct_answer.clone();

        clock.advance(1_000);
        let outcome = session.submit_guess(&answer).await.unwrap();
        assert!(outcome.is_correct);
        points.push(outcome.points_earned);

        let phase = session.next_round().await.unwrap();
        let expected = if round == 5 {
            SessionPhase::Finished
        } else {
            SessionPhase::Playing
        };
        assert_eq!(phase, expected);
    }

    // 149 base, then the streak multiplier grows by a quarter each answer
    assert_eq!(points, vec![149, 186, 224, 261, 298]);

    let state = session.snapshot().await;
    assert_eq!(state.score(), points.iter().sum::<u32>());
    assert_eq!(state.longest_streak(), 5);

    let stats = state.summary();
    assert_eq!(stats.correct_count, 5);
    assert_eq!(stats.fastest_answer_ms, Some(1_000));

    let profile = ProfileStats {
        games_played: 1,
        total_score: u64::from(state.score()),
        longest_streak: state.longest_streak(),
    };
    let earned = evaluate_achievements(&stats, &profile, &[AchievementId::FirstWin]);
    assert_eq!(
        earned,
        vec![
            AchievementId::PerfectGame,
            AchievementId::SpeedDemon,
            AchievementId::Streak5,
            AchievementId::Score1000,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_player_timeout_breaks_streak() {
    let (session, clock) = single_player();
    let mut events = session.subscribe();
    session.start_game(Difficulty::Medium).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::RoundStarted { round_number: 1, .. }
    ));

    let answer = session.snapshot().await.current().unwrap().correct_answer.clone();
    clock.advance(2_000);
    assert!(session.submit_guess(&answer).await.unwrap().is_correct);
    session.next_round().await.unwrap();
    assert_eq!(session.snapshot().await.streak(), 1);

    // Let round 2 run out
    clock.advance(30_000);
    let outcome = loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timer should end the round")
            .unwrap()
        {
            SessionEvent::RoundEnded(outcome) if outcome.timed_out => break outcome,
            _ => continue,
        }
    };
    assert!(outcome.timed_out);
    assert_eq!(outcome.round_number, 2);
    assert_eq!(outcome.points_earned, 0);

    let state = session.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::BetweenRounds);
    assert_eq!(state.streak(), 0);
    assert_eq!(state.longest_streak(), 1);

    // A guess after the timeout changes nothing
    assert!(session.submit_guess(&answer).await.is_none());
}

async fn wait_for(client: &RoomClient, phase: ClientPhase, round: u32) {
    for _ in 0..600 {
        let state = client.state().await;
        if state.phase == phase && state.current_round() == round {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{} never reached {:?} in round {}", client.user_id(), phase, round);
}

/// Two players, five rounds: both clients follow the host to the end and
/// agree on the final standings
#[tokio::test(start_paused = true)]
async fn test_multiplayer_room_to_finish() {
    let store = Arc::new(MemoryRoomStore::new());
    let service = Arc::new(RoomService::new(store.clone(), pool(), GameConfig::default()));

    let alice = StaticIdentity::signed_in("alice").current_user().await.unwrap();
    let bob = StaticIdentity::signed_in("bob").current_user().await.unwrap();

    let room = service
        .create_room(&alice.id, &alice.display_name(Some("Alice")), RoomSettings::default())
        .await
        .unwrap();
    service
        .join_room(&room.code, &bob.id, &bob.display_name(None))
        .await
        .unwrap();

    let host = RoomClient::connect(service.clone(), &room.code, &alice.id)
        .await
        .unwrap();
    let guest = RoomClient::connect(service.clone(), &room.code, &bob.id)
        .await
        .unwrap();
    guest.set_ready(true).await.unwrap();
    assert!(guest.start_game().await.is_err());

    host.start_game().await.unwrap();

    for round in 1..=5u32 {
        wait_for(&host, ClientPhase::Playing, round).await;
        wait_for(&guest, ClientPhase::Playing, round).await;

        let correct = store
            .question(&room.id, round)
            .await
            .unwrap()
            .unwrap()
            .correct_answer;
        let bob_result = guest.answer(&correct).await.unwrap().unwrap();
        assert!(bob_result.is_correct);
        assert!(bob_result.points > 200);

        let alice_result = host.answer("not the answer").await.unwrap().unwrap();
        assert!(!alice_result.is_correct);

        host.advance_round().await.unwrap();
    }

    wait_for(&guest, ClientPhase::Finished, 5).await;
    wait_for(&host, ClientPhase::Finished, 5).await;

    let final_room = service.room(&room.id).await.unwrap();
    assert_eq!(final_room.status, RoomStatus::Finished);
    assert_eq!(final_room.current_round, 5);

    guest.refresh().await.unwrap();
    host.refresh().await.unwrap();
    let host_view = host.state().await;
    let guest_view = guest.state().await;
    assert_eq!(host_view.room, guest_view.room);
    assert_eq!(host_view.players, guest_view.players);
    assert_eq!(guest_view.players[0].user_id, "bob");
    assert_eq!(guest_view.players[1].score, 0);

    // Late advance is harmless
    host.advance_round().await.unwrap();
    assert_eq!(service.room(&room.id).await.unwrap().version, final_room.version);
}
