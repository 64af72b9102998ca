//! Performance benchmarks for routing, the game engine and the wire codec

use assert_approx_eq::assert_approx_eq;
use server::config::GameSettings;
use server::game::{Effect, Engine, Event, FakeClock};
use server::selection::{Selection, SelectionEvent, SelectionEvents, SelectionStage};
use shared::{
    GameRole, Message, MessageKind, Node, Package, Packet, Question, Round, SelectionMode, TableView, Theme, EVERYBODY,
    GAME_NAME,
};
use std::sync::Arc;
use std::time::Instant;

/// Plays the demo package with nobody answering and returns the number of events handled
fn play_unattended() -> usize {
    let mut engine = Engine::new(Package::demo(), GameSettings::default(), Arc::new(FakeClock::new()));
    for (role, name) in [(GameRole::Showman, "host"), (GameRole::Player, "alice")] {
        let connect = MessageKind::Connect.text().arg(role).arg(name).arg("m");
        engine.handle(Event::Message(Message::new(name, GAME_NAME, connect)));
    }

    let mut events = 1;
    let mut effects = engine.handle(Event::Start);
    while !engine.is_finished() {
        let generation = effects.iter().rev().find_map(|effect| match effect {
            Effect::ArmTimer { generation, .. } => Some(*generation),
            _ => None,
        });
        let Some(generation) = generation else {
            panic!("engine stalled in {}", engine.task());
        };
        effects = engine.handle(Event::Timeout { generation });
        events += 1;
    }
    events
}

/// Benchmarks local message routing through a node
#[tokio::test]
async fn benchmark_local_routing() {
    let (node, _events) = Node::primary(None);
    let sender = node.add_client("sender").await.unwrap();
    let mut receiver = node.add_client("receiver").await.unwrap();

    let iterations = 20_000;
    let start = Instant::now();

    for i in 0..iterations {
        sender.send("receiver", MessageKind::Replic.text().arg("p").arg(i)).await;
        let _ = receiver.recv().await;
    }

    let duration = start.elapsed();
    println!(
        "Local routing: {} messages in {:?} ({:.2} μs/msg)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a broadcast fan-out to many local clients
#[tokio::test]
async fn benchmark_broadcast_fanout() {
    let (node, _events) = Node::primary(None);
    let sender = node.add_client(GAME_NAME).await.unwrap();
    let mut receivers = Vec::new();
    for i in 0..50 {
        receivers.push(node.add_client(&format!("viewer{}", i)).await.unwrap());
    }

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        sender.send(EVERYBODY, MessageKind::Try.text()).await;
        for receiver in &mut receivers {
            let _ = receiver.recv().await;
        }
    }

    let duration = start.elapsed();
    println!("Broadcast to 50 clients: {} rounds in {:?}", iterations, duration);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks whole unattended games through the engine
#[test]
fn benchmark_engine_games() {
    let games = 50;
    let start = Instant::now();
    let mut events = 0;

    for _ in 0..games {
        events += play_unattended();
    }

    let duration = start.elapsed();
    println!(
        "Engine: {} games ({} events) in {:?} ({:.2} μs/event)",
        games,
        events,
        duration,
        duration.as_micros() as f64 / events as f64
    );

    // Every game takes the same path when nobody responds
    assert_eq!(events % games, 0);
    assert!(duration.as_millis() < 2000);
}

fn big_round() -> Round {
    let themes = (0..6)
        .map(|t| {
            let questions = (1..=5).map(|q| Question::new(q * 100, format!("Q{}", q), &["a"])).collect();
            Theme::new(format!("Theme {}", t), questions)
        })
        .collect();
    Round::new("Big", themes)
}

/// Benchmarks clearing whole rounds through the selection strategies
#[test]
fn benchmark_selection_strategies() {
    let round = big_round();
    let iterations = 2_000;
    let start = Instant::now();

    for mode in [SelectionMode::ByPlayer, SelectionMode::Sequential] {
        for _ in 0..iterations {
            let mut selection = Selection::for_round(&round, mode);
            let mut host = SelectionEvents::default();
            loop {
                if selection.stage() == SelectionStage::WaitSelection && !selection.can_move_next() {
                    let Some((theme, question)) = selection.default_choice() else {
                        break;
                    };
                    selection.select(theme, question, &mut host).unwrap();
                } else if !selection.move_next(&round, &mut host) {
                    break;
                }
            }

            let selected = host
                .0
                .iter()
                .filter(|e| matches!(e, SelectionEvent::QuestionSelected(..)))
                .count();
            assert_eq!(selected, 30);
            assert_eq!(host.0.last(), Some(&SelectionEvent::RoundEmpty));
        }
    }

    let duration = start.elapsed();
    println!("Selection: {} rounds per mode in {:?}", iterations, duration);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks packet encoding and decoding
#[test]
fn benchmark_packet_codec() {
    let packet = Packet::Data(Message::new(
        GAME_NAME,
        EVERYBODY,
        MessageKind::Content.text().arg(1).arg("text").arg("Which river flows through Cairo?"),
    ));

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = packet.encode().unwrap();
        let _ = Packet::decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks folding protocol traffic into a table view
#[test]
fn benchmark_table_view_updates() {
    let messages: Vec<Message> = vec![
        Message::new(GAME_NAME, EVERYBODY, MessageKind::RoundThemes.text().arg("plain").args(["A", "B", "C"])),
        Message::new(GAME_NAME, EVERYBODY, MessageKind::Table.text().args(["100,200,300", "100,200,300", "100,200,300"])),
        Message::new(GAME_NAME, EVERYBODY, MessageKind::Sums.text().args([100, -200, 300])),
        Message::new(GAME_NAME, "alice", MessageKind::Choose.text().arg(50)),
        Message::new(GAME_NAME, EVERYBODY, MessageKind::Choice.text().arg(1).arg(2)),
    ];

    let iterations = 20_000;
    let mut view = TableView::new("alice");
    let start = Instant::now();

    for _ in 0..iterations {
        for message in &messages {
            view.apply(message);
        }
    }

    let duration = start.elapsed();
    println!("Table view: {} passes in {:?}", iterations, duration);

    assert_eq!(view.current_price, 300);
    assert_approx_eq!(view.elapsed_percent, 50.0_f32);
    assert!(duration.as_millis() < 1000);
}
