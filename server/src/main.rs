use clap::Parser;
use log::{error, info, warn};
use server::computer::{spawn_computer, SimpleHeuristic};
use server::config::ServerArgs;
use server::game::{Engine, Game, GameListener, GameSnapshot, LogReportSink, ReportSink, SystemClock};
use server::network::Server;
use shared::{ActorHandle, GameRole, Node, NodeEvent, Package, Sex, GAME_NAME};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Logs every stage change of the game
struct StageLogger;

impl GameListener for StageLogger {
    fn on_snapshot(&self, snapshot: &GameSnapshot) {
        info!("Game stage {:?}: {}", snapshot.stage, snapshot.to_json());
    }
}

/// Main-method of the server.
/// Builds the primary node, seats the game and computer persons, then serves TCP until the game ends.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = ServerArgs::parse();
    let package = match &args.package {
        Some(path) => Package::from_json(&std::fs::read_to_string(path)?)?,
        None => Package::demo(),
    };
    info!("Package {:?} loaded with {} rounds", package.name, package.rounds.len());

    let mut settings = args.settings();
    if args.computer_showman && args.bots >= settings.players {
        // nobody is left to type "start"
        settings.auto_start = true;
    }

    let (node, events) = Node::primary(args.password.clone());
    tokio::spawn(log_node_events(events));

    let game_client = node.add_client(GAME_NAME).await?;
    let knowledge = Arc::new(package.clone());
    let engine = Engine::new(package, settings, Arc::new(SystemClock));
    let sink: Arc<Mutex<dyn ReportSink>> = Arc::new(Mutex::new(LogReportSink));
    let listeners: Vec<Arc<dyn GameListener>> = vec![Arc::new(StageLogger)];
    let game = Game::spawn(game_client, engine, listeners, sink);

    let mut computers: Vec<ActorHandle> = Vec::new();
    if args.computer_showman {
        let heuristic = SimpleHeuristic::new(rand::random(), 1.0).with_knowledge(Arc::clone(&knowledge));
        computers.push(spawn_computer(&node, "Host", GameRole::Showman, Sex::Male, Box::new(heuristic)).await?);
    }
    for index in 0..args.bots {
        let name = format!("Bot {}", index + 1);
        let sex = if index % 2 == 0 { Sex::Male } else { Sex::Female };
        let heuristic = SimpleHeuristic::new(rand::random(), 0.6).with_knowledge(Arc::clone(&knowledge));
        computers.push(spawn_computer(&node, &name, GameRole::Player, sex, Box::new(heuristic)).await?);
    }

    let server = Server::bind(&args.address(), Arc::clone(&node)).await?;
    let server_handle = tokio::spawn(server.run());

    tokio::select! {
        _ = game.join() => {
            info!("Game over, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    server_handle.abort();
    for computer in computers {
        computer.dispose().await;
    }
    Ok(())
}

/// Writes node diagnostics to the log
async fn log_node_events(mut events: mpsc::UnboundedReceiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Error { error, is_warning: true } => warn!("{}", error),
            NodeEvent::Error { error, is_warning: false } => error!("{}", error),
            NodeEvent::SerializationError { payload, error } => {
                warn!("Dropped {} byte frame: {}", payload.len(), error)
            }
            NodeEvent::Joined { name, role } => info!("{} joined as {}", name, role),
            NodeEvent::Left { name } => info!("{} left", name),
        }
    }
}
