//! Game pseudo-client "@"
//!
//! [`Game`] is the async driver around the synchronous [`Engine`]: it feeds
//! inbox messages, commands and timer expiries into the engine one at a time
//! under the engine mutex, then applies the returned effects in order. It
//! owns the single game timer.

pub mod clock;
pub mod data;
pub mod engine;
pub mod report;
pub mod snapshot;
pub mod task;

pub use clock::{Clock, FakeClock, SystemClock};
pub use data::{GameData, Stage};
pub use engine::{Engine, EngineError};
pub use report::{GameReport, LogReportSink, MemoryReportSink, ReportSink};
pub use snapshot::{GameListener, GameSnapshot};
pub use task::{Effect, Event, Task};

use log::{debug, info, warn};
use shared::{Client, Node, NodeError};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Commands from the hosting process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameCommand {
    Start,
    /// Abandon the current wait as if nobody responded
    Cancel,
}

pub struct Game {
    client: Client,
    engine: Arc<Mutex<Engine>>,
    commands: mpsc::UnboundedReceiver<GameCommand>,
    commands_open: bool,
    listeners: Vec<Arc<dyn GameListener>>,
    sink: Arc<Mutex<dyn ReportSink>>,
    /// Generation and expiry of the live timer
    deadline: Option<(u64, Instant)>,
    last_stage: Stage,
}

impl Game {
    /// Binds the engine to the "@" client and starts the driver task
    pub fn spawn(
        client: Client,
        engine: Engine,
        listeners: Vec<Arc<dyn GameListener>>,
        sink: Arc<Mutex<dyn ReportSink>>,
    ) -> GameHandle {
        let node = Arc::clone(client.node());
        let last_stage = engine.stage();
        let engine = Arc::new(Mutex::new(engine));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let game = Game {
            client,
            engine: Arc::clone(&engine),
            commands: command_rx,
            commands_open: true,
            listeners,
            sink,
            deadline: None,
            last_stage,
        };
        let task = tokio::spawn(game.run());

        GameHandle {
            engine,
            commands: command_tx,
            node,
            task,
        }
    }

    async fn run(mut self) {
        info!("Game driver started as {:?}", self.client.name());

        loop {
            let deadline = self.deadline;
            let expiry = deadline.map_or_else(Instant::now, |(_, at)| at);

            let event = tokio::select! {
                message = self.client.recv() => match message {
                    Some(message) => Event::Message(message),
                    None => {
                        warn!("Game inbox closed");
                        break;
                    }
                },
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(GameCommand::Start) => Event::Start,
                    Some(GameCommand::Cancel) => Event::Cancelled,
                    None => {
                        self.commands_open = false;
                        continue;
                    }
                },
                _ = tokio::time::sleep_until(expiry), if deadline.is_some() => {
                    let generation = deadline.map_or(0, |(generation, _)| generation);
                    self.deadline = None;
                    Event::Timeout { generation }
                }
            };

            if self.dispatch(event).await {
                break;
            }
        }

        let report = GameReport::of(&*self.engine.lock().await);
        report::send_report(&self.sink, &report, report::REPORT_TIMEOUT).await;
        info!("Game driver stopped");
    }

    /// Runs one event through the engine; true once the game is over
    ///
    /// Listeners get a snapshot of the resulting state whenever the stage
    /// differs from the one seen after the previous event.
    async fn dispatch(&mut self, event: Event) -> bool {
        let mut engine = self.engine.lock().await;
        let effects = engine.handle(event);
        let node = Arc::clone(self.client.node());
        let mut finished = false;

        for effect in effects {
            match effect {
                Effect::Send(message) => self.client.send_message(&message).await,
                Effect::ArmTimer { generation, after } => {
                    self.deadline = Some((generation, Instant::now() + after));
                }
                Effect::DisarmTimer => self.deadline = None,
                Effect::Kick { name, ban } => match node.kick(&name, ban).await {
                    Ok(Some(identity)) => info!("{:?} banned by identity {}", name, identity),
                    Ok(None) => {}
                    Err(e) => node.report_error(e, true),
                },
                Effect::Unban { identity } => {
                    if !node.unban(&identity).await {
                        debug!("{} was not banned", identity);
                    }
                }
                Effect::Fault(error) => node.report_error(NodeError::Game(error.to_string()), false),
                Effect::Finished => finished = true,
            }
        }

        if engine.stage() != self.last_stage {
            self.last_stage = engine.stage();
            let snapshot = GameSnapshot::of(&engine);
            for listener in &self.listeners {
                listener.on_snapshot(&snapshot);
            }
        }

        finished
    }
}

/// Owner's side of a running game
pub struct GameHandle {
    engine: Arc<Mutex<Engine>>,
    commands: mpsc::UnboundedSender<GameCommand>,
    node: Arc<Node>,
    task: JoinHandle<()>,
}

impl GameHandle {
    pub fn start(&self) {
        self.command(GameCommand::Start);
    }

    pub fn cancel(&self) {
        self.command(GameCommand::Cancel);
    }

    fn command(&self, command: GameCommand) {
        if self.commands.send(command).is_err() {
            debug!("Game already stopped, {:?} dropped", command);
        }
    }

    pub async fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::of(&*self.engine.lock().await)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the driver; a panic in it is reported as a game fault
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            self.node
                .report_error(NodeError::Game(format!("game task failed: {}", e)), false);
        }
    }
}
