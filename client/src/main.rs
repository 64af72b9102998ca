use clap::Parser;
use client::commands::{parse_command, HELP};
use client::human::{ConsolePresenter, HumanLogic};
use client::network::connect;
use log::{info, warn};
use shared::{Actor, GameRole, JoinRequest, NodeEvent, Sex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name shown to the other persons
    #[arg(short = 'n', long)]
    name: String,

    /// showman, player or viewer
    #[arg(short = 'r', long, default_value = "player")]
    role: String,

    /// m or f
    #[arg(long, default_value = "m")]
    sex: String,

    /// Game password, if the server requires one
    #[arg(short = 'p', long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let role: GameRole = args
        .role
        .parse()
        .map_err(|_| format!("unknown role {:?}", args.role))?;
    let sex: Sex = args.sex.parse().map_err(|_| format!("unknown sex {:?}", args.sex))?;

    let mut request = JoinRequest::new(args.name.as_str(), role, sex);
    if let Some(password) = &args.password {
        request = request.with_password(password.as_str());
    }

    let session = connect(&args.server, request).await?;
    tokio::spawn(log_node_events(session.events));
    let actor = Actor::spawn(session.client, HumanLogic::new(&args.name, Box::new(ConsolePresenter)));
    println!("Joined as {} {:?}. Type \"help\" for commands.", role, args.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut liveness = interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "quit" => break,
                    "help" => println!("{}", HELP),
                    _ => match parse_command(&line) {
                        Ok(Some(outgoing)) => actor.send(&outgoing.receiver, outgoing.text).await,
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    },
                }
            }
            _ = liveness.tick() => {
                if actor.is_finished() {
                    info!("Session ended by the server");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, leaving the game...");
                break;
            }
        }
    }

    actor.dispose().await;
    // give the writer a moment to flush the leave notice
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

async fn log_node_events(mut events: mpsc::UnboundedReceiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::Error { error, .. } => warn!("{}", error),
            NodeEvent::SerializationError { payload, error } => {
                warn!("Dropped {} byte frame: {}", payload.len(), error)
            }
            other => info!("{:?}", other),
        }
    }
}
