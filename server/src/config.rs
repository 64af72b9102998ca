//! Server configuration: command line arguments and game timing

use clap::Parser;
use std::time::Duration;

/// Timing and seating rules of one game
///
/// Every wait the engine performs is bounded by one of these durations; when
/// it elapses the engine substitutes the default outcome for the missing
/// response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Number of player seats
    pub players: usize,
    /// Chooser picks a cell, showman picks a player, a finalist deletes a theme
    pub choose_time: Duration,
    /// Players race for the button
    pub button_time: Duration,
    pub answer_time: Duration,
    /// Showman judges an answer
    pub validate_time: Duration,
    /// Auction and final stakes
    pub stake_time: Duration,
    /// A round ends at the next selection point once this much time passed
    pub round_time: Duration,
    /// Start as soon as every seat is taken
    pub auto_start: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            players: 3,
            choose_time: Duration::from_secs(30),
            button_time: Duration::from_secs(5),
            answer_time: Duration::from_secs(20),
            validate_time: Duration::from_secs(30),
            stake_time: Duration::from_secs(20),
            round_time: Duration::from_secs(600),
            auto_start: false,
        }
    }
}

/// Command line of the server binary
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Authoritative trivia game server")]
pub struct ServerArgs {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// Question package (JSON); the built-in demo package is used when omitted
    #[clap(long)]
    pub package: Option<String>,
    /// Password required to join
    #[clap(long)]
    pub password: Option<String>,
    /// Number of player seats
    #[clap(long, default_value = "3")]
    pub players: usize,
    /// Number of seats taken by computer players
    #[clap(long, default_value = "0")]
    pub bots: usize,
    /// Seat a computer showman
    #[clap(long)]
    pub computer_showman: bool,
    /// Seconds to choose a question or a player
    #[clap(long, default_value = "30")]
    pub choose_time: u64,
    /// Seconds the button stays open
    #[clap(long, default_value = "5")]
    pub button_time: u64,
    /// Seconds to answer
    #[clap(long, default_value = "20")]
    pub answer_time: u64,
    /// Seconds for the showman to validate an answer
    #[clap(long, default_value = "30")]
    pub validate_time: u64,
    /// Seconds to make a stake
    #[clap(long, default_value = "20")]
    pub stake_time: u64,
    /// Round time limit in seconds
    #[clap(long, default_value = "600")]
    pub round_time: u64,
    /// Start the game once every seat is taken
    #[clap(long)]
    pub auto_start: bool,
}

impl ServerArgs {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn settings(&self) -> GameSettings {
        GameSettings {
            players: self.players.max(1),
            choose_time: Duration::from_secs(self.choose_time),
            button_time: Duration::from_secs(self.button_time),
            answer_time: Duration::from_secs(self.answer_time),
            validate_time: Duration::from_secs(self.validate_time),
            stake_time: Duration::from_secs(self.stake_time),
            round_time: Duration::from_secs(self.round_time),
            auto_start: self.auto_start,
        }
    }
}
