//! Lobby view of a running game

use super::data::{PersonAccount, Stage};
use super::engine::Engine;
use crate::config::GameSettings;
use serde::Serialize;
use shared::GameRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSnapshot {
    pub name: String,
    pub role: GameRole,
    pub connected: bool,
    pub is_human: bool,
    pub sum: i32,
}

impl PersonSnapshot {
    fn of(account: &PersonAccount, role: GameRole) -> Self {
        Self {
            name: account.name.clone(),
            role,
            connected: account.connected,
            is_human: account.is_human,
            sum: account.sum,
        }
    }
}

/// Timing rules in whole seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulesSnapshot {
    pub players: usize,
    pub choose_time: u64,
    pub button_time: u64,
    pub answer_time: u64,
    pub validate_time: u64,
    pub stake_time: u64,
    pub round_time: u64,
    pub auto_start: bool,
}

impl From<&GameSettings> for RulesSnapshot {
    fn from(settings: &GameSettings) -> Self {
        Self {
            players: settings.players,
            choose_time: settings.choose_time.as_secs(),
            button_time: settings.button_time.as_secs(),
            answer_time: settings.answer_time.as_secs(),
            validate_time: settings.validate_time.as_secs(),
            stake_time: settings.stake_time.as_secs(),
            round_time: settings.round_time.as_secs(),
            auto_start: settings.auto_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameSnapshot {
    pub stage: Stage,
    pub task: String,
    pub package: String,
    pub round: Option<String>,
    /// Showman first, then players in seat order, then viewers
    pub persons: Vec<PersonSnapshot>,
    pub rules: RulesSnapshot,
}

impl GameSnapshot {
    pub fn of(engine: &Engine) -> Self {
        let data = engine.data();
        let mut persons = Vec::with_capacity(1 + data.players.len() + data.viewers.len());
        persons.push(PersonSnapshot::of(&data.showman, GameRole::Showman));
        persons.extend(data.players.iter().map(|p| PersonSnapshot::of(p, GameRole::Player)));
        persons.extend(data.viewers.iter().map(|v| PersonSnapshot::of(v, GameRole::Viewer)));

        Self {
            stage: data.stage,
            task: engine.task().to_string(),
            package: engine.package().name.clone(),
            round: engine.round().map(|r| r.name.clone()),
            persons,
            rules: engine.settings().into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Receives a snapshot every time the game stage changes
pub trait GameListener: Send + Sync {
    fn on_snapshot(&self, snapshot: &GameSnapshot);
}
