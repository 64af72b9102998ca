//! Session state owned by the engine
//!
//! Round-scoped fields are reset by [`GameData::reset_round`] and
//! question-scoped fields by [`GameData::reset_question`]. Person accounts
//! live for the whole session; a disconnected person keeps their seat and
//! score so they can reclaim it.

use serde::Serialize;
use shared::{GameRole, Sex, INVALID_PRICE};
use std::fmt::{self, Display};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Before,
    Begin,
    Round,
    Final,
    After,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Before => "Before",
            Stage::Begin => "Begin",
            Stage::Round => "Round",
            Stage::Final => "Final",
            Stage::After => "After",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One seat (showman, player) or one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonAccount {
    /// Empty for a seat nobody ever took
    pub name: String,
    pub sex: Sex,
    pub is_human: bool,
    pub connected: bool,
    pub sum: i32,
}

impl PersonAccount {
    pub fn free() -> Self {
        Self {
            name: String::new(),
            sex: Sex::Male,
            is_human: true,
            connected: false,
            sum: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.name.is_empty() && !self.connected
    }

    /// Whether `name` may sit here: a free seat or its own abandoned one
    pub fn accepts(&self, name: &str) -> bool {
        self.is_free() || (!self.connected && self.name == name)
    }

    pub fn seat(&mut self, name: &str, sex: Sex, is_human: bool) {
        self.name = name.to_string();
        self.sex = sex;
        self.is_human = is_human;
        self.connected = true;
    }
}

/// How the current question is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerMode {
    /// Players race for the button; a wrong answer reopens it
    #[default]
    Button,
    /// One designated player answers
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeKind {
    Nominal,
    Sum,
    Pass,
    AllIn,
}

impl StakeKind {
    pub fn code(&self) -> u8 {
        match self {
            StakeKind::Nominal => 0,
            StakeKind::Sum => 1,
            StakeKind::Pass => 2,
            StakeKind::AllIn => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StakeKind::Nominal),
            1 => Some(StakeKind::Sum),
            2 => Some(StakeKind::Pass),
            3 => Some(StakeKind::AllIn),
            _ => None,
        }
    }
}

/// Stake auction for a Stake question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auction {
    /// Participants in bidding order, starting with the opener
    pub order: Vec<usize>,
    pub passed: Vec<usize>,
    pub leader: Option<usize>,
    pub stake: i32,
    /// Position in `order` of the player asked last
    pub cursor: usize,
    pub current: Option<usize>,
}

impl Auction {
    pub fn new(order: Vec<usize>) -> Self {
        Self {
            order,
            passed: Vec::new(),
            leader: None,
            stake: 0,
            cursor: 0,
            current: None,
        }
    }

    pub fn opener(&self) -> Option<usize> {
        self.order.first().copied()
    }

    /// Players that have neither passed nor been outbid out of the auction
    pub fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().copied().filter(|p| !self.passed.contains(p))
    }

    pub fn is_over(&self) -> bool {
        self.leader.is_some() && self.active().count() <= 1
    }
}

/// A judged answer that may still be appealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub serial: u32,
    pub player: usize,
    pub answer: String,
    pub price: i32,
    pub right: bool,
}

#[derive(Debug)]
pub struct GameData {
    pub stage: Stage,
    pub round_index: Option<usize>,
    pub theme_index: Option<usize>,
    pub question_index: Option<usize>,
    /// Display prices per theme; played or removed cells show `INVALID_PRICE`
    pub table: Vec<Vec<i32>>,
    pub showman: PersonAccount,
    pub players: Vec<PersonAccount>,
    pub viewers: Vec<PersonAccount>,
    pub chooser: Option<usize>,
    pub answerer: Option<usize>,
    pub answer_mode: AnswerMode,
    pub current_price: i32,
    pub tried: Vec<usize>,
    pub answer: Option<String>,
    pub auction: Option<Auction>,
    pub finalists: Vec<usize>,
    /// Finalist whose turn it is to delete a theme, as a position in `finalists`
    pub deleter: usize,
    pub final_stakes: Vec<Option<i32>>,
    pub final_answers: Vec<Option<String>>,
    pub validation_queue: Vec<usize>,
    /// Incremented for every selected question
    pub question_serial: u32,
    pub outcomes: Vec<Outcome>,
    pub appellation: Option<Outcome>,
    pub round_started_at: Option<Instant>,
    pub log: Vec<String>,
}

impl GameData {
    pub fn new(player_seats: usize) -> Self {
        Self {
            stage: Stage::Before,
            round_index: None,
            theme_index: None,
            question_index: None,
            table: Vec::new(),
            showman: PersonAccount::free(),
            players: vec![PersonAccount::free(); player_seats],
            viewers: Vec::new(),
            chooser: None,
            answerer: None,
            answer_mode: AnswerMode::Button,
            current_price: 0,
            tried: Vec::new(),
            answer: None,
            auction: None,
            finalists: Vec::new(),
            deleter: 0,
            final_stakes: Vec::new(),
            final_answers: Vec::new(),
            validation_queue: Vec::new(),
            question_serial: 0,
            outcomes: Vec::new(),
            appellation: None,
            round_started_at: None,
            log: Vec::new(),
        }
    }

    pub fn sums(&self) -> Vec<i32> {
        self.players.iter().map(|p| p.sum).collect()
    }

    pub fn player_index(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    pub fn is_showman(&self, name: &str) -> bool {
        !self.showman.name.is_empty() && self.showman.name == name
    }

    pub fn player_name(&self, index: usize) -> Option<&str> {
        self.players.get(index).map(|p| p.name.as_str())
    }

    pub fn is_connected_player(&self, index: usize) -> bool {
        self.players.get(index).is_some_and(|p| p.connected)
    }

    pub fn connected_players(&self) -> Vec<usize> {
        (0..self.players.len())
            .filter(|i| self.players[*i].connected)
            .collect()
    }

    /// Role and seat index of a person, if they are in the game
    pub fn role_of(&self, name: &str) -> Option<(GameRole, usize)> {
        if self.is_showman(name) {
            return Some((GameRole::Showman, 0));
        }
        if let Some(index) = self.player_index(name) {
            return Some((GameRole::Player, index));
        }
        self.viewers
            .iter()
            .position(|v| v.name == name)
            .map(|index| (GameRole::Viewer, index))
    }

    /// True while the person holds a live seat of any role
    pub fn is_seated(&self, name: &str) -> bool {
        match self.role_of(name) {
            Some((GameRole::Showman, _)) => self.showman.connected,
            Some((GameRole::Player, index)) => self.players[index].connected,
            Some((GameRole::Viewer, _)) => true,
            None => false,
        }
    }

    pub fn seats_filled(&self) -> bool {
        self.showman.connected && self.players.iter().all(|p| p.connected)
    }

    /// Connected player with the lowest sum (first seat on ties)
    pub fn lowest_sum_player(&self) -> Option<usize> {
        self.connected_players()
            .into_iter()
            .min_by_key(|i| (self.players[*i].sum, *i))
    }

    /// Player with the highest sum (first seat on ties)
    pub fn winner(&self) -> Option<usize> {
        (0..self.players.len())
            .filter(|i| !self.players[*i].is_free())
            .max_by_key(|i| (self.players[*i].sum, std::cmp::Reverse(*i)))
    }

    pub fn append_log(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    pub fn reset_round(&mut self) {
        self.theme_index = None;
        self.question_index = None;
        self.table.clear();
        self.finalists.clear();
        self.deleter = 0;
        self.final_stakes.clear();
        self.final_answers.clear();
        self.round_started_at = None;
        self.reset_question();
    }

    pub fn reset_question(&mut self) {
        self.answerer = None;
        self.answer_mode = AnswerMode::Button;
        self.current_price = 0;
        self.tried.clear();
        self.answer = None;
        self.auction = None;
        self.validation_queue.clear();
    }

    /// Marks a cell as played in the display table
    pub fn mark_played(&mut self, theme: usize, question: usize) {
        if let Some(price) = self.table.get_mut(theme).and_then(|t| t.get_mut(question)) {
            *price = INVALID_PRICE;
        }
    }

    pub fn set_price(&mut self, theme: usize, question: usize, value: i32) {
        if let Some(price) = self.table.get_mut(theme).and_then(|t| t.get_mut(question)) {
            *price = value;
        }
    }

    /// Forgets outcomes older than the previous question
    pub fn prune_outcomes(&mut self) {
        let serial = self.question_serial;
        self.outcomes.retain(|o| o.serial + 1 >= serial);
        if self.appellation.as_ref().is_some_and(|o| o.serial + 1 < serial) {
            self.appellation = None;
        }
    }

    /// Latest wrong outcome of `player` that may still be appealed
    pub fn appealable(&self, player: usize) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.player == player && !o.right && o.serial + 1 >= self.question_serial)
    }
}
