//! Per-round question selection strategies
//!
//! A strategy decides which (theme, question) cells are playable and in what
//! order they become the current question. Each round gets a fresh
//! [`Selection`] built from the round type and the package's selection mode:
//!
//! - [`SelectByPlayer`]: the chooser (or showman) picks any playable cell;
//!   selections can be undone and redone, cells can be removed or restored
//!   from outside.
//! - [`Sequential`]: cells are played in a fixed theme-major order with no
//!   way back.
//! - [`RemoveOtherThemes`]: final-round elimination; themes are deleted one
//!   by one until a single theme remains and its first question is played.
//!
//! Every strategy walks the same internal stages
//! `RoundThemes -> RoundTable -> WaitSelection` and reports what happened
//! through a [`SelectionHost`].

use shared::{Round, RoundType, SelectionMode, INVALID_PRICE};
use std::collections::BTreeSet;
use thiserror::Error;

/// A (theme index, question index) pair
pub type Cell = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStage {
    RoundThemes,
    RoundTable,
    WaitSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no selection is expected right now")]
    NotWaiting,
    #[error("cell ({0}, {1}) is not playable")]
    NotPlayable(usize, usize),
    #[error("this round does not accept external selections")]
    Unsupported,
}

/// Callbacks a strategy fires while it advances
pub trait SelectionHost {
    /// The round's themes were revealed
    fn on_round_themes(&mut self, themes: &[usize]);
    /// Somebody has to pick the next cell (or the next theme to delete)
    fn on_ask_selection(&mut self);
    fn on_question_selected(&mut self, theme: usize, question: usize);
    /// A selection was undone; the cell is playable again at `price`
    fn on_question_restored(&mut self, theme: usize, question: usize, price: i32);
    fn on_theme_deleted(&mut self, theme: usize);
    /// Nothing is left to play; fired at most once per round
    fn on_round_empty(&mut self);
}

/// Host that records callbacks for later processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    RoundThemes(Vec<usize>),
    AskSelection,
    QuestionSelected(usize, usize),
    QuestionRestored(usize, usize, i32),
    ThemeDeleted(usize),
    RoundEmpty,
}

#[derive(Debug, Default)]
pub struct SelectionEvents(pub Vec<SelectionEvent>);

impl SelectionHost for SelectionEvents {
    fn on_round_themes(&mut self, themes: &[usize]) {
        self.0.push(SelectionEvent::RoundThemes(themes.to_vec()));
    }

    fn on_ask_selection(&mut self) {
        self.0.push(SelectionEvent::AskSelection);
    }

    fn on_question_selected(&mut self, theme: usize, question: usize) {
        self.0.push(SelectionEvent::QuestionSelected(theme, question));
    }

    fn on_question_restored(&mut self, theme: usize, question: usize, price: i32) {
        self.0.push(SelectionEvent::QuestionRestored(theme, question, price));
    }

    fn on_theme_deleted(&mut self, theme: usize) {
        self.0.push(SelectionEvent::ThemeDeleted(theme));
    }

    fn on_round_empty(&mut self) {
        self.0.push(SelectionEvent::RoundEmpty);
    }
}

fn theme_indices(round: &Round) -> Vec<usize> {
    round
        .themes
        .iter()
        .enumerate()
        .filter(|(_, theme)| !theme.questions.is_empty())
        .map(|(index, _)| index)
        .collect()
}

fn valid_cells(round: &Round) -> impl Iterator<Item = Cell> + '_ {
    round.themes.iter().enumerate().flat_map(|(t, theme)| {
        theme
            .questions
            .iter()
            .enumerate()
            .filter(|(_, question)| question.is_valid())
            .map(move |(q, _)| (t, q))
    })
}

#[derive(Debug, Clone)]
pub struct SelectByPlayer {
    playable: BTreeSet<Cell>,
    history: Vec<Cell>,
    forward: Vec<Cell>,
    stage: SelectionStage,
    round_ended: bool,
}

impl SelectByPlayer {
    pub fn new(round: &Round) -> Self {
        Self {
            playable: valid_cells(round).collect(),
            history: Vec::new(),
            forward: Vec::new(),
            stage: SelectionStage::RoundThemes,
            round_ended: false,
        }
    }

    pub fn playable(&self) -> &BTreeSet<Cell> {
        &self.playable
    }

    pub fn history(&self) -> &[Cell] {
        &self.history
    }

    fn move_next(&mut self, round: &Round, host: &mut dyn SelectionHost) -> bool {
        match self.stage {
            SelectionStage::RoundThemes => {
                self.stage = SelectionStage::RoundTable;
                host.on_round_themes(&theme_indices(round));
                true
            }
            SelectionStage::RoundTable => {
                if self.playable.is_empty() {
                    self.end_round(host);
                    return false;
                }
                self.stage = SelectionStage::WaitSelection;
                host.on_ask_selection();
                true
            }
            SelectionStage::WaitSelection => match self.forward.pop() {
                Some(cell) if self.playable.contains(&cell) => {
                    // Redo keeps the remaining forward stack intact
                    let forward = std::mem::take(&mut self.forward);
                    self.take(cell, host);
                    self.forward = forward;
                    true
                }
                _ => false,
            },
        }
    }

    fn select(&mut self, theme: usize, question: usize, host: &mut dyn SelectionHost) -> Result<(), SelectionError> {
        if self.stage != SelectionStage::WaitSelection {
            return Err(SelectionError::NotWaiting);
        }
        if !self.playable.contains(&(theme, question)) {
            return Err(SelectionError::NotPlayable(theme, question));
        }

        self.forward.clear();
        self.take((theme, question), host);
        Ok(())
    }

    fn take(&mut self, cell: Cell, host: &mut dyn SelectionHost) {
        self.playable.remove(&cell);
        self.history.push(cell);
        self.stage = SelectionStage::RoundTable;
        host.on_question_selected(cell.0, cell.1);
    }

    fn can_move_back(&self, round: &Round) -> bool {
        self.history
            .last()
            .is_some_and(|&(t, q)| round.price(t, q) != INVALID_PRICE)
    }

    fn move_back(&mut self, round: &Round, host: &mut dyn SelectionHost) -> bool {
        if !self.can_move_back(round) {
            return false;
        }
        let Some((theme, question)) = self.history.pop() else {
            return false;
        };

        self.playable.insert((theme, question));
        self.forward.push((theme, question));
        self.stage = SelectionStage::WaitSelection;
        host.on_question_restored(theme, question, round.price(theme, question));
        true
    }

    /// Takes a cell out of play from outside the normal flow
    ///
    /// The cell is also forgotten by the undo/redo stacks, so back-navigation
    /// can never bring it back; only [`SelectByPlayer::restore_question`] can.
    fn remove_question(&mut self, theme: usize, question: usize, host: &mut dyn SelectionHost) -> bool {
        let cell = (theme, question);
        self.history.retain(|c| *c != cell);
        self.forward.retain(|c| *c != cell);

        if !self.playable.remove(&cell) {
            return false;
        }
        if self.playable.is_empty() {
            self.end_round(host);
        }
        true
    }

    fn restore_question(&mut self, round: &Round, theme: usize, question: usize) -> bool {
        if round.price(theme, question) == INVALID_PRICE || self.round_ended {
            return false;
        }
        self.playable.insert((theme, question))
    }

    fn end_round(&mut self, host: &mut dyn SelectionHost) {
        if !self.round_ended {
            self.round_ended = true;
            host.on_round_empty();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sequential {
    order: Vec<Cell>,
    position: usize,
    stage: SelectionStage,
    round_ended: bool,
}

impl Sequential {
    pub fn new(round: &Round) -> Self {
        Self {
            order: valid_cells(round).collect(),
            position: 0,
            stage: SelectionStage::RoundThemes,
            round_ended: false,
        }
    }

    fn remaining(&self, round: &Round) -> usize {
        self.order[self.position..]
            .iter()
            .filter(|&&(t, q)| round.price(t, q) != INVALID_PRICE)
            .count()
    }

    fn move_next(&mut self, round: &Round, host: &mut dyn SelectionHost) -> bool {
        match self.stage {
            SelectionStage::RoundThemes => {
                self.stage = SelectionStage::RoundTable;
                host.on_round_themes(&theme_indices(round));
                true
            }
            SelectionStage::RoundTable | SelectionStage::WaitSelection => {
                // Cells invalidated since the round started are skipped
                while let Some(&(t, q)) = self.order.get(self.position) {
                    self.position += 1;
                    if round.price(t, q) != INVALID_PRICE {
                        self.stage = SelectionStage::RoundTable;
                        host.on_question_selected(t, q);
                        return true;
                    }
                }

                if !self.round_ended {
                    self.round_ended = true;
                    host.on_round_empty();
                }
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoveOtherThemes {
    themes: BTreeSet<usize>,
    stage: SelectionStage,
    finished: bool,
}

impl RemoveOtherThemes {
    pub fn new(round: &Round) -> Self {
        Self {
            themes: round
                .themes
                .iter()
                .enumerate()
                .filter(|(_, theme)| !theme.name.trim().is_empty() && !theme.questions.is_empty())
                .map(|(index, _)| index)
                .collect(),
            stage: SelectionStage::RoundThemes,
            finished: false,
        }
    }

    pub fn remaining(&self) -> &BTreeSet<usize> {
        &self.themes
    }

    fn move_next(&mut self, host: &mut dyn SelectionHost) -> bool {
        match self.stage {
            SelectionStage::RoundThemes => {
                self.stage = SelectionStage::RoundTable;
                let themes: Vec<usize> = self.themes.iter().copied().collect();
                host.on_round_themes(&themes);
                true
            }
            SelectionStage::RoundTable => {
                if self.finished {
                    return false;
                }
                let mut remaining = self.themes.iter();
                match (remaining.next(), remaining.next()) {
                    (Some(&theme), None) => {
                        self.finished = true;
                        host.on_question_selected(theme, 0);
                        true
                    }
                    (Some(_), Some(_)) => {
                        self.stage = SelectionStage::WaitSelection;
                        host.on_ask_selection();
                        true
                    }
                    _ => {
                        self.finished = true;
                        host.on_round_empty();
                        false
                    }
                }
            }
            SelectionStage::WaitSelection => false,
        }
    }

    fn delete_theme(&mut self, theme: usize, host: &mut dyn SelectionHost) -> Result<(), SelectionError> {
        if self.stage != SelectionStage::WaitSelection {
            return Err(SelectionError::NotWaiting);
        }
        if !self.themes.remove(&theme) {
            return Err(SelectionError::NotPlayable(theme, 0));
        }

        self.stage = SelectionStage::RoundTable;
        host.on_theme_deleted(theme);
        Ok(())
    }
}

/// Strategy for one round
#[derive(Debug, Clone)]
pub enum Selection {
    ByPlayer(SelectByPlayer),
    Sequential(Sequential),
    RemoveOtherThemes(RemoveOtherThemes),
}

impl Selection {
    pub fn for_round(round: &Round, mode: SelectionMode) -> Self {
        match (round.kind, mode) {
            (RoundType::Final, _) => Selection::RemoveOtherThemes(RemoveOtherThemes::new(round)),
            (RoundType::Standard, SelectionMode::ByPlayer) => Selection::ByPlayer(SelectByPlayer::new(round)),
            (RoundType::Standard, SelectionMode::Sequential) => Selection::Sequential(Sequential::new(round)),
        }
    }

    /// Whether the round is worth starting at all
    pub fn should_play_round(&self, round: &Round, has_players: bool) -> bool {
        if !has_players {
            return false;
        }
        match self {
            Selection::ByPlayer(_) | Selection::Sequential(_) => round.has_valid_questions(),
            Selection::RemoveOtherThemes(s) => !s.themes.is_empty(),
        }
    }

    pub fn stage(&self) -> SelectionStage {
        match self {
            Selection::ByPlayer(s) => s.stage,
            Selection::Sequential(s) => s.stage,
            Selection::RemoveOtherThemes(s) => s.stage,
        }
    }

    pub fn can_move_next(&self) -> bool {
        match self {
            Selection::ByPlayer(s) => match s.stage {
                SelectionStage::RoundThemes | SelectionStage::RoundTable => true,
                SelectionStage::WaitSelection => !s.forward.is_empty(),
            },
            Selection::Sequential(s) => !s.round_ended,
            Selection::RemoveOtherThemes(s) => !s.finished && s.stage != SelectionStage::WaitSelection,
        }
    }

    pub fn move_next(&mut self, round: &Round, host: &mut dyn SelectionHost) -> bool {
        match self {
            Selection::ByPlayer(s) => s.move_next(round, host),
            Selection::Sequential(s) => s.move_next(round, host),
            Selection::RemoveOtherThemes(s) => s.move_next(host),
        }
    }

    pub fn can_move_back(&self, round: &Round) -> bool {
        match self {
            Selection::ByPlayer(s) => s.can_move_back(round),
            Selection::Sequential(_) | Selection::RemoveOtherThemes(_) => false,
        }
    }

    pub fn move_back(&mut self, round: &Round, host: &mut dyn SelectionHost) -> bool {
        match self {
            Selection::ByPlayer(s) => s.move_back(round, host),
            Selection::Sequential(_) | Selection::RemoveOtherThemes(_) => false,
        }
    }

    /// An external pick: a cell for free selection, a theme to delete in the final
    pub fn select(
        &mut self,
        theme: usize,
        question: usize,
        host: &mut dyn SelectionHost,
    ) -> Result<(), SelectionError> {
        match self {
            Selection::ByPlayer(s) => s.select(theme, question, host),
            Selection::Sequential(_) => Err(SelectionError::Unsupported),
            Selection::RemoveOtherThemes(s) => s.delete_theme(theme, host),
        }
    }

    pub fn remove_question(&mut self, theme: usize, question: usize, host: &mut dyn SelectionHost) -> bool {
        match self {
            Selection::ByPlayer(s) => s.remove_question(theme, question, host),
            Selection::Sequential(_) | Selection::RemoveOtherThemes(_) => false,
        }
    }

    pub fn restore_question(&mut self, round: &Round, theme: usize, question: usize) -> bool {
        match self {
            Selection::ByPlayer(s) => s.restore_question(round, theme, question),
            Selection::Sequential(_) | Selection::RemoveOtherThemes(_) => false,
        }
    }

    pub fn is_playable(&self, theme: usize, question: usize) -> bool {
        match self {
            Selection::ByPlayer(s) => s.playable.contains(&(theme, question)),
            Selection::Sequential(s) => s.order[s.position..].contains(&(theme, question)),
            Selection::RemoveOtherThemes(s) => !s.finished && s.themes.contains(&theme),
        }
    }

    /// Cells (or themes, in the final) still in play
    pub fn playable_count(&self, round: &Round) -> usize {
        match self {
            Selection::ByPlayer(s) => s.playable.len(),
            Selection::Sequential(s) => s.remaining(round),
            Selection::RemoveOtherThemes(s) if s.finished => 0,
            Selection::RemoveOtherThemes(s) => s.themes.len(),
        }
    }

    /// Deterministic fallback pick when nobody chose in time
    pub fn default_choice(&self) -> Option<Cell> {
        match self {
            Selection::ByPlayer(s) => s.playable.iter().next().copied(),
            Selection::Sequential(s) => s.order.get(s.position).copied(),
            Selection::RemoveOtherThemes(s) => s.themes.iter().next().map(|&t| (t, 0)),
        }
    }

    /// The single playable cell, when exactly one is left
    pub fn only_choice(&self) -> Option<Cell> {
        match self {
            Selection::ByPlayer(s) if s.playable.len() == 1 => s.playable.iter().next().copied(),
            _ => None,
        }
    }
}
