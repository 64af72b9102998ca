//! Authoritative game flow
//!
//! The engine is a synchronous state machine: every [`Event`] runs
//! [`Engine::handle`], which advances through runnable tasks until it reaches
//! a wait (or the end) and returns the [`Effect`]s the driver must apply.
//! Nothing here touches the network or the real clock, so the whole flow can
//! be replayed in tests with a [`FakeClock`](super::clock::FakeClock).
//!
//! Timer discipline: each `Ask*` task arms exactly one timer and every exit
//! from a wait disarms it, so at most one timer is live per game. A timeout
//! carrying an old generation is stale and ignored.

use super::clock::Clock;
use super::data::{AnswerMode, Auction, GameData, Outcome, PersonAccount, Stage, StakeKind};
use super::task::{Effect, Event, Task};
use crate::config::GameSettings;
use crate::selection::{Selection, SelectionError, SelectionEvent, SelectionEvents};
use log::{debug, error, info, warn};
use shared::message::int_arg;
use shared::view::format_prices;
use shared::{
    GameRole, Message, MessageKind, Package, Question, QuestionType, Round, RoundType, Sex, EVERYBODY, GAME_NAME,
    INVALID_PRICE, SERVER_NAME,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Marker a computer actor appends to its Connect message
pub const BOT_MARKER: &str = "bot";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no round is being played")]
    NoActiveRound,
    #[error("no question is selected")]
    NoQuestion,
    #[error("question ({0}, {1}) does not exist")]
    MissingQuestion(usize, usize),
    #[error("nobody is answering")]
    NoAnswerer,
    #[error("no auction is running")]
    NoAuction,
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

pub struct Engine {
    settings: GameSettings,
    package: Package,
    clock: Arc<dyn Clock>,
    data: GameData,
    task: Task,
    round: Option<Round>,
    selection: Option<Selection>,
    generation: u64,
    timer_armed: bool,
    round_empty: bool,
    effects: Vec<Effect>,
}

impl Engine {
    pub fn new(package: Package, settings: GameSettings, clock: Arc<dyn Clock>) -> Self {
        let data = GameData::new(settings.players);
        Self {
            settings,
            package,
            clock,
            data,
            task: Task::Idle,
            round: None,
            selection: None,
            generation: 0,
            timer_armed: false,
            round_empty: false,
            effects: Vec::new(),
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn stage(&self) -> Stage {
        self.data.stage
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.task == Task::Finished
    }

    /// Runs one event to completion and returns what the driver must do
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start => self.start(),
            Event::Message(message) => self.on_message(&message),
            Event::Timeout { generation } => {
                if generation == self.generation && self.timer_armed && self.task.is_wait() {
                    self.data.append_log(format!("timeout in {}", self.task));
                    self.no_response();
                } else {
                    debug!("Stale timer {} ignored (current {})", generation, self.generation);
                }
            }
            Event::Cancelled => {
                if self.task.is_wait() {
                    self.data.append_log(format!("cancelled {}", self.task));
                    self.no_response();
                }
            }
        }
        std::mem::take(&mut self.effects)
    }

    fn start(&mut self) {
        if self.task != Task::Idle {
            debug!("Start ignored during {}", self.task);
            return;
        }
        info!("Game started with package {:?}", self.package.name);
        self.task = Task::StartGame;
        self.advance();
    }

    fn advance(&mut self) {
        while self.task.is_runnable() {
            let task = self.task;
            self.data.append_log(task.to_string());
            match self.step(task) {
                Ok(next) => self.task = next,
                Err(error) => self.fault(error),
            }
        }
    }

    /// Leaves the current wait for `next`
    fn resume(&mut self, next: Result<Task, EngineError>) {
        self.disarm();
        match next {
            Ok(task) => self.task = task,
            Err(error) => self.fault(error),
        }
        self.advance();
    }

    fn fault(&mut self, error: EngineError) {
        error!("Game fault during {}: {}", self.task, error);
        self.data.append_log(format!("fault during {}: {}", self.task, error));
        self.disarm();
        self.task = if self.task.is_terminal() {
            self.effects.push(Effect::Finished);
            Task::Finished
        } else {
            Task::EndGame
        };
        self.effects.push(Effect::Fault(error));
    }

    fn step(&mut self, task: Task) -> Result<Task, EngineError> {
        match task {
            Task::StartGame => self.start_game(),
            Task::Round => self.next_round(),
            Task::RoundThemes => self.round_themes(),
            Task::AskFirst => self.ask_first(),
            Task::AskToSelectQuestion => self.ask_to_select_question(),
            Task::QuestionSelected => self.question_selected(),
            Task::QuestionType => self.question_type(),
            Task::AskCat => self.ask_cat(),
            Task::AskStake => self.ask_stake(),
            Task::PrintAuctionWinner => self.print_auction_winner(),
            Task::QuestionContent => self.question_content(),
            Task::AskToTry => self.ask_to_try(),
            Task::AskAnswer => self.ask_answer(),
            Task::AskRight => self.ask_right(),
            Task::RightAnswer => self.right_answer(),
            Task::QuestionEnd => self.question_end(),
            Task::AskDelete => self.ask_delete(),
            Task::AnnounceFinalTheme => self.announce_final_theme(),
            Task::AskFinalStake => self.ask_final_stake(),
            Task::FinalQuestion => self.final_question(),
            Task::AskFinalAnswer => self.ask_final_answer(),
            Task::AskFinalRight => self.ask_final_right(),
            Task::EndRound => self.end_round(),
            Task::EndGame => self.end_game(),
            Task::Winner => self.winner(),
            Task::GoodLuck => self.good_luck(),
            Task::Idle | Task::Finished => Ok(task),
            wait => {
                debug!("{} is not runnable", wait);
                Ok(wait)
            }
        }
    }

    // Flow steps

    fn start_game(&mut self) -> Result<Task, EngineError> {
        self.data.stage = Stage::Begin;
        self.broadcast(MessageKind::Stage.text().arg(Stage::Begin));
        self.broadcast(MessageKind::PackageId.text().arg(&self.package.id));
        let rounds: Vec<String> = self.package.rounds.iter().map(|r| r.name.clone()).collect();
        self.broadcast(MessageKind::RoundsNames.text().args(rounds));
        self.broadcast(MessageKind::Package.text().arg(&self.package.name));
        let themes: Vec<String> = self.package.game_themes().into_iter().map(String::from).collect();
        self.broadcast(MessageKind::GameThemes.text().args(themes));
        self.broadcast_sums();
        Ok(Task::Round)
    }

    fn next_round(&mut self) -> Result<Task, EngineError> {
        let index = self.data.round_index.map_or(0, |i| i + 1);
        let Some(round) = self.package.rounds.get(index).cloned() else {
            return Ok(Task::EndGame);
        };
        self.data.round_index = Some(index);

        let selection = Selection::for_round(&round, self.package.selection);
        let has_players = !self.data.connected_players().is_empty();
        if !selection.should_play_round(&round, has_players) {
            info!("Skipping round {} ({:?})", index, round.name);
            return Ok(Task::Round);
        }

        self.data.reset_round();
        self.data.chooser = None;
        self.data.stage = match round.kind {
            RoundType::Standard => Stage::Round,
            RoundType::Final => Stage::Final,
        };
        self.data.table = round
            .themes
            .iter()
            .map(|theme| theme.questions.iter().map(|q| q.price).collect())
            .collect();
        self.data.round_started_at = Some(self.clock.now());
        self.broadcast(
            MessageKind::Stage
                .text()
                .arg(self.data.stage)
                .arg(&round.name)
                .arg(index),
        );

        info!("Round {} ({:?}) started", index, round.name);
        self.round = Some(round);
        self.selection = Some(selection);
        self.round_empty = false;
        Ok(Task::RoundThemes)
    }

    fn round_themes(&mut self) -> Result<Task, EngineError> {
        let (_, events) = self.with_selection(|s, r, h| s.move_next(r, h))?;
        self.note_selection(&events);

        let round = self.active_round()?;
        let is_final = round.kind == RoundType::Final;
        let names: Vec<String> = round.themes.iter().map(|t| t.name.clone()).collect();
        let described: Vec<String> = round
            .themes
            .iter()
            .flat_map(|t| [t.name.clone(), t.comment.clone()])
            .collect();

        let mode = if is_final { "final" } else { "plain" };
        self.broadcast(MessageKind::RoundThemes.text().arg(mode).args(names));
        self.broadcast(MessageKind::RoundThemes2.text().args(described));

        if is_final {
            let players = self.data.players.len();
            self.data.finalists = self
                .data
                .connected_players()
                .into_iter()
                .filter(|p| self.data.players[*p].sum > 0)
                .collect();
            self.data.final_stakes = vec![None; players];
            self.data.final_answers = vec![None; players];

            if self.data.finalists.is_empty() {
                info!("Nobody qualifies for the final round");
                return Ok(Task::EndRound);
            }
            return Ok(Task::AskDelete);
        }

        self.broadcast_table();
        match self.selection {
            Some(Selection::ByPlayer(_)) => Ok(Task::AskFirst),
            _ => Ok(Task::AskToSelectQuestion),
        }
    }

    fn ask_first(&mut self) -> Result<Task, EngineError> {
        self.broadcast(MessageKind::First.text());
        if !self.data.showman.connected {
            return Ok(self.default_chooser());
        }

        let flags = self.player_flags(|data, p| data.is_connected_player(p));
        self.send_to_showman(MessageKind::AskSelectPlayer.text().arg("chooser").args(flags));
        self.arm(self.settings.choose_time);
        Ok(Task::WaitFirst)
    }

    fn ask_to_select_question(&mut self) -> Result<Task, EngineError> {
        if self.round_time_exceeded() {
            info!("Round time limit reached");
            return Ok(Task::EndRound);
        }
        if self.round_empty || self.data.connected_players().is_empty() {
            return Ok(Task::EndRound);
        }

        if matches!(self.selection, Some(Selection::Sequential(_))) {
            self.broadcast(MessageKind::ShowTable.text());
            let (moved, events) = self.with_selection(|s, r, h| s.move_next(r, h))?;
            self.note_selection(&events);
            return Ok(if moved && Self::selected(&events) {
                Task::QuestionSelected
            } else {
                Task::EndRound
            });
        }

        let (_, events) = self.with_selection(|s, r, h| s.move_next(r, h))?;
        self.note_selection(&events);
        if self.round_empty {
            return Ok(Task::EndRound);
        }
        self.broadcast(MessageKind::ShowTable.text());

        if let Some((theme, question)) = self.selection.as_ref().and_then(Selection::only_choice) {
            return self.select_cell(theme, question);
        }

        match self.data.chooser {
            Some(chooser) if self.data.is_connected_player(chooser) => {
                let elapsed = self.elapsed_percent();
                self.send_to_player(chooser, MessageKind::Choose.text().arg(format!("{:.0}", elapsed)));
                self.arm(self.settings.choose_time);
                Ok(Task::WaitChoose)
            }
            _ => self.default_cell(),
        }
    }

    fn question_selected(&mut self) -> Result<Task, EngineError> {
        let (theme, question) = self.indices()?;
        let price = self.current_question()?.price;

        self.data.question_serial += 1;
        self.data.prune_outcomes();
        self.data.reset_question();
        self.data.current_price = price;
        self.data.mark_played(theme, question);

        info!("Question ({}, {}) for {} selected", theme, question, price);
        self.broadcast(MessageKind::Choice.text().arg(theme).arg(question));
        Ok(Task::QuestionType)
    }

    fn question_type(&mut self) -> Result<Task, EngineError> {
        let kind = self.current_question()?.kind;
        self.broadcast(MessageKind::QType.text().arg(kind));

        let chooser = self.data.chooser.filter(|c| self.data.is_connected_player(*c));
        match (kind, chooser) {
            (QuestionType::Personal, Some(chooser)) => {
                self.data.answerer = Some(chooser);
                self.data.answer_mode = AnswerMode::Single;
                Ok(Task::QuestionContent)
            }
            (QuestionType::Secret, Some(_)) => Ok(Task::AskCat),
            (QuestionType::Stake, _) => {
                let connected = self.data.connected_players();
                if connected.is_empty() {
                    return Ok(Task::QuestionContent);
                }
                let start = chooser
                    .and_then(|c| connected.iter().position(|p| *p == c))
                    .unwrap_or(0);
                let mut order = connected;
                order.rotate_left(start);
                self.data.auction = Some(Auction::new(order));
                Ok(Task::AskStake)
            }
            _ => Ok(Task::QuestionContent),
        }
    }

    fn ask_cat(&mut self) -> Result<Task, EngineError> {
        let chooser = self.data.chooser.ok_or(EngineError::NoAnswerer)?;
        let eligible = self.cat_candidates();
        let Some(&first) = eligible.first() else {
            return Ok(Task::RightAnswer);
        };

        if !self.data.is_connected_player(chooser) {
            return Ok(self.give_cat(first));
        }

        let flags = self.player_flags(|_, p| eligible.contains(&p));
        self.send_to_player(chooser, MessageKind::AskSelectPlayer.text().arg("cat").args(flags));
        self.arm(self.settings.choose_time);
        Ok(Task::WaitCat)
    }

    fn ask_stake(&mut self) -> Result<Task, EngineError> {
        let (next, auto_passed) = self.next_staker()?;
        for player in auto_passed {
            self.broadcast(
                MessageKind::PersonStake
                    .text()
                    .arg(player)
                    .arg(StakeKind::Pass.code())
                    .arg(0),
            );
        }

        let Some(player) = next else {
            return Ok(Task::PrintAuctionWinner);
        };

        if !self.data.is_connected_player(player) {
            self.default_stake(player)?;
            return Ok(Task::AskStake);
        }

        let auction = self.data.auction.as_ref().ok_or(EngineError::NoAuction)?;
        let opening = auction.leader.is_none();
        let minimum = if opening {
            self.data.current_price
        } else {
            auction.stake + 1
        };
        let maximum = self.data.players[player].sum;

        self.send_to_player(
            player,
            MessageKind::AskStake
                .text()
                .arg(if opening { "+" } else { "-" })
                .arg(minimum)
                .arg(maximum),
        );
        self.arm(self.settings.stake_time);
        Ok(Task::WaitStake)
    }

    fn print_auction_winner(&mut self) -> Result<Task, EngineError> {
        let auction = self.data.auction.take().ok_or(EngineError::NoAuction)?;
        match auction.leader {
            Some(winner) => {
                info!("Auction won by player {} with {}", winner, auction.stake);
                self.data.answerer = Some(winner);
                self.data.answer_mode = AnswerMode::Single;
                self.data.current_price = auction.stake;
                self.broadcast(MessageKind::PlayerState.text().arg("answering").arg(winner));
            }
            None => self.data.answer_mode = AnswerMode::Button,
        }
        Ok(Task::QuestionContent)
    }

    fn question_content(&mut self) -> Result<Task, EngineError> {
        let question = self.current_question()?.clone();
        self.broadcast(
            MessageKind::Content
                .text()
                .arg("screen")
                .arg("text")
                .arg(&question.text),
        );
        self.send_answers_to_showman(&question);

        Ok(match self.data.answer_mode {
            AnswerMode::Single => Task::AskAnswer,
            AnswerMode::Button => Task::AskToTry,
        })
    }

    fn ask_to_try(&mut self) -> Result<Task, EngineError> {
        if self.try_candidates().is_empty() {
            return Ok(Task::RightAnswer);
        }
        self.broadcast(MessageKind::Try.text());
        self.arm(self.settings.button_time);
        Ok(Task::WaitTry)
    }

    fn ask_answer(&mut self) -> Result<Task, EngineError> {
        let answerer = self.data.answerer.ok_or(EngineError::NoAnswerer)?;
        if !self.data.is_connected_player(answerer) {
            self.data.answer = None;
            return self.judge(answerer, false);
        }

        self.send_to_player(answerer, MessageKind::Answer.text());
        self.arm(self.settings.answer_time);
        Ok(Task::WaitAnswer)
    }

    fn ask_right(&mut self) -> Result<Task, EngineError> {
        let answerer = self.data.answerer.ok_or(EngineError::NoAnswerer)?;
        let answer = self.data.answer.clone().unwrap_or_default();
        self.broadcast(MessageKind::PersonFinalAnswer.text().arg(answerer));

        if !self.data.showman.connected {
            let right = self.current_question()?.matches(&answer);
            return self.judge(answerer, right);
        }

        self.send_to_showman(MessageKind::AskValidate.text().arg(answerer).arg(&answer));
        self.arm(self.settings.validate_time);
        Ok(Task::WaitRight)
    }

    fn right_answer(&mut self) -> Result<Task, EngineError> {
        let right = self
            .current_question()?
            .right
            .first()
            .cloned()
            .unwrap_or_default();
        self.broadcast(MessageKind::RightAnswer.text().arg("plain").arg(right));
        Ok(Task::QuestionEnd)
    }

    fn question_end(&mut self) -> Result<Task, EngineError> {
        self.broadcast(MessageKind::QuestionEnd.text());
        self.data.reset_question();
        self.data.theme_index = None;
        self.data.question_index = None;

        Ok(if self.is_final_round() {
            Task::EndRound
        } else {
            Task::AskToSelectQuestion
        })
    }

    fn ask_delete(&mut self) -> Result<Task, EngineError> {
        let (_, events) = self.with_selection(|s, r, h| s.move_next(r, h))?;
        self.note_selection(&events);

        if Self::selected(&events) {
            return Ok(Task::AnnounceFinalTheme);
        }
        if !events.contains(&SelectionEvent::AskSelection) {
            return Ok(Task::EndRound);
        }

        let deleter = self.current_deleter().ok_or(EngineError::NoAnswerer)?;
        if !self.data.is_connected_player(deleter) {
            return self.default_deletion();
        }

        self.send_to_player(deleter, MessageKind::AskDelete.text());
        self.arm(self.settings.choose_time);
        Ok(Task::WaitDelete)
    }

    fn announce_final_theme(&mut self) -> Result<Task, EngineError> {
        let (theme, _) = self.indices()?;
        let name = self
            .active_round()?
            .themes
            .get(theme)
            .map(|t| t.name.clone())
            .unwrap_or_default();

        self.data.question_serial += 1;
        self.data.prune_outcomes();
        self.data.reset_question();
        self.broadcast(MessageKind::FinalTheme.text().arg(name));
        Ok(Task::AskFinalStake)
    }

    fn ask_final_stake(&mut self) -> Result<Task, EngineError> {
        for finalist in self.data.finalists.clone() {
            if self.data.is_connected_player(finalist) {
                let maximum = self.data.players[finalist].sum;
                self.send_to_player(finalist, MessageKind::AskFinalStake.text().arg(maximum));
            } else {
                self.data.final_stakes[finalist] = Some(1);
            }
        }

        if self.final_stakes_complete() {
            return Ok(Task::FinalQuestion);
        }
        self.arm(self.settings.stake_time);
        Ok(Task::WaitFinalStake)
    }

    fn final_question(&mut self) -> Result<Task, EngineError> {
        let question = self.current_question()?.clone();
        self.broadcast(
            MessageKind::Content
                .text()
                .arg("screen")
                .arg("text")
                .arg(&question.text),
        );
        self.send_answers_to_showman(&question);
        Ok(Task::AskFinalAnswer)
    }

    fn ask_final_answer(&mut self) -> Result<Task, EngineError> {
        for finalist in self.data.finalists.clone() {
            if self.data.is_connected_player(finalist) {
                self.send_to_player(finalist, MessageKind::Answer.text());
            } else {
                self.data.final_answers[finalist] = Some(String::new());
            }
        }

        if self.final_answers_complete() {
            return Ok(self.start_final_validation());
        }
        self.arm(self.settings.answer_time);
        Ok(Task::WaitFinalAnswer)
    }

    fn ask_final_right(&mut self) -> Result<Task, EngineError> {
        let Some(&finalist) = self.data.validation_queue.first() else {
            return Ok(Task::RightAnswer);
        };

        let answer = self.final_answer(finalist);
        self.broadcast(MessageKind::PersonFinalAnswer.text().arg(finalist));

        if answer.trim().is_empty() {
            self.data.validation_queue.remove(0);
            self.judge_final(finalist, false);
            return Ok(Task::AskFinalRight);
        }

        if !self.data.showman.connected {
            let right = self.current_question()?.matches(&answer);
            self.data.validation_queue.remove(0);
            self.judge_final(finalist, right);
            return Ok(Task::AskFinalRight);
        }

        self.send_to_showman(MessageKind::AskValidate.text().arg(finalist).arg(&answer));
        self.arm(self.settings.validate_time);
        Ok(Task::WaitFinalRight)
    }

    fn end_round(&mut self) -> Result<Task, EngineError> {
        if let Some(round) = &self.round {
            info!("Round {:?} ended", round.name);
        }
        self.round = None;
        self.selection = None;
        self.round_empty = false;
        self.data.reset_round();
        Ok(Task::Round)
    }

    fn end_game(&mut self) -> Result<Task, EngineError> {
        self.round = None;
        self.selection = None;
        self.data.stage = Stage::After;
        self.broadcast(MessageKind::Stage.text().arg(Stage::After));
        Ok(Task::Winner)
    }

    fn winner(&mut self) -> Result<Task, EngineError> {
        let winner = self.data.winner();
        match winner {
            Some(index) => info!("Game won by {:?}", self.data.players[index].name),
            None => info!("Game ended without a winner"),
        }
        let index = winner.map_or(-1, |i| i as i64);
        self.broadcast(MessageKind::Winner.text().arg(index));
        Ok(Task::GoodLuck)
    }

    fn good_luck(&mut self) -> Result<Task, EngineError> {
        self.broadcast(MessageKind::GoodLuck.text());
        self.effects.push(Effect::Finished);
        Ok(Task::Finished)
    }

    // Incoming messages

    fn on_message(&mut self, message: &Message) {
        let Some(kind) = message.kind() else {
            debug!("Unknown message from {:?} ignored", message.sender());
            return;
        };
        let args = message.args();

        if message.is_system() {
            if message.sender() != SERVER_NAME {
                warn!("System message from {:?} ignored", message.sender());
                return;
            }
            match (kind, args.get(1)) {
                (MessageKind::Disconnect, Some(name)) => self.on_disconnect(name),
                _ => debug!("System message {} ignored", kind),
            }
            return;
        }

        let sender = message.sender();
        let from_showman = self.data.is_showman(sender);
        match kind {
            MessageKind::Connect => self.on_connect(sender, &args),
            MessageKind::Start if from_showman => self.start(),
            MessageKind::Move if from_showman => match int_arg::<i32>(&args, 1) {
                Some(-1) => self.move_back(),
                Some(1) if self.task.is_wait() => self.no_response(),
                _ => debug!("Move ignored during {}", self.task),
            },
            MessageKind::Toggle if from_showman => {
                if let (Some(theme), Some(question)) = (int_arg(&args, 1), int_arg(&args, 2)) {
                    self.toggle(theme, question);
                }
            }
            MessageKind::Kick | MessageKind::Ban if from_showman => {
                if let Some(name) = args.get(1).filter(|n| !n.is_empty() && !self.data.is_showman(n)) {
                    let ban = kind == MessageKind::Ban;
                    info!("Showman removes {:?} (ban: {})", name, ban);
                    self.effects.push(Effect::Kick {
                        name: name.to_string(),
                        ban,
                    });
                    let verb = if ban { "banned" } else { "kicked" };
                    self.broadcast(MessageKind::Replic.text().arg("s").arg(format!("{} was {}", name, verb)));
                }
            }
            MessageKind::Unban if from_showman => {
                if let Some(identity) = args.get(1) {
                    self.effects.push(Effect::Unban {
                        identity: identity.to_string(),
                    });
                }
            }
            MessageKind::Apellate => self.on_apellate(sender),
            MessageKind::Appellation if from_showman => self.on_appellation(args.get(1) == Some(&"+")),
            _ => self.on_response(sender, kind, &args),
        }
    }

    fn on_response(&mut self, sender: &str, kind: MessageKind, args: &[&str]) {
        let player = self.data.player_index(sender);
        let from_showman = self.data.is_showman(sender);

        let next = match (self.task, kind) {
            (Task::WaitFirst, MessageKind::SelectPlayer) if from_showman => int_arg::<usize>(args, 1)
                .filter(|p| self.data.is_connected_player(*p))
                .map(|p| Ok(self.set_chooser(p))),

            (Task::WaitChoose, MessageKind::Choice) if from_showman || player == self.data.chooser => {
                match (int_arg::<usize>(args, 1), int_arg::<usize>(args, 2)) {
                    (Some(t), Some(q)) if self.is_playable(t, q) => Some(self.select_cell(t, q)),
                    _ => None,
                }
            }

            (Task::WaitCat, MessageKind::SelectPlayer) if player.is_some() && player == self.data.chooser => {
                int_arg::<usize>(args, 1)
                    .filter(|p| self.cat_candidates().contains(p))
                    .map(|p| Ok(self.give_cat(p)))
            }

            (Task::WaitStake, MessageKind::Stake) => {
                let current = self.data.auction.as_ref().and_then(|a| a.current);
                match (player, StakeKind::from_code(int_arg(args, 1).unwrap_or(u8::MAX))) {
                    (Some(p), Some(stake)) if Some(p) == current => self
                        .apply_stake(p, stake, int_arg(args, 2))
                        .then_some(Ok(Task::AskStake)),
                    _ => None,
                }
            }

            (Task::WaitTry, MessageKind::I) => match player {
                Some(p) if self.try_candidates().contains(&p) => {
                    self.data.answerer = Some(p);
                    self.data.tried.push(p);
                    self.broadcast(MessageKind::EndTry.text().arg(p));
                    Some(Ok(Task::AskAnswer))
                }
                _ => None,
            },

            (Task::WaitAnswer, MessageKind::Answer) if player.is_some() && player == self.data.answerer => {
                self.data.answer = Some(args.get(1).map(|s| s.to_string()).unwrap_or_default());
                Some(Ok(Task::AskRight))
            }

            (Task::WaitRight, MessageKind::Validate) if from_showman => {
                Self::verdict(args).map(|right| match self.data.answerer {
                    Some(answerer) => {
                        self.broadcast(MessageKind::Cancel.text());
                        self.judge(answerer, right)
                    }
                    None => Err(EngineError::NoAnswerer),
                })
            }

            (Task::WaitDelete, MessageKind::Delete) if player.is_some() && player == self.current_deleter() => {
                int_arg::<usize>(args, 1)
                    .filter(|t| self.is_playable(*t, 0))
                    .map(|t| self.delete_theme(t))
            }

            (Task::WaitFinalStake, MessageKind::FinalStake) => match (player, int_arg::<i32>(args, 1)) {
                (Some(p), Some(stake)) if self.awaits_final_stake(p) => {
                    if stake < 1 || stake > self.data.players[p].sum {
                        None
                    } else {
                        self.data.final_stakes[p] = Some(stake);
                        self.broadcast(MessageKind::PlayerState.text().arg("staked").arg(p));
                        self.final_stakes_complete().then_some(Ok(Task::FinalQuestion))
                    }
                }
                _ => None,
            },

            (Task::WaitFinalAnswer, MessageKind::Answer) => match player {
                Some(p) if self.awaits_final_answer(p) => {
                    self.data.final_answers[p] = Some(args.get(1).map(|s| s.to_string()).unwrap_or_default());
                    self.broadcast(MessageKind::PlayerState.text().arg("answered").arg(p));
                    self.final_answers_complete()
                        .then(|| Ok(self.start_final_validation()))
                }
                _ => None,
            },

            (Task::WaitFinalRight, MessageKind::Validate) if from_showman => Self::verdict(args).map(|right| {
                self.broadcast(MessageKind::Cancel.text());
                if !self.data.validation_queue.is_empty() {
                    let finalist = self.data.validation_queue.remove(0);
                    self.judge_final(finalist, right);
                }
                Ok(Task::AskFinalRight)
            }),

            _ => {
                debug!("Stale {} from {:?} during {}", kind, sender, self.task);
                return;
            }
        };

        match next {
            Some(next) => self.resume(next),
            None => debug!("Rejected {} from {:?} during {}", kind, sender, self.task),
        }
    }

    /// Substitutes the default outcome for the awaited response
    fn no_response(&mut self) {
        let next = match self.task {
            Task::WaitFirst => Ok(self.default_chooser()),
            Task::WaitChoose => self.default_cell(),
            Task::WaitCat => match self.cat_candidates().first() {
                Some(&p) => Ok(self.give_cat(p)),
                None => Ok(Task::RightAnswer),
            },
            Task::WaitStake => match self.data.auction.as_ref().and_then(|a| a.current) {
                Some(p) => self.default_stake(p).map(|_| Task::AskStake),
                None => Err(EngineError::NoAuction),
            },
            Task::WaitTry => {
                self.broadcast(MessageKind::EndTry.text().arg("A"));
                Ok(Task::RightAnswer)
            }
            Task::WaitAnswer => match self.data.answerer {
                Some(answerer) => {
                    self.data.answer = None;
                    self.judge(answerer, false)
                }
                None => Err(EngineError::NoAnswerer),
            },
            Task::WaitRight => match self.data.answerer {
                Some(answerer) => {
                    let answer = self.data.answer.clone().unwrap_or_default();
                    let right = self.current_question().map(|q| q.matches(&answer));
                    self.broadcast(MessageKind::Cancel.text());
                    right.and_then(|right| self.judge(answerer, right))
                }
                None => Err(EngineError::NoAnswerer),
            },
            Task::WaitDelete => self.default_deletion(),
            Task::WaitFinalStake => {
                for finalist in self.data.finalists.clone() {
                    self.data.final_stakes[finalist].get_or_insert(1);
                }
                Ok(Task::FinalQuestion)
            }
            Task::WaitFinalAnswer => {
                for finalist in self.data.finalists.clone() {
                    self.data.final_answers[finalist].get_or_insert_with(String::new);
                }
                Ok(self.start_final_validation())
            }
            Task::WaitFinalRight => {
                if !self.data.validation_queue.is_empty() {
                    let finalist = self.data.validation_queue.remove(0);
                    let answer = self.final_answer(finalist);
                    let right = self.current_question().is_ok_and(|q| q.matches(&answer));
                    self.broadcast(MessageKind::Cancel.text());
                    self.judge_final(finalist, right);
                }
                Ok(Task::AskFinalRight)
            }
            _ => return,
        };
        self.resume(next);
    }

    fn on_connect(&mut self, sender: &str, args: &[&str]) {
        let role: Option<GameRole> = args.get(1).and_then(|r| r.parse().ok());
        let sex: Sex = args.get(3).and_then(|s| s.parse().ok()).unwrap_or_default();
        let is_human = args.get(4) != Some(&BOT_MARKER);
        if self.data.is_seated(sender) {
            debug!("{:?} is already seated, connect ignored", sender);
            return;
        }

        let seat = match role {
            Some(GameRole::Showman) if self.data.showman.accepts(sender) => {
                self.data.showman.seat(sender, sex, is_human);
                Some(0)
            }
            Some(GameRole::Player) => {
                let reclaimed = self
                    .data
                    .players
                    .iter()
                    .position(|p| !p.connected && p.name == sender);
                let seat = reclaimed.or_else(|| self.data.players.iter().position(|p| p.is_free()));
                if let Some(index) = seat {
                    self.data.players[index].seat(sender, sex, is_human);
                }
                seat
            }
            Some(GameRole::Viewer) => {
                let mut viewer = PersonAccount::free();
                viewer.seat(sender, sex, is_human);
                self.data.viewers.push(viewer);
                Some(self.data.viewers.len() - 1)
            }
            _ => None,
        };

        let (Some(role), Some(index)) = (role, seat) else {
            info!("No free seat for {:?}", sender);
            self.effects.push(Effect::Kick {
                name: sender.to_string(),
                ban: false,
            });
            return;
        };

        info!("{:?} seated as {} {}", sender, role, index);
        self.data.append_log(format!("{} joined as {}", sender, role));
        self.broadcast(
            MessageKind::Connected
                .text()
                .arg(role)
                .arg(sender)
                .arg(sex)
                .arg(index),
        );
        self.broadcast(MessageKind::Replic.text().arg("s").arg(format!("{} joined as {}", sender, role)));
        self.send_state(sender);

        if self.settings.auto_start && self.task == Task::Idle && self.data.seats_filled() {
            self.start();
        }
    }

    fn on_disconnect(&mut self, name: &str) {
        let Some((role, index)) = self.data.role_of(name) else {
            return;
        };
        info!("{:?} disconnected", name);
        self.data.append_log(format!("{} left", name));
        self.broadcast(MessageKind::Replic.text().arg("s").arg(format!("{} left", name)));

        let awaited = match role {
            GameRole::Viewer => {
                self.data.viewers.remove(index);
                false
            }
            GameRole::Showman => {
                self.data.showman.connected = false;
                self.data.appellation = None;
                matches!(self.task, Task::WaitFirst | Task::WaitRight | Task::WaitFinalRight)
            }
            GameRole::Player => {
                self.data.players[index].connected = false;
                match self.task {
                    Task::WaitChoose | Task::WaitCat => self.data.chooser == Some(index),
                    Task::WaitStake => self.data.auction.as_ref().and_then(|a| a.current) == Some(index),
                    Task::WaitAnswer => self.data.answerer == Some(index),
                    Task::WaitDelete => self.current_deleter() == Some(index),
                    Task::WaitTry => self.try_candidates().is_empty(),
                    Task::WaitFinalStake if self.awaits_final_stake(index) => {
                        self.data.final_stakes[index] = Some(1);
                        if self.final_stakes_complete() {
                            self.resume(Ok(Task::FinalQuestion));
                        }
                        false
                    }
                    Task::WaitFinalAnswer if self.awaits_final_answer(index) => {
                        self.data.final_answers[index] = Some(String::new());
                        if self.final_answers_complete() {
                            let next = self.start_final_validation();
                            self.resume(Ok(next));
                        }
                        false
                    }
                    _ => false,
                }
            }
        };

        if awaited {
            self.no_response();
        }
    }

    fn move_back(&mut self) {
        if self.task != Task::WaitChoose {
            debug!("Move back ignored during {}", self.task);
            return;
        }
        match self.with_selection(|s, r, h| s.move_back(r, h)) {
            Ok((true, events)) => self.note_selection(&events),
            _ => debug!("Nothing to move back to"),
        }
    }

    /// Removes a playable cell or brings a removed one back
    fn toggle(&mut self, theme: usize, question: usize) {
        if !matches!(self.selection, Some(Selection::ByPlayer(_))) {
            debug!("Toggle ignored outside a free-selection round");
            return;
        }
        if self.data.theme_index == Some(theme) && self.data.question_index == Some(question) {
            return;
        }

        if self.is_playable(theme, question) {
            let Ok((_, events)) = self.with_selection(|s, _, h| s.remove_question(theme, question, h)) else {
                return;
            };
            self.data.set_price(theme, question, INVALID_PRICE);
            self.broadcast(MessageKind::Toggle.text().arg(theme).arg(question).arg(INVALID_PRICE));
            self.note_selection(&events);

            if self.round_empty && self.task == Task::WaitChoose {
                self.resume(Ok(Task::EndRound));
            }
        } else if let Ok((true, _)) = self.with_selection(|s, r, _| s.restore_question(r, theme, question)) {
            let price = self.round.as_ref().map_or(INVALID_PRICE, |r| r.price(theme, question));
            self.data.set_price(theme, question, price);
            self.broadcast(MessageKind::Toggle.text().arg(theme).arg(question).arg(price));
        }
    }

    fn on_apellate(&mut self, sender: &str) {
        let Some(player) = self.data.player_index(sender) else {
            return;
        };
        if self.data.appellation.is_some() || !self.data.showman.connected {
            debug!("Appellation from {:?} rejected", sender);
            return;
        }
        let Some(outcome) = self.data.appealable(player).cloned() else {
            return;
        };

        info!("{:?} appeals the answer {:?}", sender, outcome.answer);
        self.send_to_showman(
            MessageKind::AskAppellation
                .text()
                .arg(outcome.player)
                .arg(&outcome.answer),
        );
        self.data.appellation = Some(outcome);
    }

    fn on_appellation(&mut self, accepted: bool) {
        let Some(outcome) = self.data.appellation.take() else {
            return;
        };
        if !accepted {
            info!("Appellation of player {} rejected", outcome.player);
            return;
        }

        if let Some(player) = self.data.players.get_mut(outcome.player) {
            player.sum += 2 * outcome.price;
        }
        if let Some(recorded) = self.data.outcomes.iter_mut().find(|o| **o == outcome) {
            recorded.right = true;
        }
        info!("Appellation of player {} accepted", outcome.player);
        self.broadcast(
            MessageKind::Person
                .text()
                .arg("+")
                .arg(outcome.player)
                .arg(outcome.price),
        );
        self.broadcast_sums();
    }

    // Decisions and defaults

    fn set_chooser(&mut self, player: usize) -> Task {
        self.data.chooser = Some(player);
        self.broadcast(MessageKind::SetChooser.text().arg(player));
        self.broadcast_sums();
        Task::AskToSelectQuestion
    }

    fn default_chooser(&mut self) -> Task {
        match self.data.lowest_sum_player() {
            Some(player) => self.set_chooser(player),
            None => Task::EndRound,
        }
    }

    fn select_cell(&mut self, theme: usize, question: usize) -> Result<Task, EngineError> {
        let (result, events) = self.with_selection(|s, _, h| s.select(theme, question, h))?;
        result?;
        self.note_selection(&events);
        Ok(Task::QuestionSelected)
    }

    fn default_cell(&mut self) -> Result<Task, EngineError> {
        match self.selection.as_ref().and_then(Selection::default_choice) {
            Some((theme, question)) => self.select_cell(theme, question),
            None => Ok(Task::EndRound),
        }
    }

    fn give_cat(&mut self, player: usize) -> Task {
        self.data.answerer = Some(player);
        self.data.answer_mode = AnswerMode::Single;
        self.broadcast(MessageKind::PlayerState.text().arg("answering").arg(player));
        Task::QuestionContent
    }

    fn cat_candidates(&self) -> Vec<usize> {
        let connected = self.data.connected_players();
        let others: Vec<usize> = connected
            .iter()
            .copied()
            .filter(|p| Some(*p) != self.data.chooser)
            .collect();
        if others.is_empty() {
            connected
        } else {
            others
        }
    }

    fn try_candidates(&self) -> Vec<usize> {
        self.data
            .connected_players()
            .into_iter()
            .filter(|p| !self.data.tried.contains(p))
            .collect()
    }

    /// Next player to ask in the auction, plus players passed automatically
    /// because they cannot outbid the leader
    fn next_staker(&mut self) -> Result<(Option<usize>, Vec<usize>), EngineError> {
        let sums = self.data.sums();
        let auction = self.data.auction.as_mut().ok_or(EngineError::NoAuction)?;
        let mut auto_passed = Vec::new();
        let participants = auction.order.len();

        for _ in 0..participants {
            if auction.is_over() {
                break;
            }
            let candidate = auction.order[auction.cursor % participants];
            auction.cursor += 1;

            if auction.passed.contains(&candidate) || auction.leader == Some(candidate) {
                continue;
            }
            if auction.leader.is_some() && sums[candidate] <= auction.stake {
                auction.passed.push(candidate);
                auto_passed.push(candidate);
                continue;
            }
            auction.current = Some(candidate);
            return Ok((Some(candidate), auto_passed));
        }

        auction.current = None;
        Ok((None, auto_passed))
    }

    /// Applies a stake if it is legal; broadcasts it on success
    fn apply_stake(&mut self, player: usize, kind: StakeKind, sum: Option<i32>) -> bool {
        let price = self.data.current_price;
        let balance = self.data.players[player].sum;
        let Some(auction) = self.data.auction.as_mut() else {
            return false;
        };

        let stake = match (kind, auction.leader) {
            (StakeKind::Nominal, None) => price,
            (StakeKind::Sum, leader) => match sum {
                Some(sum) if sum <= balance && sum >= price && (leader.is_none() || sum > auction.stake) => sum,
                _ => return false,
            },
            (StakeKind::AllIn, leader) if balance > 0 && (leader.is_none() || balance > auction.stake) => balance,
            (StakeKind::Pass, Some(_)) => {
                auction.passed.push(player);
                self.broadcast(MessageKind::PersonStake.text().arg(player).arg(kind.code()).arg(0));
                return true;
            }
            _ => return false,
        };

        auction.stake = stake;
        auction.leader = Some(player);
        self.broadcast(MessageKind::PersonStake.text().arg(player).arg(kind.code()).arg(stake));
        true
    }

    fn default_stake(&mut self, player: usize) -> Result<(), EngineError> {
        let auction = self.data.auction.as_ref().ok_or(EngineError::NoAuction)?;
        let kind = if auction.leader.is_none() {
            StakeKind::Nominal
        } else {
            StakeKind::Pass
        };
        self.apply_stake(player, kind, None);
        Ok(())
    }

    fn judge(&mut self, player: usize, right: bool) -> Result<Task, EngineError> {
        let price = self.data.current_price;
        let answer = self.data.answer.clone().unwrap_or_default();
        self.score(player, right, price, answer);

        if right {
            let free_selection = matches!(self.selection, Some(Selection::ByPlayer(_)));
            if free_selection && self.data.chooser != Some(player) {
                self.data.chooser = Some(player);
                self.broadcast(MessageKind::SetChooser.text().arg(player));
            }
            return Ok(Task::RightAnswer);
        }

        match self.data.answer_mode {
            AnswerMode::Button => {
                self.data.answerer = None;
                self.data.answer = None;
                Ok(Task::AskToTry)
            }
            AnswerMode::Single => Ok(Task::RightAnswer),
        }
    }

    fn judge_final(&mut self, finalist: usize, right: bool) {
        let stake = self
            .data
            .final_stakes
            .get(finalist)
            .copied()
            .flatten()
            .unwrap_or(1);
        let answer = self.final_answer(finalist);
        self.score(finalist, right, stake, answer);
    }

    fn score(&mut self, player: usize, right: bool, price: i32, answer: String) {
        if let Some(account) = self.data.players.get_mut(player) {
            account.sum += if right { price } else { -price };
        }
        self.data.append_log(format!(
            "player {} answered {:?}: {}",
            player,
            answer,
            if right { "right" } else { "wrong" }
        ));
        self.data.outcomes.push(Outcome {
            serial: self.data.question_serial,
            player,
            answer,
            price,
            right,
        });

        let sign = if right { "+" } else { "-" };
        self.broadcast(MessageKind::Person.text().arg(sign).arg(player).arg(price));
        self.broadcast_sums();
    }

    fn current_deleter(&self) -> Option<usize> {
        let finalists = &self.data.finalists;
        if finalists.is_empty() {
            return None;
        }
        finalists.get(self.data.deleter % finalists.len()).copied()
    }

    fn delete_theme(&mut self, theme: usize) -> Result<Task, EngineError> {
        let (result, events) = self.with_selection(|s, _, h| s.select(theme, 0, h))?;
        result?;
        self.note_selection(&events);
        self.data.deleter += 1;
        Ok(Task::AskDelete)
    }

    fn default_deletion(&mut self) -> Result<Task, EngineError> {
        match self.selection.as_ref().and_then(Selection::default_choice) {
            Some((theme, _)) => self.delete_theme(theme),
            None => Ok(Task::EndRound),
        }
    }

    fn awaits_final_stake(&self, player: usize) -> bool {
        self.data.finalists.contains(&player) && self.data.final_stakes.get(player) == Some(&None)
    }

    fn awaits_final_answer(&self, player: usize) -> bool {
        self.data.finalists.contains(&player) && self.data.final_answers.get(player) == Some(&None)
    }

    fn final_stakes_complete(&self) -> bool {
        self.data
            .finalists
            .iter()
            .all(|f| self.data.final_stakes.get(*f).is_some_and(Option::is_some))
    }

    fn final_answers_complete(&self) -> bool {
        self.data
            .finalists
            .iter()
            .all(|f| self.data.final_answers.get(*f).is_some_and(Option::is_some))
    }

    fn final_answer(&self, finalist: usize) -> String {
        self.data
            .final_answers
            .get(finalist)
            .cloned()
            .flatten()
            .unwrap_or_default()
    }

    fn start_final_validation(&mut self) -> Task {
        self.data.validation_queue = self.data.finalists.clone();
        Task::AskFinalRight
    }

    // Selection plumbing

    fn with_selection<R>(
        &mut self,
        f: impl FnOnce(&mut Selection, &Round, &mut SelectionEvents) -> R,
    ) -> Result<(R, Vec<SelectionEvent>), EngineError> {
        let (Some(selection), Some(round)) = (self.selection.as_mut(), self.round.as_ref()) else {
            return Err(EngineError::NoActiveRound);
        };
        let mut events = SelectionEvents::default();
        let result = f(selection, round, &mut events);
        Ok((result, events.0))
    }

    fn note_selection(&mut self, events: &[SelectionEvent]) {
        for event in events {
            match event {
                SelectionEvent::RoundThemes(_) | SelectionEvent::AskSelection => {}
                SelectionEvent::QuestionSelected(theme, question) => {
                    self.data.theme_index = Some(*theme);
                    self.data.question_index = Some(*question);
                }
                SelectionEvent::QuestionRestored(theme, question, price) => {
                    self.data.set_price(*theme, *question, *price);
                    self.broadcast(MessageKind::Toggle.text().arg(theme).arg(question).arg(price));
                }
                SelectionEvent::ThemeDeleted(theme) => {
                    info!("Theme {} deleted", theme);
                    self.broadcast(MessageKind::Out.text().arg(theme));
                }
                SelectionEvent::RoundEmpty => {
                    debug!("No questions left in the round");
                    self.round_empty = true;
                }
            }
        }
    }

    fn selected(events: &[SelectionEvent]) -> bool {
        events
            .iter()
            .any(|e| matches!(e, SelectionEvent::QuestionSelected(..)))
    }

    fn is_playable(&self, theme: usize, question: usize) -> bool {
        self.selection
            .as_ref()
            .is_some_and(|s| s.is_playable(theme, question))
    }

    fn is_final_round(&self) -> bool {
        self.round.as_ref().is_some_and(|r| r.kind == RoundType::Final)
    }

    fn active_round(&self) -> Result<&Round, EngineError> {
        self.round.as_ref().ok_or(EngineError::NoActiveRound)
    }

    fn indices(&self) -> Result<(usize, usize), EngineError> {
        match (self.data.theme_index, self.data.question_index) {
            (Some(theme), Some(question)) => Ok((theme, question)),
            _ => Err(EngineError::NoQuestion),
        }
    }

    fn current_question(&self) -> Result<&Question, EngineError> {
        let (theme, question) = self.indices()?;
        self.active_round()?
            .question(theme, question)
            .ok_or(EngineError::MissingQuestion(theme, question))
    }

    // Time

    fn round_time_exceeded(&self) -> bool {
        self.data
            .round_started_at
            .is_some_and(|started| self.clock.now().duration_since(started) > self.settings.round_time)
    }

    fn elapsed_percent(&self) -> f64 {
        let Some(started) = self.data.round_started_at else {
            return 0.0;
        };
        let limit = self.settings.round_time.as_secs_f64();
        if limit <= 0.0 {
            return 0.0;
        }
        (self.clock.now().duration_since(started).as_secs_f64() / limit * 100.0).min(100.0)
    }

    fn arm(&mut self, after: Duration) {
        self.disarm();
        self.generation += 1;
        self.timer_armed = true;
        self.effects.push(Effect::ArmTimer {
            generation: self.generation,
            after,
        });
        let deciseconds = after.as_millis() / 100;
        self.broadcast(MessageKind::Timer.text().arg(1).arg("GO").arg(deciseconds));
    }

    fn disarm(&mut self) {
        if self.timer_armed {
            self.timer_armed = false;
            self.effects.push(Effect::DisarmTimer);
            self.broadcast(MessageKind::Timer.text().arg(1).arg("STOP"));
        }
    }

    // Output

    fn broadcast(&mut self, text: impl Into<String>) {
        self.effects
            .push(Effect::Send(Message::new(GAME_NAME, EVERYBODY, text)));
    }

    fn send(&mut self, receiver: &str, text: impl Into<String>) {
        self.effects
            .push(Effect::Send(Message::new(GAME_NAME, receiver, text)));
    }

    fn send_to_showman(&mut self, text: impl Into<String>) {
        if self.data.showman.connected {
            let name = self.data.showman.name.clone();
            self.send(&name, text);
        }
    }

    fn send_to_player(&mut self, player: usize, text: impl Into<String>) {
        if let Some(name) = self.data.player_name(player).map(String::from) {
            if !name.is_empty() {
                self.send(&name, text);
            }
        }
    }

    fn send_answers_to_showman(&mut self, question: &Question) {
        self.send_to_showman(
            MessageKind::QuestionAnswers
                .text()
                .arg(question.right.len())
                .args(&question.right)
                .args(&question.wrong),
        );
    }

    fn broadcast_sums(&mut self) {
        let sums = self.data.sums();
        self.broadcast(MessageKind::Sums.text().args(sums));
    }

    fn broadcast_table(&mut self) {
        let table: Vec<String> = self.data.table.iter().map(|prices| format_prices(prices)).collect();
        self.broadcast(MessageKind::Table.text().args(table));
    }

    fn player_flags(&self, eligible: impl Fn(&GameData, usize) -> bool) -> Vec<&'static str> {
        (0..self.data.players.len())
            .map(|p| if eligible(&self.data, p) { "+" } else { "-" })
            .collect()
    }

    /// Brings a newcomer (or a reconnecting person) up to date
    fn send_state(&mut self, name: &str) {
        let mut stage = MessageKind::Stage.text().arg(self.data.stage);
        if let (Some(round), Some(index)) = (&self.round, self.data.round_index) {
            stage = stage.arg(&round.name).arg(index);
        }
        self.send(name, stage);
        let sums = self.data.sums();
        self.send(name, MessageKind::Sums.text().args(sums));

        if let Some(round) = &self.round {
            let mode = if round.kind == RoundType::Final { "final" } else { "plain" };
            let names: Vec<String> = round.themes.iter().map(|t| t.name.clone()).collect();
            let table: Vec<String> = self.data.table.iter().map(|prices| format_prices(prices)).collect();
            self.send(name, MessageKind::RoundThemes.text().arg(mode).args(names));
            self.send(name, MessageKind::Table.text().args(table));
        }
    }

    fn verdict(args: &[&str]) -> Option<bool> {
        match args.last().map(|s| s.trim()) {
            Some("+") => Some(true),
            Some("-") => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::clock::FakeClock;
    use assert_approx_eq::assert_approx_eq;
    use shared::{SelectionMode, Theme, SERVER_NAME};

    fn settings(players: usize) -> GameSettings {
        GameSettings {
            players,
            ..GameSettings::default()
        }
    }

    fn one_question(kind: QuestionType) -> Package {
        let question = Question::new(10, "Capital of France", &["Paris"]).with_kind(kind);
        Package::new("Tiny", vec![Round::new("Only", vec![Theme::new("Cities", vec![question])])])
    }

    fn engine(package: Package, players: usize) -> (Engine, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let engine = Engine::new(package, settings(players), clock.clone());
        (engine, clock)
    }

    fn from(sender: &str, text: impl Into<String>) -> Event {
        Event::Message(Message::new(sender, GAME_NAME, text))
    }

    fn connect(engine: &mut Engine, role: GameRole, name: &str) -> Vec<Effect> {
        engine.handle(from(
            name,
            MessageKind::Connect.text().arg(role).arg(name).arg("m"),
        ))
    }

    fn seat_all(engine: &mut Engine, players: &[&str]) {
        connect(engine, GameRole::Showman, "host");
        for name in players {
            connect(engine, GameRole::Player, name);
        }
    }

    fn sent(effects: &[Effect]) -> Vec<&Message> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn kinds(effects: &[Effect]) -> Vec<MessageKind> {
        sent(effects)
            .into_iter()
            .filter_map(|m| m.kind())
            .filter(|k| *k != MessageKind::Timer)
            .collect()
    }

    fn last_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().rev().find_map(|e| match e {
            Effect::ArmTimer { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn assert_subsequence(actual: &[MessageKind], expected: &[MessageKind]) {
        let mut rest = actual.iter();
        for kind in expected {
            assert!(
                rest.any(|k| k == kind),
                "{:?} missing or out of order in {:?}",
                kind,
                actual
            );
        }
    }

    #[test]
    fn test_personal_question_flow() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 2);
        seat_all(&mut engine, &["alice", "bob"]);

        let effects = engine.handle(Event::Start);
        assert_eq!(
            kinds(&effects),
            vec![
                MessageKind::Stage,
                MessageKind::PackageId,
                MessageKind::RoundsNames,
                MessageKind::Package,
                MessageKind::GameThemes,
                MessageKind::Sums,
                MessageKind::Stage,
                MessageKind::RoundThemes,
                MessageKind::RoundThemes2,
                MessageKind::Table,
                MessageKind::First,
                MessageKind::AskSelectPlayer,
            ]
        );
        assert_eq!(engine.task(), Task::WaitFirst);

        let effects = engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        assert_subsequence(
            &kinds(&effects),
            &[
                MessageKind::SetChooser,
                MessageKind::Sums,
                MessageKind::ShowTable,
                MessageKind::Choice,
                MessageKind::QType,
                MessageKind::Content,
                MessageKind::QuestionAnswers,
                MessageKind::Answer,
            ],
        );
        assert_eq!(engine.task(), Task::WaitAnswer);

        let effects = engine.handle(from("alice", MessageKind::Answer.text().arg("myAnswer")));
        let messages = sent(&effects);
        let validate = messages
            .iter()
            .find(|m| m.kind() == Some(MessageKind::AskValidate))
            .unwrap();
        assert_eq!(validate.receiver(), "host");
        assert_eq!(validate.args()[1..], ["0", "myAnswer"]);
        assert_subsequence(&kinds(&effects), &[MessageKind::PersonFinalAnswer, MessageKind::AskValidate]);

        let effects = engine.handle(from("host", MessageKind::Validate.text().arg("myAnswer").arg("+")));
        let person = sent(&effects)
            .into_iter()
            .find(|m| m.kind() == Some(MessageKind::Person))
            .unwrap()
            .text()
            .to_string();
        assert_eq!(person, "PERSON\n+\n0\n10");
        assert_subsequence(
            &kinds(&effects),
            &[MessageKind::Cancel, MessageKind::Person, MessageKind::Sums],
        );
        assert_eq!(engine.data().players[0].sum, 10);

        assert_subsequence(
            &kinds(&effects),
            &[MessageKind::Stage, MessageKind::Winner, MessageKind::GoodLuck],
        );
        assert!(engine.is_finished());
        assert!(effects.iter().any(|e| matches!(e, Effect::Finished)));
    }

    #[test]
    fn test_full_game_on_timeouts_keeps_single_timer() {
        let (mut engine, _clock) = engine(Package::demo(), 2);
        seat_all(&mut engine, &["alice", "bob"]);

        let mut effects = engine.handle(Event::Start);
        let mut live = 0i32;
        let mut steps = 0;

        loop {
            for effect in &effects {
                match effect {
                    Effect::ArmTimer { .. } => {
                        live += 1;
                        assert_eq!(live, 1, "two live timers");
                    }
                    Effect::DisarmTimer => live -= 1,
                    _ => {}
                }
            }
            if engine.is_finished() {
                break;
            }
            let generation = last_generation(&effects).expect("waiting without a timer");
            effects = engine.handle(Event::Timeout { generation });
            steps += 1;
            assert!(steps < 200, "game does not terminate");
        }

        assert_eq!(live, 0);
        assert_eq!(engine.stage(), Stage::After);
    }

    #[test]
    fn test_stale_timeout_and_stale_response_ignored() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 2);
        seat_all(&mut engine, &["alice", "bob"]);
        let effects = engine.handle(Event::Start);
        let first = last_generation(&effects).unwrap();

        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(1)));
        assert_eq!(engine.task(), Task::WaitAnswer);

        assert!(engine.handle(Event::Timeout { generation: first }).is_empty());
        assert_eq!(engine.task(), Task::WaitAnswer);

        let effects = engine.handle(from("alice", MessageKind::Answer.text().arg("Paris")));
        assert!(effects.is_empty());
        assert_eq!(engine.task(), Task::WaitAnswer);
    }

    #[test]
    fn test_button_race_reopens_after_wrong_answer() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Simple), 2);
        seat_all(&mut engine, &["alice", "bob"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        assert_eq!(engine.task(), Task::WaitTry);

        engine.handle(from("bob", MessageKind::I.text()));
        engine.handle(from("bob", MessageKind::Answer.text().arg("Lyon")));
        let effects = engine.handle(from("host", MessageKind::Validate.text().arg("Lyon").arg("-")));
        assert_eq!(engine.data().players[1].sum, -10);
        assert!(kinds(&effects).contains(&MessageKind::Try));
        assert_eq!(engine.task(), Task::WaitTry);

        // bob already tried
        assert!(kinds(&engine.handle(from("bob", MessageKind::I.text()))).is_empty());

        engine.handle(from("alice", MessageKind::I.text()));
        engine.handle(from("alice", MessageKind::Answer.text().arg("Paris")));
        engine.handle(from("host", MessageKind::Validate.text().arg("Paris").arg("+")));
        assert_eq!(engine.data().players[0].sum, 10);
        assert!(engine.is_finished());
    }

    #[test]
    fn test_validation_timeout_compares_with_right_answers() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        let effects = engine.handle(from("alice", MessageKind::Answer.text().arg(" paris ")));

        let generation = last_generation(&effects).unwrap();
        engine.handle(Event::Timeout { generation });
        assert_eq!(engine.data().players[0].sum, 10);
    }

    #[test]
    fn test_disconnected_answerer_is_judged_wrong() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 2);
        seat_all(&mut engine, &["alice", "bob"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));

        let disconnect = Message::system(SERVER_NAME, EVERYBODY, MessageKind::Disconnect.text().arg("alice"));
        engine.handle(Event::Message(disconnect));
        assert_eq!(engine.data().players[0].sum, -10);
        assert!(!engine.data().players[0].connected);
    }

    #[test]
    fn test_no_free_seat_kicks_and_reconnect_reclaims() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Simple), 1);
        connect(&mut engine, GameRole::Player, "alice");

        let effects = connect(&mut engine, GameRole::Player, "bob");
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Kick { name, ban: false } if name == "bob")));

        engine.handle(Event::Message(Message::system(
            SERVER_NAME,
            EVERYBODY,
            MessageKind::Disconnect.text().arg("alice"),
        )));
        let effects = connect(&mut engine, GameRole::Player, "bob");
        assert!(effects.iter().any(|e| matches!(e, Effect::Kick { .. })));

        let effects = connect(&mut engine, GameRole::Player, "alice");
        let connected = sent(&effects)
            .into_iter()
            .find(|m| m.kind() == Some(MessageKind::Connected))
            .unwrap()
            .text()
            .to_string();
        assert_eq!(connected, "CONNECTED\nplayer\nalice\nm\n0");
        assert!(engine.data().players[0].connected);
    }

    #[test]
    fn test_system_messages_only_from_the_node() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 2);
        seat_all(&mut engine, &["ann", "ben"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(1)));
        assert_eq!(engine.task(), Task::WaitAnswer);

        let forged = Message::system("ann", GAME_NAME, MessageKind::Disconnect.text().arg("ben"));
        assert!(engine.handle(Event::Message(forged)).is_empty());
        assert!(engine.data().players[1].connected);
        assert_eq!(engine.data().players[1].sum, 0);
        assert_eq!(engine.task(), Task::WaitAnswer);
    }

    #[test]
    fn test_seated_person_cannot_take_another_seat() {
        let clock = Arc::new(FakeClock::new());
        let settings = GameSettings {
            players: 2,
            auto_start: true,
            ..GameSettings::default()
        };
        let mut engine = Engine::new(one_question(QuestionType::Simple), settings, clock);
        seat_all(&mut engine, &["ann"]);

        assert!(connect(&mut engine, GameRole::Player, "ann").is_empty());
        assert!(connect(&mut engine, GameRole::Player, "host").is_empty());
        assert!(connect(&mut engine, GameRole::Viewer, "ann").is_empty());

        assert!(engine.data().players[1].is_free());
        assert!(engine.data().viewers.is_empty());
        assert_eq!(engine.task(), Task::Idle);
    }

    fn two_cell_package() -> Package {
        Package::new(
            "Two",
            vec![Round::new(
                "R",
                vec![Theme::new(
                    "T",
                    vec![Question::new(10, "a", &["a"]), Question::new(20, "b", &["b"])],
                )],
            )],
        )
    }

    #[test]
    fn test_move_back_restores_played_cell() {
        let cells = vec![
            Question::new(10, "a", &["a"]),
            Question::new(20, "b", &["b"]),
            Question::new(30, "c", &["c"]),
        ];
        let package = Package::new("Three", vec![Round::new("R", vec![Theme::new("T", cells)])]);
        let (mut engine, _clock) = engine(package, 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));

        engine.handle(from("alice", MessageKind::Choice.text().arg(0).arg(0)));
        assert_eq!(engine.task(), Task::WaitTry);
        engine.handle(Event::Cancelled);
        assert_eq!(engine.task(), Task::WaitChoose);
        assert_eq!(engine.data().table[0], vec![INVALID_PRICE, 20, 30]);

        // only the showman may step back
        assert!(engine.handle(from("alice", MessageKind::Move.text().arg(-1))).is_empty());

        let effects = engine.handle(from("host", MessageKind::Move.text().arg(-1)));
        assert_eq!(sent(&effects)[0].text(), "TOGGLE\n0\n0\n10");
        assert_eq!(engine.data().table[0], vec![10, 20, 30]);
        assert_eq!(engine.task(), Task::WaitChoose);

        engine.handle(from("alice", MessageKind::Choice.text().arg(0).arg(0)));
        assert_eq!(engine.task(), Task::WaitTry);
        assert_eq!(engine.data().current_price, 10);
    }

    #[test]
    fn test_toggle_last_cell_ends_round() {
        let (mut engine, _clock) = engine(two_cell_package(), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        assert_eq!(engine.task(), Task::WaitChoose);

        let effects = engine.handle(from("host", MessageKind::Toggle.text().arg(0).arg(0)));
        assert_eq!(sent(&effects)[0].text(), "TOGGLE\n0\n0\n-1");
        assert_eq!(engine.task(), Task::WaitChoose);

        let effects = engine.handle(from("host", MessageKind::Toggle.text().arg(0).arg(0)));
        assert_eq!(sent(&effects)[0].text(), "TOGGLE\n0\n0\n10");

        engine.handle(from("host", MessageKind::Toggle.text().arg(0).arg(0)));
        let effects = engine.handle(from("host", MessageKind::Toggle.text().arg(0).arg(1)));
        assert!(kinds(&effects).contains(&MessageKind::GoodLuck));
        assert!(engine.is_finished());
    }

    #[test]
    fn test_stake_auction_winner_answers_for_stake() {
        let question = Question::new(100, "Auction", &["yes"]).with_kind(QuestionType::Stake);
        let filler = Question::new(50, "Warmup", &["w"]);
        let package = Package::new(
            "Stakes",
            vec![Round::new("R", vec![Theme::new("T", vec![filler, question])])],
        );
        let (mut engine, _clock) = engine(package, 2);
        seat_all(&mut engine, &["alice", "bob"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));

        // alice earns 50 so she can bid
        engine.handle(from("alice", MessageKind::Choice.text().arg(0).arg(0)));
        engine.handle(from("alice", MessageKind::I.text()));
        engine.handle(from("alice", MessageKind::Answer.text().arg("w")));
        engine.handle(from("host", MessageKind::Validate.text().arg("w").arg("+")));
        assert_eq!(engine.task(), Task::WaitStake);
        assert_eq!(engine.data().auction.as_ref().and_then(|a| a.current), Some(0));

        // pass is illegal for the opener
        engine.handle(from("alice", MessageKind::Stake.text().arg(2)));
        assert_eq!(engine.task(), Task::WaitStake);

        let effects = engine.handle(from("alice", MessageKind::Stake.text().arg(0)));
        assert!(kinds(&effects).contains(&MessageKind::PersonStake));
        // bob has nothing to outbid 100 with and passes automatically
        assert_eq!(engine.task(), Task::WaitAnswer);
        assert_eq!(engine.data().answerer, Some(0));
        assert_eq!(engine.data().current_price, 100);

        engine.handle(from("alice", MessageKind::Answer.text().arg("no")));
        engine.handle(from("host", MessageKind::Validate.text().arg("no").arg("-")));
        assert_eq!(engine.data().players[0].sum, -50);
    }

    #[test]
    fn test_appellation_reverses_wrong_outcome() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        engine.handle(from("alice", MessageKind::Answer.text().arg("Paree")));
        engine.handle(from("host", MessageKind::Validate.text().arg("Paree").arg("-")));
        assert_eq!(engine.data().players[0].sum, -10);

        let effects = engine.handle(from("alice", MessageKind::Apellate.text()));
        let ask = sent(&effects)[0];
        assert_eq!(ask.receiver(), "host");
        assert_eq!(ask.text(), "ASKAPPELLATION\n0\nParee");

        let effects = engine.handle(from("host", MessageKind::Appellation.text().arg("+")));
        assert_eq!(engine.data().players[0].sum, 10);
        assert_eq!(kinds(&effects), vec![MessageKind::Person, MessageKind::Sums]);

        // a second appeal of the same answer is not possible
        assert!(engine.handle(from("alice", MessageKind::Apellate.text())).is_empty());
    }

    fn personal_pair() -> Package {
        let cells = vec![
            Question::new(10, "a", &["a"]).with_kind(QuestionType::Personal),
            Question::new(20, "b", &["b"]).with_kind(QuestionType::Personal),
        ];
        Package::new("Pair", vec![Round::new("R", vec![Theme::new("T", cells)])])
    }

    #[test]
    fn test_pending_appellation_dropped_when_showman_leaves() {
        let (mut engine, _clock) = engine(personal_pair(), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        engine.handle(from("alice", MessageKind::Choice.text().arg(0).arg(0)));
        engine.handle(from("alice", MessageKind::Answer.text().arg("z")));
        engine.handle(from("host", MessageKind::Validate.text().arg("z").arg("-")));
        // the last cell is played without asking
        assert_eq!(engine.task(), Task::WaitAnswer);

        assert!(!engine.handle(from("alice", MessageKind::Apellate.text())).is_empty());
        assert!(engine.data().appellation.is_some());

        engine.handle(Event::Message(Message::system(
            SERVER_NAME,
            EVERYBODY,
            MessageKind::Disconnect.text().arg("host"),
        )));
        assert!(engine.data().appellation.is_none());

        connect(&mut engine, GameRole::Showman, "host");
        let effects = engine.handle(from("alice", MessageKind::Apellate.text()));
        let ask = sent(&effects)[0];
        assert_eq!(ask.receiver(), "host");
        assert_eq!(ask.kind(), Some(MessageKind::AskAppellation));
    }

    #[test]
    fn test_sequential_round_plays_cells_in_order() {
        let mut package = two_cell_package();
        package.selection = SelectionMode::Sequential;
        let (mut engine, _clock) = engine(package, 1);
        seat_all(&mut engine, &["alice"]);

        let choice = |effects: &[Effect]| {
            sent(effects)
                .into_iter()
                .find(|m| m.kind() == Some(MessageKind::Choice))
                .map(|m| m.text().to_string())
        };

        let effects = engine.handle(Event::Start);
        let start = kinds(&effects);
        assert!(!start.contains(&MessageKind::First));
        assert!(!start.contains(&MessageKind::Choose));
        assert_subsequence(
            &start,
            &[MessageKind::Table, MessageKind::ShowTable, MessageKind::Choice, MessageKind::QType],
        );
        assert_eq!(choice(&effects).as_deref(), Some("CHOICE\n0\n0"));
        assert_eq!(engine.task(), Task::WaitTry);

        let effects = engine.handle(Event::Cancelled);
        assert_subsequence(&kinds(&effects), &[MessageKind::ShowTable, MessageKind::Choice]);
        assert_eq!(choice(&effects).as_deref(), Some("CHOICE\n0\n1"));
        assert_eq!(engine.task(), Task::WaitTry);

        engine.handle(Event::Cancelled);
        assert!(engine.is_finished());
    }

    #[test]
    fn test_secret_question_is_handed_to_another_player() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Secret), 2);
        seat_all(&mut engine, &["alice", "bob"]);
        engine.handle(Event::Start);
        let effects = engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        assert_eq!(engine.task(), Task::WaitCat);
        let ask = sent(&effects)
            .into_iter()
            .find(|m| m.kind() == Some(MessageKind::AskSelectPlayer))
            .unwrap();
        assert_eq!(ask.receiver(), "alice");
        assert_eq!(ask.args()[1], "cat");

        // only the chooser decides, and never for their own seat
        assert!(engine.handle(from("bob", MessageKind::SelectPlayer.text().arg(1))).is_empty());
        assert!(engine.handle(from("alice", MessageKind::SelectPlayer.text().arg(0))).is_empty());
        assert_eq!(engine.task(), Task::WaitCat);

        let effects = engine.handle(from("alice", MessageKind::SelectPlayer.text().arg(1)));
        assert_subsequence(&kinds(&effects), &[MessageKind::PlayerState, MessageKind::Content]);
        assert_eq!(engine.task(), Task::WaitAnswer);
        assert_eq!(engine.data().answerer, Some(1));

        engine.handle(from("bob", MessageKind::Answer.text().arg("Paris")));
        engine.handle(from("host", MessageKind::Validate.text().arg("Paris").arg("+")));
        assert_eq!(engine.data().players[1].sum, 10);
        assert_eq!(engine.data().players[0].sum, 0);
    }

    #[test]
    fn test_showman_skips_the_current_wait() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Personal), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        assert_eq!(engine.task(), Task::WaitAnswer);

        assert!(engine.handle(from("alice", MessageKind::Move.text().arg(1))).is_empty());
        assert_eq!(engine.task(), Task::WaitAnswer);

        engine.handle(from("host", MessageKind::Move.text().arg(1)));
        assert_eq!(engine.data().players[0].sum, -10);
        assert!(engine.is_finished());
    }

    #[test]
    fn test_choose_reports_round_progress() {
        let (mut engine, clock) = engine(two_cell_package(), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);

        clock.advance(engine.settings().round_time / 4);
        let effects = engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        let choose = sent(&effects)
            .into_iter()
            .find(|m| m.kind() == Some(MessageKind::Choose))
            .unwrap();
        let reported: f64 = choose.args()[1].parse().unwrap();
        assert_approx_eq!(reported, 25.0);
        assert_approx_eq!(engine.elapsed_percent(), 25.0, 1e-6);
    }

    #[test]
    fn test_round_time_limit_ends_round_at_selection() {
        let (mut engine, clock) = engine(two_cell_package(), 1);
        seat_all(&mut engine, &["alice"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        engine.handle(from("alice", MessageKind::Choice.text().arg(0).arg(0)));

        clock.advance(engine.settings().round_time + Duration::from_secs(1));
        let effects = engine.handle(Event::Cancelled);
        assert!(kinds(&effects).contains(&MessageKind::QuestionEnd));
        assert!(!kinds(&effects).contains(&MessageKind::ShowTable));
        assert!(engine.is_finished());
    }

    #[test]
    fn test_final_round_elimination_and_stakes() {
        let standard = Round::new("R", vec![Theme::new("T", vec![Question::new(100, "q", &["a"])])]);
        let last = Round::final_round(
            "F",
            vec![
                Theme::new("A", vec![Question::new(0, "fa", &["x"])]),
                Theme::new("B", vec![Question::new(0, "fb", &["y"])]),
            ],
        );
        let (mut engine, _clock) = engine(Package::new("Final", vec![standard, last]), 2);
        seat_all(&mut engine, &["alice", "bob"]);
        engine.handle(Event::Start);
        engine.handle(from("host", MessageKind::SelectPlayer.text().arg(0)));
        engine.handle(from("alice", MessageKind::I.text()));
        engine.handle(from("alice", MessageKind::Answer.text().arg("a")));
        let effects = engine.handle(from("host", MessageKind::Validate.text().arg("a").arg("+")));

        assert_eq!(engine.stage(), Stage::Final);
        assert_eq!(engine.data().finalists, vec![0]);
        assert_eq!(engine.task(), Task::WaitDelete);
        assert!(sent(&effects)
            .iter()
            .any(|m| m.kind() == Some(MessageKind::AskDelete) && m.receiver() == "alice"));

        let effects = engine.handle(from("alice", MessageKind::Delete.text().arg(0)));
        assert_subsequence(
            &kinds(&effects),
            &[MessageKind::Out, MessageKind::FinalTheme, MessageKind::AskFinalStake],
        );

        // more than the balance is rejected
        engine.handle(from("alice", MessageKind::FinalStake.text().arg(500)));
        assert_eq!(engine.task(), Task::WaitFinalStake);
        engine.handle(from("alice", MessageKind::FinalStake.text().arg(60)));
        assert_eq!(engine.task(), Task::WaitFinalAnswer);

        engine.handle(from("alice", MessageKind::Answer.text().arg("y")));
        assert_eq!(engine.task(), Task::WaitFinalRight);
        let effects = engine.handle(from("host", MessageKind::Validate.text().arg("y").arg("+")));
        assert_eq!(engine.data().players[0].sum, 160);
        assert!(kinds(&effects).contains(&MessageKind::Winner));
        assert!(engine.is_finished());
    }

    #[test]
    fn test_kick_and_ban_commands_from_showman_only() {
        let (mut engine, _clock) = engine(one_question(QuestionType::Simple), 1);
        seat_all(&mut engine, &["alice"]);

        assert!(engine
            .handle(from("alice", MessageKind::Kick.text().arg("host")))
            .is_empty());

        let effects = engine.handle(from("host", MessageKind::Ban.text().arg("alice")));
        assert!(matches!(&effects[0], Effect::Kick { name, ban: true } if name == "alice"));
        assert_eq!(sent(&effects)[0].text(), "REPLIC\ns\nalice was banned");

        let effects = engine.handle(from("host", MessageKind::Unban.text().arg("10.0.0.1")));
        assert!(matches!(&effects[..], [Effect::Unban { identity }] if identity == "10.0.0.1"));
    }

    #[test]
    fn test_auto_start_when_seats_filled() {
        let clock = Arc::new(FakeClock::new());
        let settings = GameSettings {
            players: 1,
            auto_start: true,
            ..GameSettings::default()
        };
        let mut engine = Engine::new(one_question(QuestionType::Simple), settings, clock);
        connect(&mut engine, GameRole::Player, "alice");
        assert_eq!(engine.task(), Task::Idle);

        connect(&mut engine, GameRole::Showman, "host");
        assert_eq!(engine.task(), Task::WaitFirst);
    }
}
