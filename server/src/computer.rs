//! Computer-controlled persons
//!
//! A [`ComputerLogic`] keeps a [`TableView`] up to date from the protocol and
//! asks its [`Heuristic`] whenever the game requests a decision from it. A
//! computer showman judges answers against the right answers it is shown.

use crate::game::data::StakeKind;
use crate::game::engine::BOT_MARKER;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::message::int_arg;
use shared::{Actor, ActorHandle, GameRole, Logic, Message, MessageKind, Node, NodeError, Outbox, Package, Sex, TableView, GAME_NAME};
use std::sync::Arc;

/// Bounds of a stake the game is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeRequest {
    /// No stake exists yet, so a nominal stake is allowed and passing is not
    pub opening: bool,
    pub minimum: i32,
    pub maximum: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeDecision {
    Nominal,
    Sum(i32),
    Pass,
    AllIn,
}

impl StakeDecision {
    fn text(&self) -> String {
        let kind = match self {
            StakeDecision::Nominal => StakeKind::Nominal,
            StakeDecision::Sum(_) => StakeKind::Sum,
            StakeDecision::Pass => StakeKind::Pass,
            StakeDecision::AllIn => StakeKind::AllIn,
        };
        let text = MessageKind::Stake.text().arg(kind.code());
        match self {
            StakeDecision::Sum(sum) => text.arg(sum).build(),
            _ => text.build(),
        }
    }
}

/// Decisions of a computer player
///
/// Every method sees the table as the player knows it: prices, scores and
/// the elapsed share of the round are all in the view.
pub trait Heuristic: Send + 'static {
    fn choose_question(&mut self, view: &TableView) -> Option<(usize, usize)>;
    fn press_button(&mut self, view: &TableView) -> bool;
    fn answer(&mut self, view: &TableView) -> String;
    fn stake(&mut self, view: &TableView, request: &StakeRequest) -> StakeDecision;
    fn delete_theme(&mut self, view: &TableView) -> Option<usize>;
    fn final_stake(&mut self, view: &TableView, maximum: i32) -> i32;
    fn select_player(&mut self, view: &TableView, eligible: &[usize]) -> Option<usize>;
}

/// Plays reasonably with a fixed chance of knowing an answer
pub struct SimpleHeuristic {
    rng: StdRng,
    /// Probability of pressing the button and of answering right
    skill: f64,
    knowledge: Option<Arc<Package>>,
}

impl SimpleHeuristic {
    pub fn new(seed: u64, skill: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            skill: skill.clamp(0.0, 1.0),
            knowledge: None,
        }
    }

    /// Lets the bot look up right answers in the package being played
    pub fn with_knowledge(mut self, package: Arc<Package>) -> Self {
        self.knowledge = Some(package);
        self
    }

    fn known_answer(&self, text: &str) -> Option<String> {
        let package = self.knowledge.as_ref()?;
        package
            .rounds
            .iter()
            .flat_map(|r| &r.themes)
            .flat_map(|t| &t.questions)
            .find(|q| q.text == text)
            .and_then(|q| q.right.first().cloned())
    }

    fn behind(view: &TableView) -> bool {
        view.opponent_scores()
            .into_iter()
            .max()
            .is_some_and(|best| best > view.my_score())
    }
}

impl Heuristic for SimpleHeuristic {
    fn choose_question(&mut self, view: &TableView) -> Option<(usize, usize)> {
        let playable = view.playable();
        let price = |&(t, q): &(usize, usize)| view.prices[t][q];

        // Late in the round a trailing player goes for the expensive cells
        if view.elapsed_percent > 60.0 && Self::behind(view) {
            playable.into_iter().max_by_key(price)
        } else {
            playable.into_iter().min_by_key(price)
        }
    }

    fn press_button(&mut self, _view: &TableView) -> bool {
        self.rng.gen_bool(self.skill)
    }

    fn answer(&mut self, view: &TableView) -> String {
        match self.known_answer(&view.question_text) {
            Some(right) if self.rng.gen_bool(self.skill) => right,
            _ => String::new(),
        }
    }

    fn stake(&mut self, view: &TableView, request: &StakeRequest) -> StakeDecision {
        if request.opening {
            return StakeDecision::Nominal;
        }
        if request.maximum < request.minimum {
            return StakeDecision::Pass;
        }
        if Self::behind(view) && self.rng.gen_bool(self.skill / 2.0) {
            return StakeDecision::AllIn;
        }
        if self.rng.gen_bool(self.skill / 2.0) {
            StakeDecision::Sum(request.minimum)
        } else {
            StakeDecision::Pass
        }
    }

    fn delete_theme(&mut self, view: &TableView) -> Option<usize> {
        view.remaining_themes().choose(&mut self.rng).copied()
    }

    fn final_stake(&mut self, view: &TableView, maximum: i32) -> i32 {
        let best_opponent = view.opponent_scores().into_iter().max().unwrap_or(0);
        let stake = if view.my_score() > 2 * best_opponent {
            1
        } else {
            maximum / 2
        };
        stake.clamp(1, maximum.max(1))
    }

    fn select_player(&mut self, _view: &TableView, eligible: &[usize]) -> Option<usize> {
        eligible.choose(&mut self.rng).copied()
    }
}

pub struct ComputerLogic {
    role: GameRole,
    view: TableView,
    heuristic: Box<dyn Heuristic>,
}

impl ComputerLogic {
    pub fn new(name: &str, role: GameRole, heuristic: Box<dyn Heuristic>) -> Self {
        Self {
            role,
            view: TableView::new(name),
            heuristic,
        }
    }

    pub fn view(&self) -> &TableView {
        &self.view
    }

    fn as_player(&mut self, kind: MessageKind, args: &[&str], out: &mut Outbox) {
        match kind {
            MessageKind::Choose => {
                if let Some((theme, question)) = self.heuristic.choose_question(&self.view) {
                    out.to_game(MessageKind::Choice.text().arg(theme).arg(question));
                }
            }
            MessageKind::Try => {
                if self.heuristic.press_button(&self.view) {
                    out.to_game(MessageKind::I.text());
                }
            }
            MessageKind::Answer => {
                let answer = self.heuristic.answer(&self.view);
                out.to_game(MessageKind::Answer.text().arg(answer));
            }
            MessageKind::AskStake => {
                let request = StakeRequest {
                    opening: args.get(1) == Some(&"+"),
                    minimum: int_arg(args, 2).unwrap_or(0),
                    maximum: int_arg(args, 3).unwrap_or(0),
                };
                let decision = self.heuristic.stake(&self.view, &request);
                out.to_game(decision.text());
            }
            MessageKind::AskSelectPlayer => {
                let eligible = eligible_players(args);
                if let Some(player) = self.heuristic.select_player(&self.view, &eligible) {
                    out.to_game(MessageKind::SelectPlayer.text().arg(player));
                }
            }
            MessageKind::AskDelete => {
                if let Some(theme) = self.heuristic.delete_theme(&self.view) {
                    out.to_game(MessageKind::Delete.text().arg(theme));
                }
            }
            MessageKind::AskFinalStake => {
                let maximum = int_arg(args, 1).unwrap_or(1);
                let stake = self.heuristic.final_stake(&self.view, maximum);
                out.to_game(MessageKind::FinalStake.text().arg(stake));
            }
            _ => {}
        }
    }

    fn as_showman(&mut self, kind: MessageKind, args: &[&str], out: &mut Outbox) {
        match kind {
            MessageKind::AskSelectPlayer => {
                // The lowest score picks first
                let eligible = eligible_players(args);
                let chooser = eligible
                    .iter()
                    .copied()
                    .min_by_key(|p| (self.view.sums.get(*p).copied().unwrap_or(0), *p));
                if let Some(player) = chooser {
                    out.to_game(MessageKind::SelectPlayer.text().arg(player));
                }
            }
            MessageKind::AskValidate => {
                let answer = args.get(2).copied().unwrap_or_default();
                let normalized = answer.trim().to_lowercase();
                let right = !normalized.is_empty()
                    && self
                        .view
                        .right_answers
                        .iter()
                        .any(|r| r.trim().to_lowercase() == normalized);
                out.to_game(
                    MessageKind::Validate
                        .text()
                        .arg(answer)
                        .arg(if right { "+" } else { "-" }),
                );
            }
            MessageKind::AskAppellation => {
                out.to_game(MessageKind::Appellation.text().arg("-"));
            }
            _ => {}
        }
    }
}

impl Logic for ComputerLogic {
    fn on_message(&mut self, message: &Message, out: &mut Outbox) {
        self.view.apply(message);
        let Some(kind) = message.kind() else {
            return;
        };

        if message.is_system() {
            if kind == MessageKind::Refuse && message.receiver() == self.view.name {
                info!("Computer {:?} was refused", self.view.name);
                out.finish();
            }
            return;
        }

        let args = message.args();
        match self.role {
            GameRole::Player => self.as_player(kind, &args, out),
            GameRole::Showman => self.as_showman(kind, &args, out),
            GameRole::Viewer => {}
        }
    }

    fn on_disposed(&mut self) {
        debug!("Computer {:?} disposed", self.view.name);
    }
}

/// Seats flagged "+" in an AskSelectPlayer request
fn eligible_players(args: &[&str]) -> Vec<usize> {
    args.iter()
        .skip(2)
        .enumerate()
        .filter(|(_, flag)| **flag == "+")
        .map(|(index, _)| index)
        .collect()
}

/// Adds a computer person to the node and asks the game for a seat
pub async fn spawn_computer(
    node: &Arc<Node>,
    name: &str,
    role: GameRole,
    sex: Sex,
    heuristic: Box<dyn Heuristic>,
) -> Result<ActorHandle, NodeError> {
    let client = node.add_client(name).await?;
    let handle = Actor::spawn(client, ComputerLogic::new(name, role, heuristic));
    let connect = MessageKind::Connect
        .text()
        .arg(role)
        .arg(name)
        .arg(sex)
        .arg(BOT_MARKER);
    handle.send(GAME_NAME, connect).await;
    info!("Computer {} {:?} spawned", role, name);
    Ok(handle)
}
