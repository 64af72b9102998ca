//! Logic of a person sitting at a console
//!
//! [`HumanLogic`] keeps the table view current and turns protocol traffic
//! into readable lines for a [`Presenter`]. Decisions come from the keyboard
//! through `commands`, never from here.

use log::debug;
use shared::message::int_arg;
use shared::{Logic, Message, MessageKind, Outbox, TableView, INVALID_PRICE};

/// Where readable game events end up
pub trait Presenter: Send + 'static {
    fn show(&mut self, line: &str);
}

/// Prints to standard output
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn show(&mut self, line: &str) {
        println!("{}", line);
    }
}

pub struct HumanLogic {
    view: TableView,
    presenter: Box<dyn Presenter>,
}

impl HumanLogic {
    pub fn new(name: &str, presenter: Box<dyn Presenter>) -> Self {
        Self {
            view: TableView::new(name),
            presenter,
        }
    }

    pub fn view(&self) -> &TableView {
        &self.view
    }

    fn player_name(&self, index: Option<usize>) -> String {
        match index {
            Some(i) if Some(i) == self.view.my_index => "you".to_string(),
            Some(i) => format!("player {}", i),
            None => "somebody".to_string(),
        }
    }

    fn table_lines(&self) -> Vec<String> {
        self.view
            .themes
            .iter()
            .zip(&self.view.prices)
            .enumerate()
            .map(|(t, (theme, prices))| {
                let cells: Vec<String> = prices
                    .iter()
                    .map(|p| if *p == INVALID_PRICE { "--".to_string() } else { p.to_string() })
                    .collect();
                format!("  {} {:<20} {}", t, theme, cells.join(" "))
            })
            .collect()
    }

    /// Readable form of a message, after the view has absorbed it
    fn describe(&self, message: &Message, kind: MessageKind) -> Vec<String> {
        let args = message.args();
        let arg = |i: usize| args.get(i).copied().unwrap_or_default();

        let line = match kind {
            MessageKind::Stage => format!("== {} ==", self.view.stage),
            MessageKind::Replic if arg(1) == "s" => format!("* {}", arg(2)),
            MessageKind::Replic => format!("<{}> {}", message.sender(), arg(2)),
            MessageKind::Connected if arg(2) == self.view.name => format!("You are seated as {}", arg(1)),
            MessageKind::Disconnect => format!("{} disconnected", arg(1)),
            MessageKind::Refuse => format!("Refused: {}", arg(1)),
            MessageKind::RoundThemes => format!("Themes: {}", self.view.themes.join(", ")),
            MessageKind::ShowTable => return self.table_lines(),
            MessageKind::Sums => format!("Scores: {:?} (yours {})", self.view.sums, self.view.my_score()),
            MessageKind::SetChooser => format!("{} choose(s) next", self.player_name(self.view.chooser)),
            MessageKind::Choose => "Your turn: choose <theme> <question>".to_string(),
            MessageKind::Choice => format!("Question for {}", self.view.current_price),
            MessageKind::QType if arg(1) != "simple" => format!("Special question: {}", arg(1)),
            MessageKind::Content => format!("Q: {}", self.view.question_text),
            MessageKind::Try => "Button is open: press".to_string(),
            MessageKind::EndTry => "Button closed".to_string(),
            MessageKind::Answer if message.receiver() == self.view.name => "Your answer: answer <text>".to_string(),
            MessageKind::AskValidate => {
                format!("{} answered {:?}; right: {:?}. validate +|-", arg(1), arg(2), self.view.right_answers)
            }
            MessageKind::Person => {
                let verdict = if arg(1) == "+" { "right" } else { "wrong" };
                format!("{} answered {}", self.player_name(int_arg(&args, 2)), verdict)
            }
            MessageKind::RightAnswer => format!("Right answer: {}", arg(2)),
            MessageKind::AskSelectPlayer => format!("Pick a player: select <seat> (allowed: {:?})", &args[2.min(args.len())..]),
            MessageKind::AskStake => format!("Your stake (min {}, max {}): stake nominal|pass|allin|<sum>", arg(2), arg(3)),
            MessageKind::PersonStake => format!("{} stakes {}", self.player_name(int_arg(&args, 1)), arg(3)),
            MessageKind::AskDelete => format!("Delete a theme: delete <theme> (left: {:?})", self.view.remaining_themes()),
            MessageKind::Out => format!("Theme {} removed", arg(1)),
            MessageKind::FinalTheme => format!("Final theme: {}", arg(1)),
            MessageKind::AskFinalStake => format!("Final stake up to {}: final <sum>", self.view.my_score()),
            MessageKind::AskAppellation => format!(
                "{} disputes the verdict on {:?}: appellation +|-",
                self.player_name(int_arg(&args, 1)),
                arg(2)
            ),
            MessageKind::Winner => format!("Winner: {}", self.player_name(int_arg(&args, 1))),
            MessageKind::GoodLuck => "Game over".to_string(),
            _ => return Vec::new(),
        };
        vec![line]
    }
}

impl Logic for HumanLogic {
    fn on_message(&mut self, message: &Message, out: &mut Outbox) {
        self.view.apply(message);
        let Some(kind) = message.kind() else {
            debug!("Unreadable message from {:?}", message.sender());
            return;
        };

        for line in self.describe(message, kind) {
            self.presenter.show(&line);
        }

        if kind == MessageKind::Refuse && message.receiver() == self.view.name {
            out.finish();
        }
    }
}
