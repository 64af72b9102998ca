//! Client-side picture of the game rebuilt from broadcast protocol messages
//!
//! Actors never see the engine's state directly; they keep a [`TableView`]
//! up to date from the messages they receive and decide from it.

use crate::message::{int_arg, Message, MessageKind};
use crate::model::INVALID_PRICE;
use crate::roles::GameRole;

/// Separator between prices of one theme inside a `TABLE` token
pub const PRICE_SEPARATOR: char = ',';

#[derive(Debug, Clone, Default)]
pub struct TableView {
    pub name: String,
    pub role: Option<GameRole>,
    pub my_index: Option<usize>,
    pub stage: String,
    pub themes: Vec<String>,
    pub prices: Vec<Vec<i32>>,
    pub sums: Vec<i32>,
    pub chooser: Option<usize>,
    pub current: Option<(usize, usize)>,
    pub current_price: i32,
    pub question_text: String,
    pub right_answers: Vec<String>,
    pub deleted_themes: Vec<usize>,
    pub elapsed_percent: f32,
}

impl TableView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Folds one message into the view
    pub fn apply(&mut self, message: &Message) {
        let args = message.args();
        let Some(kind) = message.kind() else {
            return;
        };

        match kind {
            MessageKind::Stage => {
                self.stage = args.get(1).map(|s| s.to_string()).unwrap_or_default();
            }
            MessageKind::Connected => {
                if args.get(2) == Some(&self.name.as_str()) {
                    self.role = args.get(1).and_then(|r| r.parse().ok());
                    self.my_index = int_arg(&args, 4);
                }
            }
            MessageKind::RoundThemes => {
                self.themes = args.iter().skip(2).map(|s| s.to_string()).collect();
                self.deleted_themes.clear();
            }
            MessageKind::Table => {
                self.prices = args.iter().skip(1).map(|token| parse_prices(token)).collect();
            }
            MessageKind::Sums => {
                self.sums = args.iter().skip(1).filter_map(|s| s.parse().ok()).collect();
            }
            MessageKind::SetChooser => {
                self.chooser = int_arg(&args, 1);
            }
            MessageKind::Choose => {
                self.elapsed_percent = int_arg::<f32>(&args, 1).unwrap_or(0.0);
            }
            MessageKind::Choice => {
                if let (Some(theme), Some(question)) = (int_arg::<usize>(&args, 1), int_arg::<usize>(&args, 2)) {
                    self.current = Some((theme, question));
                    if let Some(price) = self.prices.get_mut(theme).and_then(|p| p.get_mut(question)) {
                        self.current_price = *price;
                        *price = INVALID_PRICE;
                    }
                    self.right_answers.clear();
                }
            }
            MessageKind::Toggle => {
                if let (Some(theme), Some(question), Some(price)) = (
                    int_arg::<usize>(&args, 1),
                    int_arg::<usize>(&args, 2),
                    int_arg::<i32>(&args, 3),
                ) {
                    if let Some(cell) = self.prices.get_mut(theme).and_then(|p| p.get_mut(question)) {
                        *cell = price;
                    }
                }
            }
            MessageKind::Content => {
                self.question_text = args.get(3).map(|s| s.to_string()).unwrap_or_default();
            }
            MessageKind::QuestionAnswers => {
                let count: usize = int_arg(&args, 1).unwrap_or(0);
                self.right_answers = args.iter().skip(2).take(count).map(|s| s.to_string()).collect();
            }
            MessageKind::Out => {
                if let Some(theme) = int_arg(&args, 1) {
                    self.deleted_themes.push(theme);
                }
            }
            _ => {}
        }
    }

    /// Cells with a valid price, theme-major
    pub fn playable(&self) -> Vec<(usize, usize)> {
        self.prices
            .iter()
            .enumerate()
            .flat_map(|(t, prices)| {
                prices
                    .iter()
                    .enumerate()
                    .filter(|(_, price)| **price != INVALID_PRICE)
                    .map(move |(q, _)| (t, q))
            })
            .collect()
    }

    /// Themes not yet deleted in the final round
    pub fn remaining_themes(&self) -> Vec<usize> {
        (0..self.themes.len())
            .filter(|t| !self.deleted_themes.contains(t) && !self.themes[*t].is_empty())
            .collect()
    }

    pub fn my_score(&self) -> i32 {
        self.my_index
            .and_then(|i| self.sums.get(i).copied())
            .unwrap_or(0)
    }

    pub fn opponent_scores(&self) -> Vec<i32> {
        self.sums
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.my_index)
            .map(|(_, s)| *s)
            .collect()
    }
}

/// Renders one theme's prices as a `TABLE` token
pub fn format_prices(prices: &[i32]) -> String {
    prices
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(&PRICE_SEPARATOR.to_string())
}

pub fn parse_prices(token: &str) -> Vec<i32> {
    token
        .split(PRICE_SEPARATOR)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EVERYBODY, GAME_NAME};
    use assert_approx_eq::assert_approx_eq;

    fn game(text: impl Into<String>) -> Message {
        Message::new(GAME_NAME, EVERYBODY, text)
    }

    #[test]
    fn test_view_tracks_table_and_scores() {
        let mut view = TableView::new("alice");
        view.apply(&game(MessageKind::Connected.text().arg("player").arg("alice").arg("f").arg(1)));
        view.apply(&game(MessageKind::RoundThemes.text().arg("plain").arg("Rivers").arg("Metals")));
        view.apply(&game(MessageKind::Table.text().arg("100,200").arg("100,-1")));
        view.apply(&game(MessageKind::Sums.text().arg(50).arg(-100)));

        assert_eq!(view.my_index, Some(1));
        assert_eq!(view.role, Some(GameRole::Player));
        assert_eq!(view.playable(), vec![(0, 0), (0, 1), (1, 0)]);
        assert_eq!(view.my_score(), -100);
        assert_eq!(view.opponent_scores(), vec![50]);

        view.apply(&game(MessageKind::Choice.text().arg(0).arg(1)));
        assert_eq!(view.current, Some((0, 1)));
        assert_eq!(view.current_price, 200);
        assert_eq!(view.playable(), vec![(0, 0), (1, 0)]);

        view.apply(&game(MessageKind::Toggle.text().arg(0).arg(1).arg(200)));
        assert_eq!(view.playable().len(), 3);
    }

    #[test]
    fn test_view_final_themes() {
        let mut view = TableView::new("bob");
        view.apply(&game(MessageKind::RoundThemes.text().arg("final").arg("A").arg("B").arg("C")));
        view.apply(&game(MessageKind::Out.text().arg(1)));
        assert_eq!(view.remaining_themes(), vec![0, 2]);
    }

    #[test]
    fn test_choose_carries_elapsed_share() {
        let mut view = TableView::new("alice");
        view.apply(&game(MessageKind::Choose.text().arg("37.5")));
        assert_approx_eq!(view.elapsed_percent, 37.5_f32);

        view.apply(&game(MessageKind::Choose.text().arg("garbage")));
        assert_approx_eq!(view.elapsed_percent, 0.0_f32);
    }

    #[test]
    fn test_price_tokens() {
        assert_eq!(format_prices(&[10, -1, 30]), "10,-1,30");
        assert_eq!(parse_prices("10,-1,30"), vec![10, -1, 30]);
        assert!(parse_prices("").is_empty());
    }
}
