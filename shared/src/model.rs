//! Read-only question package model
//!
//! A package is an ordered list of rounds, each round an ordered list of
//! themes, each theme an ordered list of questions. A question whose price is
//! [`INVALID_PRICE`] is not playable (already played or disabled).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

/// Price marking a question as unplayable
pub const INVALID_PRICE: i32 = -1;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("package has no rounds")]
    NoRounds,
    #[error("question {question} of theme {theme:?} has invalid price {price}")]
    InvalidPrice {
        theme: String,
        question: usize,
        price: i32,
    },
}

/// How cells of a standard round are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    /// The chooser (or showman) picks any playable cell
    #[default]
    ByPlayer,
    /// Cells are played in a fixed theme-major order
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RoundType {
    #[default]
    Standard,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    /// Players race for the button
    #[default]
    Simple,
    /// The chooser answers alone
    Personal,
    /// Auction among players, the winner answers for the stake
    Stake,
    /// The chooser hands the question to another player
    Secret,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Simple => "simple",
            QuestionType::Personal => "personal",
            QuestionType::Stake => "stake",
            QuestionType::Secret => "secret",
        }
    }
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub price: i32,
    #[serde(default, rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    #[serde(default)]
    pub right: Vec<String>,
    #[serde(default)]
    pub wrong: Vec<String>,
}

impl Question {
    pub fn new(price: i32, text: impl Into<String>, right: &[&str]) -> Self {
        Self {
            price,
            kind: QuestionType::Simple,
            text: text.into(),
            right: right.iter().map(|s| s.to_string()).collect(),
            wrong: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: QuestionType) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.price != INVALID_PRICE
    }

    /// Case-insensitive comparison against the right answers
    pub fn matches(&self, answer: &str) -> bool {
        let answer = answer.trim().to_lowercase();
        !answer.is_empty() && self.right.iter().any(|right| right.trim().to_lowercase() == answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub questions: Vec<Question>,
}

impl Theme {
    pub fn new(name: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            questions,
        }
    }

    pub fn has_valid_questions(&self) -> bool {
        self.questions.iter().any(Question::is_valid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: RoundType,
    pub themes: Vec<Theme>,
}

impl Round {
    pub fn new(name: impl Into<String>, themes: Vec<Theme>) -> Self {
        Self {
            name: name.into(),
            kind: RoundType::Standard,
            themes,
        }
    }

    pub fn final_round(name: impl Into<String>, themes: Vec<Theme>) -> Self {
        Self {
            name: name.into(),
            kind: RoundType::Final,
            themes,
        }
    }

    pub fn question(&self, theme: usize, question: usize) -> Option<&Question> {
        self.themes.get(theme)?.questions.get(question)
    }

    pub fn question_mut(&mut self, theme: usize, question: usize) -> Option<&mut Question> {
        self.themes.get_mut(theme)?.questions.get_mut(question)
    }

    /// Price of a cell, or `INVALID_PRICE` when the cell does not exist
    pub fn price(&self, theme: usize, question: usize) -> i32 {
        self.question(theme, question)
            .map_or(INVALID_PRICE, |q| q.price)
    }

    pub fn has_valid_questions(&self) -> bool {
        self.themes.iter().any(Theme::has_valid_questions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub selection: SelectionMode,
    pub rounds: Vec<Round>,
}

impl Package {
    pub fn new(name: impl Into<String>, rounds: Vec<Round>) -> Self {
        let name = name.into();
        Self {
            id: name.to_lowercase().replace(' ', "-"),
            name,
            selection: SelectionMode::ByPlayer,
            rounds,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PackageError> {
        let mut package: Package = serde_json::from_str(json)?;
        if package.id.is_empty() {
            package.id = package.name.to_lowercase().replace(' ', "-");
        }
        package.validate()?;
        Ok(package)
    }

    pub fn validate(&self) -> Result<(), PackageError> {
        if self.rounds.is_empty() {
            return Err(PackageError::NoRounds);
        }

        for theme in self.rounds.iter().flat_map(|round| &round.themes) {
            for (index, question) in theme.questions.iter().enumerate() {
                if question.price < INVALID_PRICE {
                    return Err(PackageError::InvalidPrice {
                        theme: theme.name.clone(),
                        question: index,
                        price: question.price,
                    });
                }
            }
        }
        Ok(())
    }

    /// Names of every theme in standard rounds, in package order
    pub fn game_themes(&self) -> Vec<&str> {
        self.rounds
            .iter()
            .filter(|round| round.kind == RoundType::Standard)
            .flat_map(|round| round.themes.iter().map(|theme| theme.name.as_str()))
            .collect()
    }

    /// Small package used when the host supplies none
    pub fn demo() -> Self {
        let first = Round::new(
            "First round",
            vec![
                Theme::new(
                    "Rivers",
                    vec![
                        Question::new(100, "Longest river in Europe", &["Volga"]),
                        Question::new(200, "River flowing through Vienna", &["Danube"])
                            .with_kind(QuestionType::Stake),
                    ],
                ),
                Theme::new(
                    "Metals",
                    vec![
                        Question::new(100, "Chemical symbol Fe", &["Iron"]),
                        Question::new(200, "Liquid metal at room temperature", &["Mercury"])
                            .with_kind(QuestionType::Secret),
                    ],
                ),
            ],
        );
        let last = Round::final_round(
            "Final",
            vec![
                Theme::new("Painters", vec![Question::new(0, "Painted the Night Watch", &["Rembrandt"])]),
                Theme::new("Composers", vec![Question::new(0, "Wrote the Goldberg Variations", &["Bach"])]),
            ],
        );
        Package::new("Demo", vec![first, last])
    }
}
