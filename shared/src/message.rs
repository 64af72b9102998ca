//! Message envelope and protocol keywords
//!
//! Every piece of traffic between clients, nodes and the game engine is a
//! [`Message`]: who sent it, who should receive it, and a text payload made of
//! tokens joined by [`ARGS_SEPARATOR`]. The first token names the message kind.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// Reserved token separator inside message text
pub const ARGS_SEPARATOR: char = '\n';

/// Receiver name addressing the authoritative game engine
pub const GAME_NAME: &str = "@";

/// Receiver name addressing everybody except the sender
pub const EVERYBODY: &str = "*";

/// Sender name used by the node itself
pub const SERVER_NAME: &str = "";

/// Immutable transport unit routed by nodes
///
/// Fields are private so a message cannot change after it is built; routing
/// code only ever clones or forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    sender: String,
    receiver: String,
    text: String,
    is_system: bool,
}

impl Message {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            text: text.into(),
            is_system: false,
        }
    }

    /// System messages bypass normal game-state handling (Disconnect, Refuse)
    pub fn system(sender: impl Into<String>, receiver: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            text: text.into(),
            is_system: true,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver == EVERYBODY
    }

    /// Splits the text into its tokens; the first one is the keyword
    pub fn args(&self) -> Vec<&str> {
        self.text.split(ARGS_SEPARATOR).collect()
    }

    /// Parsed keyword, or `None` for unknown or empty text
    pub fn kind(&self) -> Option<MessageKind> {
        self.text
            .split(ARGS_SEPARATOR)
            .next()
            .and_then(|keyword| keyword.parse().ok())
    }

    /// Copy of this message with a different receiver
    pub fn readdressed(&self, receiver: impl Into<String>) -> Self {
        Self {
            receiver: receiver.into(),
            ..self.clone()
        }
    }
}

macro_rules! message_kinds {
    ($($variant:ident => $keyword:literal),+ $(,)?) => {
        /// First token of every protocol message
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageKind {
            $($variant),+
        }

        impl MessageKind {
            pub const ALL: &'static [MessageKind] = &[$(MessageKind::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(MessageKind::$variant => $keyword),+
                }
            }
        }

        impl FromStr for MessageKind {
            type Err = UnknownKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($keyword => Ok(MessageKind::$variant),)+
                    other => Err(UnknownKind(other.to_string())),
                }
            }
        }
    };
}

message_kinds! {
    Stage => "STAGE",
    PackageId => "PACKAGEID",
    RoundsNames => "ROUNDSNAMES",
    Package => "PACKAGE",
    GameThemes => "GAMETHEMES",
    Sums => "SUMS",
    RoundThemes => "ROUNDTHEMES",
    RoundThemes2 => "ROUNDTHEMES2",
    Table => "TABLE",
    First => "FIRST",
    AskSelectPlayer => "ASKSELECTPLAYER",
    SelectPlayer => "SELECTPLAYER",
    SetChooser => "SETCHOOSER",
    ShowTable => "SHOWTABLO",
    Choose => "CHOOSE",
    Choice => "CHOICE",
    QType => "QTYPE",
    Content => "CONTENT",
    QuestionAnswers => "QUESTION_ANSWERS",
    Try => "TRY",
    I => "I",
    EndTry => "ENDTRY",
    Answer => "ANSWER",
    PersonFinalAnswer => "PERSONFINALANSWER",
    AskValidate => "ASK_VALIDATE",
    Validate => "VALIDATE",
    Cancel => "CANCEL",
    Person => "PERSON",
    RightAnswer => "RIGHTANSWER",
    QuestionEnd => "QUESTION_END",
    AskStake => "ASKSTAKE",
    Stake => "STAKE",
    PersonStake => "PERSONSTAKE",
    AskDelete => "ASKDELETE",
    Delete => "DELETE",
    Out => "OUT",
    FinalTheme => "FINALTHEME",
    AskFinalStake => "ASKFINALSTAKE",
    FinalStake => "FINALSTAKE",
    Winner => "WINNER",
    GoodLuck => "GOODLUCK",
    Connect => "CONNECT",
    Connected => "CONNECTED",
    Disconnect => "DISCONNECT",
    Refuse => "REFUSE",
    Replic => "REPLIC",
    Timer => "TIMER",
    PlayerState => "PLAYERSTATE",
    Toggle => "TOGGLE",
    Move => "MOVE",
    Kick => "KICK",
    Ban => "BAN",
    Unban => "UNBAN",
    Start => "START",
    Apellate => "APELLATE",
    AskAppellation => "ASKAPPELLATION",
    Appellation => "APPELLATION",
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message keyword {0:?}")]
pub struct UnknownKind(pub String);

/// Builds message text token by token
///
/// Arguments are sanitized so they can never smuggle the separator into the
/// token list.
#[derive(Debug, Clone)]
pub struct TextBuilder {
    text: String,
}

impl MessageKind {
    pub fn text(self) -> TextBuilder {
        TextBuilder {
            text: self.as_str().to_string(),
        }
    }
}

impl TextBuilder {
    pub fn arg(mut self, value: impl Display) -> Self {
        self.text.push(ARGS_SEPARATOR);
        let value = value.to_string();
        if value.contains(ARGS_SEPARATOR) {
            self.text.push_str(&value.replace(ARGS_SEPARATOR, " "));
        } else {
            self.text.push_str(&value);
        }
        self
    }

    pub fn args<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        values.into_iter().fold(self, |builder, value| builder.arg(value))
    }

    pub fn build(self) -> String {
        self.text
    }
}

impl From<TextBuilder> for String {
    fn from(builder: TextBuilder) -> Self {
        builder.build()
    }
}

/// Parses the token at `index` as an integer
pub fn int_arg<T: FromStr>(args: &[&str], index: usize) -> Option<T> {
    args.get(index).and_then(|token| token.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_joins_with_separator() {
        let text = MessageKind::Person.text().arg("+").arg(0).arg(10).build();
        assert_eq!(text, "PERSON\n+\n0\n10");
    }

    #[test]
    fn test_builder_sanitizes_separator() {
        let text = MessageKind::Answer.text().arg("two\nlines").build();
        assert_eq!(text, "ANSWER\ntwo lines");
    }

    #[test]
    fn test_message_kind_parsing() {
        let message = Message::new("alice", GAME_NAME, MessageKind::I.text());
        assert_eq!(message.kind(), Some(MessageKind::I));
        assert_eq!(message.args(), vec!["I"]);

        let garbage = Message::new("alice", GAME_NAME, "NOT_A_KEYWORD\n1");
        assert_eq!(garbage.kind(), None);
    }

    #[test]
    fn test_every_keyword_roundtrips() {
        for kind in MessageKind::ALL {
            assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(*kind));
        }
    }

    #[test]
    fn test_system_flag_and_readdress() {
        let message = Message::system(SERVER_NAME, EVERYBODY, MessageKind::Disconnect.text().arg("bob"));
        assert!(message.is_system());
        assert!(message.is_broadcast());

        let direct = message.readdressed("carol");
        assert_eq!(direct.receiver(), "carol");
        assert!(direct.is_system());
        assert_eq!(direct.text(), message.text());
    }

    #[test]
    fn test_int_arg() {
        let args = vec!["CHOICE", "1", " 2 ", "x"];
        assert_eq!(int_arg::<usize>(&args, 1), Some(1));
        assert_eq!(int_arg::<usize>(&args, 2), Some(2));
        assert_eq!(int_arg::<usize>(&args, 3), None);
        assert_eq!(int_arg::<usize>(&args, 9), None);
    }
}
