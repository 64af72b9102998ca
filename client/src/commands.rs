//! Console commands typed by a human person

use shared::{MessageKind, EVERYBODY, GAME_NAME};
use thiserror::Error;

/// Stake codes understood by the game
const STAKE_NOMINAL: u8 = 0;
const STAKE_SUM: u8 = 1;
const STAKE_PASS: u8 = 2;
const STAKE_ALL_IN: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}, type \"help\" for the list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// One message ready to be sent on behalf of the local person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub receiver: String,
    pub text: String,
}

impl Outgoing {
    fn to_game(text: impl Into<String>) -> Self {
        Self {
            receiver: GAME_NAME.to_string(),
            text: text.into(),
        }
    }
}

pub const HELP: &str = "\
choose <theme> <question>   pick a cell
press                       press the button
answer <text>               answer the current question
validate +|-                judge an answer (showman)
select <seat>               pick a player
stake nominal|pass|allin    make a stake
stake <sum>                 stake a sum
delete <theme>              remove a final theme
final <sum>                 final round stake
say <text>                  chat with everybody
appeal                      dispute the last verdict
appellation +|-             accept or reject an appeal (showman)
start|back|skip             game control (showman)
toggle <theme> <question>   remove or restore a cell (showman)
kick|ban <name>             remove a person (showman)
unban <identity>            lift a ban (showman)
quit                        leave the game";

fn number<T: std::str::FromStr>(token: Option<&str>, usage: &'static str) -> Result<T, CommandError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or(CommandError::Usage(usage))
}

/// Parses one console line; `Ok(None)` for blank lines
pub fn parse_command(line: &str) -> Result<Option<Outgoing>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let word = word.to_lowercase();
    let mut tokens = rest.split_whitespace();

    let text = match word.as_str() {
        "choose" => {
            let theme: usize = number(tokens.next(), "choose <theme> <question>")?;
            let question: usize = number(tokens.next(), "choose <theme> <question>")?;
            MessageKind::Choice.text().arg(theme).arg(question).build()
        }
        "press" => MessageKind::I.text().build(),
        "answer" => MessageKind::Answer.text().arg(rest).build(),
        "validate" => match rest {
            "+" | "-" => MessageKind::Validate.text().arg("").arg(rest).build(),
            _ => return Err(CommandError::Usage("validate +|-")),
        },
        "select" => {
            let seat: usize = number(tokens.next(), "select <seat>")?;
            MessageKind::SelectPlayer.text().arg(seat).build()
        }
        "stake" => {
            let builder = MessageKind::Stake.text();
            match rest {
                "nominal" => builder.arg(STAKE_NOMINAL).build(),
                "pass" => builder.arg(STAKE_PASS).build(),
                "allin" => builder.arg(STAKE_ALL_IN).build(),
                sum => {
                    let sum: i32 = number(Some(sum), "stake nominal|pass|allin|<sum>")?;
                    builder.arg(STAKE_SUM).arg(sum).build()
                }
            }
        }
        "delete" => {
            let theme: usize = number(tokens.next(), "delete <theme>")?;
            MessageKind::Delete.text().arg(theme).build()
        }
        "final" => {
            let sum: i32 = number(tokens.next(), "final <sum>")?;
            MessageKind::FinalStake.text().arg(sum).build()
        }
        "say" => {
            if rest.is_empty() {
                return Err(CommandError::Usage("say <text>"));
            }
            return Ok(Some(Outgoing {
                receiver: EVERYBODY.to_string(),
                text: MessageKind::Replic.text().arg("p").arg(rest).build(),
            }));
        }
        "appeal" => MessageKind::Apellate.text().build(),
        "appellation" => match rest {
            "+" | "-" => MessageKind::Appellation.text().arg(rest).build(),
            _ => return Err(CommandError::Usage("appellation +|-")),
        },
        "start" => MessageKind::Start.text().build(),
        "back" => MessageKind::Move.text().arg(-1).build(),
        "skip" => MessageKind::Move.text().arg(1).build(),
        "toggle" => {
            let theme: usize = number(tokens.next(), "toggle <theme> <question>")?;
            let question: usize = number(tokens.next(), "toggle <theme> <question>")?;
            MessageKind::Toggle.text().arg(theme).arg(question).build()
        }
        "kick" | "ban" | "unban" => {
            if rest.is_empty() {
                return Err(CommandError::Usage("kick|ban <name>, unban <identity>"));
            }
            let kind = match word.as_str() {
                "kick" => MessageKind::Kick,
                "ban" => MessageKind::Ban,
                _ => MessageKind::Unban,
            };
            kind.text().arg(rest).build()
        }
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(Outgoing::to_game(text)))
}
