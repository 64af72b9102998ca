use crate::game::engine::EngineError;
use shared::Message;
use std::fmt::{self, Display};
use std::time::Duration;

/// Step of the game flow
///
/// `Ask*` steps emit a request and arm the timer; the matching `Wait*` step
/// blocks until a satisfying response or the timer. Everything else runs
/// straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Waiting for the start command
    Idle,
    StartGame,
    Round,
    RoundThemes,
    AskFirst,
    WaitFirst,
    AskToSelectQuestion,
    WaitChoose,
    QuestionSelected,
    QuestionType,
    AskCat,
    WaitCat,
    AskStake,
    WaitStake,
    PrintAuctionWinner,
    QuestionContent,
    AskToTry,
    WaitTry,
    AskAnswer,
    WaitAnswer,
    AskRight,
    WaitRight,
    RightAnswer,
    QuestionEnd,
    AskDelete,
    WaitDelete,
    AnnounceFinalTheme,
    AskFinalStake,
    WaitFinalStake,
    FinalQuestion,
    AskFinalAnswer,
    WaitFinalAnswer,
    AskFinalRight,
    WaitFinalRight,
    EndRound,
    EndGame,
    Winner,
    GoodLuck,
    Finished,
}

impl Task {
    pub fn is_wait(&self) -> bool {
        matches!(
            self,
            Task::WaitFirst
                | Task::WaitChoose
                | Task::WaitCat
                | Task::WaitStake
                | Task::WaitTry
                | Task::WaitAnswer
                | Task::WaitRight
                | Task::WaitDelete
                | Task::WaitFinalStake
                | Task::WaitFinalAnswer
                | Task::WaitFinalRight
        )
    }

    /// Runs without external input
    pub fn is_runnable(&self) -> bool {
        !self.is_wait() && !matches!(self, Task::Idle | Task::Finished)
    }

    /// Part of the terminal EndGame -> Winner -> GoodLuck path
    pub fn is_terminal(&self) -> bool {
        matches!(self, Task::EndGame | Task::Winner | Task::GoodLuck | Task::Finished)
    }
}

impl Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Input to the engine
#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Message(Message),
    /// The timer armed with this generation fired
    Timeout { generation: u64 },
    /// The current wait is abandoned; same as nobody responding
    Cancelled,
}

/// Output of the engine, applied in order by the driver
#[derive(Debug)]
pub enum Effect {
    Send(Message),
    ArmTimer { generation: u64, after: Duration },
    DisarmTimer,
    Kick { name: String, ban: bool },
    Unban { identity: String },
    Fault(EngineError),
    Finished,
}
