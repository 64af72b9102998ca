//! Error types for the network layer and the join handshake

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Reasons a join handshake is refused before a client is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum JoinError {
    #[error("access to the game is forbidden")]
    Forbidden,
    #[error("name {0:?} is already taken")]
    DuplicateName(String),
    #[error("role {0:?} is not valid")]
    InvalidRole(String),
    #[error("wrong password")]
    WrongPassword,
    #[error("name must not be empty")]
    EmptyName,
    #[error("only the primary node accepts joins")]
    NotPrimary,
    #[error("no free place for this role")]
    NoFreePlace,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("client {0:?} is already registered")]
    DuplicateName(String),
    #[error("client {0:?} not found")]
    UnknownClient(String),
    #[error("operation requires the primary node")]
    NotPrimary,
    #[error("connection {0} is closed")]
    ConnectionClosed(u32),
    #[error("no upstream connection")]
    NoUpstream,
    #[error("delivery to {0:?} failed: inbox closed")]
    InboxClosed(String),
    #[error("actor task failed: {0}")]
    Actor(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("join refused: {0}")]
    Refused(JoinError),
    #[error("game fault: {0}")]
    Game(String),
}

/// Failures while reading or writing length-delimited packets
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds the limit")]
    TooLarge(usize),
    #[error("payload could not be decoded: {0}")]
    Decode(#[from] bincode::Error),
}

impl FrameError {
    /// A clean close by the peer rather than a fault
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            FrameError::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        )
    }
}
