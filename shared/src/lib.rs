//! Types shared by the primary and secondary nodes of a trivia session:
//! the message envelope, wire packets, the package model, the node/client
//! routing layer and the actor binding.

pub mod actor;
pub mod client;
pub mod error;
pub mod message;
pub mod model;
pub mod node;
pub mod packet;
pub mod roles;
pub mod view;

pub use actor::{Actor, ActorHandle, Logic, Outbox};
pub use client::Client;
pub use error::{FrameError, JoinError, NodeError};
pub use message::{Message, MessageKind, ARGS_SEPARATOR, EVERYBODY, GAME_NAME, SERVER_NAME};
pub use model::{Package, Question, QuestionType, Round, RoundType, SelectionMode, Theme, INVALID_PRICE};
pub use node::{ConnectionId, Node, NodeEvent, NodeRole};
pub use packet::Packet;
pub use roles::{GameRole, JoinRequest, Sex};
pub use view::TableView;
