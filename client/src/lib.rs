//! # Trivia Game Client Library
//!
//! A secondary node for one human person. It joins a remote primary over
//! TCP, binds the person to a console through an actor and turns typed
//! commands into protocol messages.
//!
//! ## Module Organization
//!
//! - `network`: join handshake and the TCP bridge of the secondary node
//! - `human`: logic that keeps the table view and presents game events
//! - `commands`: console command parsing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::human::{ConsolePresenter, HumanLogic};
//! use client::network::connect;
//! use shared::{Actor, GameRole, JoinRequest, Sex};
//!
//! # async fn run() -> Result<(), shared::NodeError> {
//! let request = JoinRequest::new("alice", GameRole::Player, Sex::Female);
//! let session = connect("127.0.0.1:8080", request).await?;
//! let actor = Actor::spawn(session.client, HumanLogic::new("alice", Box::new(ConsolePresenter)));
//! actor.send("@", "I").await;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod human;
pub mod network;
