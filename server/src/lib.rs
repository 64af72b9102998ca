//! # Trivia Game Server Library
//!
//! The primary node of a trivia session. It hosts the authoritative game,
//! the game pseudo-client "@", computer persons and the TCP listener that
//! remote secondary nodes join through.
//!
//! ## Module Organization
//!
//! - `config`: command line and game timing rules
//! - `game`: the game state machine and its async driver
//! - `selection`: how the next question of a round is picked
//! - `computer`: computer players and showman
//! - `network`: TCP accept loop and per-connection tasks

pub mod computer;
pub mod config;
pub mod game;
pub mod network;
pub mod selection;
