//! Mod lifecycle and deployment engine.
//!
//! Archives move from a downloads folder into a per-game staging folder and
//! are activated by symlinking their top-level roots into the game's mod
//! folder. Two YAML ledgers record what was downloaded and what is staged.

pub mod application;
pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod download;
pub mod error;
pub mod http;
pub mod ledger;
pub mod nexus;
pub mod runtime;
pub mod staging;
pub mod update;
pub mod watch;

pub use error::{Error, Result};
