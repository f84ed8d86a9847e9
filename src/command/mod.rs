//! Command handling for a fleet instance
//!
//! This module handles:
//! - Turning chat lines into command invocations (two ingestion paths)
//! - Resolving names and aliases against the command table
//! - Gating device-specific commands on this instance's identity
//! - Dispatching to handlers and delivering identity-stamped replies

mod executor;
pub mod handlers;
pub mod parser;
pub mod registry;

pub use executor::{CommandExecutor, CommandResult};
pub use handlers::Services;
