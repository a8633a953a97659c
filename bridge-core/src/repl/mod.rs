//! REPL tooling shared between firmware and emulator targets.
//!
//! The grammar lives in [`grammar`]; [`commands`] turns parsed commands
//! into bridge calls and [`status`] renders the results.

pub mod commands;
pub mod grammar;
pub mod status;
