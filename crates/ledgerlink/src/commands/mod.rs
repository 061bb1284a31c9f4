//! Command dispatch: bridges CLI args -> realtime runtime -> output.

pub mod config_cmd;
pub mod listen;
pub mod request;
pub mod send;
pub mod status;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Listen(args) => listen::handle(args, resolved, global).await,
        Command::Send(args) => send::handle(args, resolved, global).await,
        Command::Request(args) => request::handle(args, resolved, global).await,
        Command::Status(args) => status::handle(args, resolved, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
