//! Command dispatch: bridges CLI args -> session operations -> output formatting.

pub mod campaign;
pub mod chat;
pub mod clients;
pub mod config_cmd;
pub mod session;

use std::future::Future;
use std::time::Duration;

use relaydesk_core::{Role, SessionController};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a store-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    session: &SessionController,
    global: &GlobalOpts,
    timeout: Duration,
) -> Result<(), CliError> {
    match cmd {
        Command::Login => session::login(session, global),
        Command::Whoami => session::whoami(session, global),
        Command::Clients(args) => clients::handle(session, args, global, timeout).await,
        Command::Chat(args) => chat::handle(session, args, global, timeout).await,
        Command::Campaign(args) => campaign::handle(session, args, global, timeout).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Refuse operator-only commands for customer sessions.
fn require_operator(session: &SessionController, command: &str) -> Result<(), CliError> {
    match session.profile().map(|p| p.role) {
        Some(Role::Operator) => Ok(()),
        _ => Err(CliError::OperatorOnly {
            command: command.into(),
        }),
    }
}

/// Bound a wait on the store by the connection timeout.
async fn within<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = T>,
) -> Result<T, CliError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CliError::Timeout {
            what: what.into(),
            seconds: timeout.as_secs(),
        })
}

/// The error for a listener that ended before its first snapshot,
/// carrying whatever the session last reported.
fn listener_ended(session: &SessionController, collection: &str) -> CliError {
    let message = session
        .errors()
        .latest()
        .map_or_else(|| "listener ended".into(), |signal| signal.message.clone());
    CliError::SyncFailed {
        collection: collection.into(),
        message,
    }
}
