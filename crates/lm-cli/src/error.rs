//! Error rendering for the CLI: one colored subject line plus a dimmed support hint
//! (spec.md §7), with full detail logged at `debug` for anyone running with
//! `RUST_LOG=debug`.

use colored::Colorize;
use lm_types::error::ClientError;

pub fn print_and_exit(err: &ClientError) -> ! {
    tracing::debug!(error = ?err, "request failed");
    let subject = match err {
        ClientError::AuthToken(_) => "could not authenticate with the configured identity provider",
        ClientError::BackendConnection(_) => "could not reach the ledger",
        ClientError::UnexpectedStatus { status: 401, .. } => "the ledger rejected this token",
        ClientError::UnexpectedStatus { status: 403, .. } => "this token lacks the required scope",
        ClientError::UnexpectedStatus { status: 404, .. } => "no such record",
        ClientError::UnexpectedStatus { .. } => "the ledger rejected this request",
        ClientError::Decode(_) => "could not parse the ledger's response",
    };
    eprintln!("{} {}", "Error:".bright_red(), subject);
    eprintln!("{}", format!("  ({err})").dimmed());
    eprintln!("{}", "  run with RUST_LOG=debug for detail".dimmed());
    std::process::exit(1);
}
