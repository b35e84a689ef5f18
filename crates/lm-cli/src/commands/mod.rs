pub mod booking;
pub mod config;
pub mod feature;
pub mod license_server;

use serde::Serialize;

/// Every subcommand prints its result the same way: pretty JSON to stdout. The operator
/// is expected to pipe this into `jq` for anything beyond eyeballing a single record.
fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::warn!(error = %e, "could not render response as JSON"),
    }
}
