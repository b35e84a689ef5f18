//! Operator CLI for the license-token ledger (spec.md §4.6).

use clap::Parser;
use lm_client::{Auth0Config, BlockingLedgerClient};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod cli_args;
mod commands;
mod error;

use cli_args::{CliArgs, Commands};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = CliArgs::parse();
    let client = BlockingLedgerClient::new(
        args.backend_base_url,
        Auth0Config {
            domain: args.auth0_domain,
            audience: args.auth0_audience,
            client_id: args.auth0_client_id,
            client_secret: args.auth0_client_secret,
        },
    );

    let result = match args.command {
        Commands::Config { command } => commands::config::run(&client, command),
        Commands::Feature { command } => commands::feature::run(&client, command),
        Commands::LicenseServer { command } => commands::license_server::run(&client, command),
        Commands::Booking { command } => commands::booking::run(&client, command),
    };

    if let Err(e) = result {
        error::print_and_exit(&e);
    }
}
