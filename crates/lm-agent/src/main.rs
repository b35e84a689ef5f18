//! Cluster agent entry point: runs the reconciliation cycle on a timer and exposes an
//! authenticated on-demand trigger (spec.md §4.3, §6).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lm_agent::queue::SqueueSource;
use lm_agent::reconcile::{run_cycle, CycleConfig, CycleOutcome};
use lm_agent::server::{router, TriggerState, TriggerTokenValidator};
use lm_client::{AsyncLedgerClient, Auth0Config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Agent process configuration, read from the environment (spec.md §6).
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "BACKEND_BASE_URL")]
    backend_base_url: String,

    #[arg(long, env = "AUTH0_DOMAIN")]
    auth0_domain: String,

    #[arg(long, env = "AUTH0_AUDIENCE")]
    auth0_audience: String,

    #[arg(long, env = "AUTH0_CLIENT_ID")]
    auth0_client_id: String,

    #[arg(long, env = "AUTH0_CLIENT_SECRET")]
    auth0_client_secret: String,

    /// Seconds between reconciliation cycles (spec.md §6).
    #[arg(long, env = "STAT_INTERVAL", default_value_t = 300)]
    stat_interval: u64,

    /// Bind address for the agent's own on-demand trigger surface.
    #[arg(long, env = "TRIGGER_BIND_ADDR", default_value = "0.0.0.0:7000")]
    trigger_bind_addr: String,

    /// Bounded fan-out for adapter invocations and booking-expiry deletes (spec.md §5).
    #[arg(long, env = "RECONCILE_FAN_OUT", default_value_t = 16)]
    fan_out: usize,

    /// Overall deadline, in seconds, for one reconciliation cycle (spec.md §5).
    #[arg(long, env = "RECONCILE_DEADLINE_SECONDS", default_value_t = 300)]
    deadline_seconds: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let client = Arc::new(AsyncLedgerClient::new(
        args.backend_base_url.clone(),
        Auth0Config {
            domain: args.auth0_domain.clone(),
            audience: args.auth0_audience.clone(),
            client_id: args.auth0_client_id.clone(),
            client_secret: args.auth0_client_secret.clone(),
        },
    ));

    let cycle_config = CycleConfig {
        fan_out: args.fan_out,
        deadline: Duration::from_secs(args.deadline_seconds),
    };

    let trigger_state = TriggerState {
        client: client.clone(),
        cycle_config,
        validator: Arc::new(TriggerTokenValidator::new(args.auth0_domain.clone(), args.auth0_audience.clone())),
    };

    let listener = match tokio::net::TcpListener::bind(&args.trigger_bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %args.trigger_bind_addr, "could not bind trigger surface");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %args.trigger_bind_addr, "lm-agent trigger surface listening");
    let trigger_server = tokio::spawn(async move {
        axum::serve(listener, router(trigger_state)).await.expect("trigger server crashed");
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(args.stat_interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_timer_cycle(&client, cycle_config).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal, exiting");
                trigger_server.abort();
                std::process::exit(0);
            }
        }
    }
}

async fn run_timer_cycle(client: &Arc<AsyncLedgerClient>, cycle_config: CycleConfig) {
    let queue = SqueueSource::new();
    match run_cycle(client.clone(), &queue, cycle_config).await {
        Ok(CycleOutcome::Aborted) => tracing::debug!("reconciliation cycle aborted: no queue data"),
        Ok(CycleOutcome::Completed { updated, expired_bookings }) => {
            tracing::info!(updated, expired_bookings, "reconciliation cycle completed");
        }
        Err(e) => tracing::warn!(error = %e, "reconciliation cycle failed"),
    }
}
