//! Central ledger service entry point (spec.md §2, §6).

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use lm_ledger::auth::JwksTokenValidator;
use lm_ledger::routes::{self, AppState};
use lm_ledger::store::Store;

/// Configuration for the ledger process, read from the environment exactly as the
/// teacher's service binary reads its `Args` (spec.md §6 names these as agent env vars;
/// the ledger's equivalents mirror `original_source/backend/lm_backend/config.py`).
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: String,

    /// Base path prefix the REST surface is nested under (spec.md §6).
    #[arg(long, env = "BASE_PATH", default_value = "/lm")]
    base_path: String,

    #[arg(long, env = "ARMASEC_DOMAIN")]
    armasec_domain: String,

    /// Optional admin overlay domain, validated after the primary tenant domain.
    #[arg(long, env = "ARMASEC_ADMIN_DOMAIN")]
    armasec_admin_domain: Option<String>,

    #[arg(long, env = "ARMASEC_AUDIENCE")]
    armasec_audience: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut domains = vec![args.armasec_domain];
    if let Some(admin_domain) = args.armasec_admin_domain {
        domains.push(admin_domain);
    }

    let state = AppState {
        store: Arc::new(Store::new()),
        validator: Arc::new(JwksTokenValidator::new(domains, args.armasec_audience)),
    };

    let app = axum::Router::new().nest(&args.base_path, routes::router(state));

    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await?;
    tracing::info!(addr = %args.bind_addr, base_path = %args.base_path, "lm-ledger listening");
    axum::serve(listener, app).await?;
    Ok(())
}
