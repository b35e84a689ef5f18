//! Authenticated HTTP client used by the agent and the CLI to talk to the license ledger.
//!
//! [`AsyncLedgerClient`] and [`BlockingLedgerClient`] share a token cache (`cache`) and
//! client-credentials acquisition flow (`auth0`); see `client` for the request plumbing.

pub mod auth0;
pub mod cache;
pub mod client;

pub use auth0::Auth0Config;
pub use client::{AsyncLedgerClient, BlockingLedgerClient};
