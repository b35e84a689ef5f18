use thiserror::Error;

/// Errors raised by the ledger's domain logic, independent of how they are
/// eventually rendered over HTTP (see `lm-ledger::http_error` for the axum mapping).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed for field `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("unique-key conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("token lacks required scope `{0}`")]
    Forbidden(&'static str),
}

/// Errors raised while the agent is invoking a license-server adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no configured license server produced output for `{0}`")]
    NoServerAvailable(String),

    #[error("could not parse license server output for `{0}`: {1}")]
    BadServerOutput(String, String),

    #[error("subprocess `{0}` timed out")]
    Timeout(String),

    #[error("failed to spawn subprocess `{0}`: {1}")]
    Spawn(String, std::io::Error),
}

/// Errors raised by the authenticated client shared by the agent and the CLI.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not acquire an auth token: {0}")]
    AuthToken(String),

    #[error("could not connect to the backend: {0}")]
    BackendConnection(String),

    #[error("backend returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),
}

/// Outcome of one reconciliation cycle (spec.md §4.3's "Cycle outcome" / §5's deadline).
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no license data could be collected")]
    NoData,
    #[error("could not reach the ledger: {0}")]
    BackendUnavailable(String),
    #[error("reconciliation cycle exceeded its deadline")]
    Timeout,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ClientError::BackendConnection(err.to_string())
        } else {
            ClientError::Decode(err.to_string())
        }
    }
}
