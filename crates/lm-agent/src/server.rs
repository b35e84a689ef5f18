//! The agent's own HTTP surface: an authenticated on-demand reconciliation trigger
//! (spec.md §4.3 — "triggered either by timer ... or by an authenticated HTTP trigger on
//! the agent's own surface"), built on `axum` the same way `lm-ledger::routes` is.
//!
//! Token validation reuses the same JWKS-against-`AUTH0_DOMAIN` flow the ledger uses
//! (`lm-ledger::auth`), duplicated here in miniature rather than shared across a crate
//! boundary: the agent only ever needs "is this a token signed by our tenant", not the
//! ledger's multi-domain/scope-table authorization model.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use lm_client::AsyncLedgerClient;
use lm_types::error::CycleError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::queue::SqueueSource;
use crate::reconcile::{run_cycle, CycleConfig, CycleOutcome};

#[derive(Clone)]
pub struct TriggerState {
    pub client: Arc<AsyncLedgerClient>,
    pub cycle_config: CycleConfig,
    pub validator: Arc<TriggerTokenValidator>,
}

pub fn router(state: TriggerState) -> Router {
    Router::new().route("/reconcile", post(trigger_reconcile)).with_state(state)
}

async fn trigger_reconcile(
    State(state): State<TriggerState>,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, TriggerError> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(TriggerError::Unauthorized)?;
    state.validator.validate(bearer).await.map_err(|_| TriggerError::Unauthorized)?;

    let queue = SqueueSource::new();
    match run_cycle(state.client.clone(), &queue, state.cycle_config).await {
        Ok(CycleOutcome::Aborted) => Ok(Json(TriggerResponse { updated: 0, expired_bookings: 0 })),
        Ok(CycleOutcome::Completed { updated, expired_bookings }) => {
            Ok(Json(TriggerResponse { updated, expired_bookings }))
        }
        Err(e) => Err(TriggerError::Cycle(e)),
    }
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    updated: usize,
    expired_bookings: usize,
}

enum TriggerError {
    Unauthorized,
    Cycle(CycleError),
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        match self {
            TriggerError::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response(),
            TriggerError::Cycle(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Validates a bearer token's signature against the configured tenant's JWKS; doesn't
/// enforce scopes, since the trigger endpoint has exactly one action.
pub struct TriggerTokenValidator {
    domain: String,
    audience: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, JwkSet>>,
}

impl TriggerTokenValidator {
    pub fn new(domain: String, audience: String) -> Self {
        TriggerTokenValidator { domain, audience, http: reqwest::Client::new(), cache: RwLock::new(HashMap::new()) }
    }

    async fn jwks(&self) -> Result<JwkSet, ()> {
        if let Some(cached) = self.cache.read().await.get(&self.domain) {
            return Ok(cached.clone());
        }
        let url = lm_types::auth::oidc_url(&self.domain, "/.well-known/jwks.json");
        let set: JwkSet = self.http.get(&url).send().await.map_err(|_| ())?.json().await.map_err(|_| ())?;
        self.cache.write().await.insert(self.domain.clone(), set.clone());
        Ok(set)
    }

    pub async fn validate(&self, bearer: &str) -> Result<(), ()> {
        let header = jsonwebtoken::decode_header(bearer).map_err(|_| ())?;
        let kid = header.kid.ok_or(())?;
        let jwks = self.jwks().await?;
        let jwk = jwks.keys.iter().find(|k| k.kid == kid).ok_or(())?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|_| ())?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        jsonwebtoken::decode::<serde_json::Value>(bearer, &key, &validation).map(|_| ()).map_err(|_| ())
    }
}
