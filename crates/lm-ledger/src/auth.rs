//! Bearer-token validation: JWKS signature verification against one or two OIDC domains
//! (spec.md §2, §4.5; grounded on `original_source/backend/lm_backend/security.py`'s
//! `ARMASEC_DOMAIN`/`ARMASEC_ADMIN_DOMAIN` pair).

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use lm_types::auth::IdentityClaims;
use lm_types::error::LedgerError;
use serde::Deserialize;
use tokio::sync::RwLock;

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, bearer: &str) -> Result<IdentityClaims, LedgerError>;
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

/// Validates against a primary tenant domain and an optional admin overlay domain,
/// trying each in turn until one yields a verified token.
pub struct JwksTokenValidator {
    domains: Vec<String>,
    audience: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, JwkSet>>,
}

impl JwksTokenValidator {
    pub fn new(domains: Vec<String>, audience: String) -> Self {
        JwksTokenValidator {
            domains,
            audience,
            http: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn jwks_for(&self, domain: &str) -> Result<JwkSet, LedgerError> {
        if let Some(cached) = self.cache.read().await.get(domain) {
            return Ok(cached.clone());
        }
        let url = lm_types::auth::oidc_url(domain, "/.well-known/jwks.json");
        let set: JwkSet = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|_| LedgerError::Unauthorized)?
            .json()
            .await
            .map_err(|_| LedgerError::Unauthorized)?;
        self.cache.write().await.insert(domain.to_string(), set.clone());
        Ok(set)
    }
}

#[async_trait]
impl TokenValidator for JwksTokenValidator {
    async fn validate(&self, bearer: &str) -> Result<IdentityClaims, LedgerError> {
        let header = jsonwebtoken::decode_header(bearer).map_err(|_| LedgerError::Unauthorized)?;
        let kid = header.kid.ok_or(LedgerError::Unauthorized)?;

        for domain in &self.domains {
            let Ok(jwks) = self.jwks_for(domain).await else { continue };
            let Some(jwk) = jwks.keys.iter().find(|k| k.kid == kid) else { continue };
            let Ok(key) = DecodingKey::from_rsa_components(&jwk.n, &jwk.e) else { continue };

            let mut validation = Validation::new(Algorithm::RS256);
            validation.set_audience(&[&self.audience]);
            if let Ok(data) = jsonwebtoken::decode::<IdentityClaims>(bearer, &key, &validation) {
                return Ok(data.claims);
            }
        }
        Err(LedgerError::Unauthorized)
    }
}

/// Test double: an exact-match token-to-claims table, no network or crypto involved.
#[derive(Debug, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, IdentityClaims>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        StaticTokenValidator::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, claims: IdentityClaims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, bearer: &str) -> Result<IdentityClaims, LedgerError> {
        self.tokens.get(bearer).cloned().ok_or(LedgerError::Unauthorized)
    }
}
