//! Client-credentials token acquisition against the configured identity provider
//! (spec.md §4.1 / §6).

use lm_types::error::ClientError;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Auth0Config {
    pub domain: String,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Auth0Config {
    pub fn from_env() -> Result<Self, ClientError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| ClientError::AuthToken(format!("missing env var {name}")))
        };
        Ok(Auth0Config {
            domain: var("AUTH0_DOMAIN")?,
            audience: var("AUTH0_AUDIENCE")?,
            client_id: var("AUTH0_CLIENT_ID")?,
            client_secret: var("AUTH0_CLIENT_SECRET")?,
        })
    }

    fn token_url(&self) -> String {
        lm_types::auth::oidc_url(&self.domain, "/oauth/token")
    }

    fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "audience": self.audience,
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "client_credentials",
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub async fn acquire_token_async(
    http: &reqwest::Client,
    config: &Auth0Config,
) -> Result<String, ClientError> {
    let response = http
        .post(config.token_url())
        .json(&config.body())
        .send()
        .await
        .map_err(|e| ClientError::AuthToken(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::AuthToken(format!(
            "identity provider returned {status}: {body}"
        )));
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| ClientError::AuthToken(format!("malformed token response: {e}")))?;
    Ok(parsed.access_token)
}

pub fn acquire_token_blocking(
    http: &reqwest::blocking::Client,
    config: &Auth0Config,
) -> Result<String, ClientError> {
    let response = http
        .post(config.token_url())
        .json(&config.body())
        .send()
        .map_err(|e| ClientError::AuthToken(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        return Err(ClientError::AuthToken(format!(
            "identity provider returned {status}: {body}"
        )));
    }

    let parsed: TokenResponse = response
        .json()
        .map_err(|e| ClientError::AuthToken(format!("malformed token response: {e}")))?;
    Ok(parsed.access_token)
}
