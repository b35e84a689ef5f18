//! The lazy bearer-token-injecting ledger client (spec.md §4.1).
//!
//! Two variants share identical semantics: [`AsyncLedgerClient`] for cooperative
//! concurrent callers (the agent), [`BlockingLedgerClient`] for the CLI. Acquisition is
//! idempotent under a mutex so concurrent callers within one process never double-fetch
//! a token except for the acceptable race spec.md §5 calls out.

use lm_types::error::ClientError;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::auth0::{Auth0Config, acquire_token_async, acquire_token_blocking};
use crate::cache::{load_cached_token, write_cached_token};

/// Cooperative concurrent client used by the agent.
pub struct AsyncLedgerClient {
    http: reqwest::Client,
    base_url: String,
    auth: Auth0Config,
    token: tokio::sync::Mutex<Option<String>>,
}

impl AsyncLedgerClient {
    pub fn new(base_url: impl Into<String>, auth: Auth0Config) -> Self {
        AsyncLedgerClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth,
            token: tokio::sync::Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ClientError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        if let Some(cached) = load_cached_token() {
            *guard = Some(cached.clone());
            return Ok(cached);
        }
        let fresh = acquire_token_async(&self.http, &self.auth).await?;
        if let Err(e) = write_cached_token(&fresh) {
            tracing::warn!(error = %e, "couldn't save token to cache, continuing without it");
        }
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let token = self.token().await?;
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let token = self.token().await?;
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let token = self.token().await?;
        let response = self
            .http
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let token = self.token().await?;
        let response = self
            .http
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let token = self.token().await?;
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response.status().as_u16(), response.text().await.unwrap_or_default()))
        }
    }
}

/// Blocking client used only by the CLI.
pub struct BlockingLedgerClient {
    http: reqwest::blocking::Client,
    base_url: String,
    auth: Auth0Config,
    token: std::sync::Mutex<Option<String>>,
}

impl BlockingLedgerClient {
    pub fn new(base_url: impl Into<String>, auth: Auth0Config) -> Self {
        BlockingLedgerClient {
            http: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            auth,
            token: std::sync::Mutex::new(None),
        }
    }

    fn token(&self) -> Result<String, ClientError> {
        let mut guard = self.token.lock().expect("token mutex poisoned");
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        if let Some(cached) = load_cached_token() {
            *guard = Some(cached.clone());
            return Ok(cached);
        }
        let fresh = acquire_token_blocking(&self.http, &self.auth)?;
        if let Err(e) = write_cached_token(&fresh) {
            tracing::warn!(error = %e, "couldn't save token to cache, continuing without it");
        }
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let token = self.token()?;
        let response = self.http.get(self.url(path)).bearer_auth(token).send()?;
        decode_json_blocking(response)
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let token = self.token()?;
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()?;
        decode_json_blocking(response)
    }

    pub fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let token = self.token()?;
        let response = self
            .http
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()?;
        decode_json_blocking(response)
    }

    pub fn delete(&self, path: &str) -> Result<(), ClientError> {
        let token = self.token()?;
        let response = self.http.delete(self.url(path)).bearer_auth(token).send()?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response.status().as_u16(), response.text().unwrap_or_default()))
        }
    }
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), body));
    }
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

fn decode_json_blocking<T: DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(status_error(status.as_u16(), body));
    }
    response.json().map_err(|e| ClientError::Decode(e.to_string()))
}

fn status_error(status: u16, body: String) -> ClientError {
    ClientError::UnexpectedStatus { status, body }
}
