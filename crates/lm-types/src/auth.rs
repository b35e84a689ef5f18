//! Identity extracted from a validated bearer token.
//!
//! Grounded on `original_source/backend/lm_backend/security.py`'s
//! `IdentityPayload`: the `organization` claim, when present, must carry
//! exactly one key (the organization id); anything else fails validation.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub exp: i64,
    /// Cluster client id — the auth subject an agent presents (spec.md §3).
    pub azp: String,
    pub permissions: Vec<String>,
    pub email: Option<String>,
    pub organization_id: Option<String>,
}

impl IdentityClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.permissions.iter().any(|p| p == scope)
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    exp: i64,
    azp: String,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    organization: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("invalid organization claim: {0}")]
    InvalidOrganization(String),
}

impl<'de> Deserialize<'de> for IdentityClaims {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawClaims::deserialize(deserializer)?;
        let organization_id = match raw.organization {
            None => None,
            Some(Value::Object(map)) => {
                if map.len() != 1 {
                    return Err(serde::de::Error::custom(ClaimsError::InvalidOrganization(
                        format!("expected exactly one key, got {}", map.len()),
                    )));
                }
                map.into_keys().next()
            }
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                return Err(serde::de::Error::custom(ClaimsError::InvalidOrganization(
                    format!("invalid organization payload: {other}"),
                )));
            }
        };

        Ok(IdentityClaims {
            sub: raw.sub,
            exp: raw.exp,
            azp: raw.azp,
            permissions: raw.permissions,
            email: raw.email,
            organization_id,
        })
    }
}

/// The fixed scope set gating ledger endpoints (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    ClusterView,
    ClusterEdit,
    ConfigView,
    ConfigEdit,
    LicenseServerView,
    LicenseServerEdit,
    ProductView,
    ProductEdit,
    FeatureView,
    FeatureEdit,
    JobView,
    JobEdit,
    BookingView,
    BookingEdit,
    Reconcile,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::ClusterView => "CLUSTER_VIEW",
            Scope::ClusterEdit => "CLUSTER_EDIT",
            Scope::ConfigView => "CONFIG_VIEW",
            Scope::ConfigEdit => "CONFIG_EDIT",
            Scope::LicenseServerView => "LICENSE_SERVER_VIEW",
            Scope::LicenseServerEdit => "LICENSE_SERVER_EDIT",
            Scope::ProductView => "PRODUCT_VIEW",
            Scope::ProductEdit => "PRODUCT_EDIT",
            Scope::FeatureView => "FEATURE_VIEW",
            Scope::FeatureEdit => "FEATURE_EDIT",
            Scope::JobView => "JOB_VIEW",
            Scope::JobEdit => "JOB_EDIT",
            Scope::BookingView => "BOOKING_VIEW",
            Scope::BookingEdit => "BOOKING_EDIT",
            Scope::Reconcile => "RECONCILE",
        }
    }
}

/// Placeholder kept only to document the shape permissions arrive in; real lookups go
/// through `IdentityClaims::has_scope`.
pub type ScopeSet = HashMap<String, ()>;

/// Builds a URL against a configured OIDC domain. `domain` is normally a bare hostname
/// (e.g. `tenant.us.auth0.com`), joined with `https://`; a full `http(s)://` base is
/// also accepted as-is, which lets tests point the same config at a local mock server.
pub fn oidc_url(domain: &str, path: &str) -> String {
    if let Some(base) = domain.strip_prefix("http://").or_else(|| domain.strip_prefix("https://")) {
        let scheme = if domain.starts_with("https://") { "https" } else { "http" };
        format!("{scheme}://{}{path}", base.trim_end_matches('/'))
    } else {
        format!("https://{domain}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Result<IdentityClaims, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn extracts_single_key_organization() {
        let claims = decode(
            r#"{"sub":"dummy-sub","exp":1689105153,"azp":"dummy-client-id",
                "organization":{"org-abc":{"name":"Dummy"}}}"#,
        )
        .unwrap();
        assert_eq!(claims.organization_id.as_deref(), Some("org-abc"));
    }

    #[test]
    fn rejects_empty_organization_object() {
        let err = decode(
            r#"{"sub":"s","exp":1,"azp":"a","organization":{}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one key"));
    }

    #[test]
    fn rejects_multi_key_organization() {
        let err = decode(
            r#"{"sub":"s","exp":1,"azp":"a","organization":{"a":{},"b":{}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one key"));
    }

    #[test]
    fn rejects_non_object_non_string_organization() {
        let err = decode(r#"{"sub":"s","exp":1,"azp":"a","organization":1234}"#).unwrap_err();
        assert!(err.to_string().contains("invalid organization payload"));
    }

    #[test]
    fn missing_organization_is_none() {
        let claims = decode(r#"{"sub":"s","exp":1,"azp":"a"}"#).unwrap();
        assert_eq!(claims.organization_id, None);
    }

    #[test]
    fn has_scope_checks_permissions_array() {
        let claims = decode(
            r#"{"sub":"s","exp":1,"azp":"a","permissions":["FEATURE_VIEW","RECONCILE"]}"#,
        )
        .unwrap();
        assert!(claims.has_scope("RECONCILE"));
        assert!(!claims.has_scope("FEATURE_EDIT"));
    }
}
