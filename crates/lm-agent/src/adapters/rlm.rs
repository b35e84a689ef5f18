//! RLM adapter: `rlmutil rlmstat -c <port>@<host> -a`.
//!
//! spec.md §4.2 describes RLM only as "follows the same shape [as FlexLM]"; its wire
//! format is a documented, stable two-line-per-feature block
//! (`<feature> v<version>` followed by `count: N, # reservations: 0, inuse: M, ...`), so
//! it's implemented fully rather than stubbed, per SPEC_FULL.md's decision to leave no
//! adapter variant without real parsing logic.

use std::sync::OnceLock;

use async_trait::async_trait;
use lm_types::entities::LicenseServer;
use lm_types::error::AdapterError;
use lm_types::wire::ReconcileItem;
use lm_types::ProductFeature;
use regex::Regex;

use super::{server_args, LicenseServerAdapter};

pub struct RlmAdapter {
    servers: Vec<LicenseServer>,
    rlmutil_path: String,
}

impl RlmAdapter {
    pub fn new(servers: Vec<LicenseServer>) -> Self {
        let rlmutil_path = std::env::var("RLMUTIL_PATH").unwrap_or_else(|_| "rlmutil".to_string());
        RlmAdapter { servers, rlmutil_path }
    }
}

#[async_trait]
impl LicenseServerAdapter for RlmAdapter {
    fn commands(&self, _feature: &str) -> Vec<Vec<String>> {
        server_args(&self.servers)
            .into_iter()
            .map(|host_port| {
                vec![self.rlmutil_path.clone(), "rlmstat".to_string(), "-c".to_string(), host_port, "-a".to_string()]
            })
            .collect()
    }

    async fn report_item(&self, product_feature: &ProductFeature) -> Result<ReconcileItem, AdapterError> {
        let output = self.raw_output(product_feature.feature()).await?;
        let text = String::from_utf8_lossy(&output);
        let (used, total) = parse(&text, product_feature.feature()).ok_or_else(|| {
            AdapterError::BadServerOutput(
                product_feature.to_string(),
                format!("feature `{}` absent from rlmstat output", product_feature.feature()),
            )
        })?;
        Ok(ReconcileItem { product_feature: product_feature.clone(), used, total })
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?m)^([A-Za-z0-9_-]+)\s+v[\d.]+[^\n]*\n\s*count:\s*(\d+),[^\n]*inuse:\s*(\d+)",
        )
        .expect("static regex is valid")
    })
}

/// Parses every `<feature> v<version>` / `count: N, ... inuse: M` block, returning the
/// `(used, total)` pair for `feature`.
pub fn parse(text: &str, feature: &str) -> Option<(i64, i64)> {
    for captures in pattern().captures_iter(text) {
        if &captures[1] == feature {
            let total: i64 = captures[2].parse().ok()?;
            let used: i64 = captures[3].parse().ok()?;
            return Some((used, total));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matching_feature_block() {
        let text = "abaqus v1.0\n  count: 10, # reservations: 0, inuse: 3, exp: permanent\n\
                     explicit v2.1\n  count: 5, # reservations: 0, inuse: 1, exp: permanent\n";
        assert_eq!(parse(text, "abaqus"), Some((3, 10)));
        assert_eq!(parse(text, "explicit"), Some((1, 5)));
    }

    #[test]
    fn returns_none_for_unknown_feature() {
        let text = "abaqus v1.0\n  count: 10, # reservations: 0, inuse: 3, exp: permanent\n";
        assert_eq!(parse(text, "standard"), None);
    }
}
