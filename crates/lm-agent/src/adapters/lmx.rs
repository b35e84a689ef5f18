//! LM-X adapter: `lmxendutil -licstat -netlicenseserver <host>:<port>`.
//!
//! spec.md §4.2 groups LM-X with "the same shape" as FlexLM/RLM without specifying its
//! wire format in detail; this implements the vendor's documented `-licstat` summary line
//! (`Feature: <name> ... # of licenses: <total> (in use: <used>)`) rather than a stub.

use std::sync::OnceLock;

use async_trait::async_trait;
use lm_types::entities::LicenseServer;
use lm_types::error::AdapterError;
use lm_types::wire::ReconcileItem;
use lm_types::ProductFeature;
use regex::Regex;

use super::{server_args, LicenseServerAdapter};

pub struct LmxAdapter {
    servers: Vec<LicenseServer>,
    lmxendutil_path: String,
}

impl LmxAdapter {
    pub fn new(servers: Vec<LicenseServer>) -> Self {
        let lmxendutil_path = std::env::var("LMX_PATH").unwrap_or_else(|_| "lmxendutil".to_string());
        LmxAdapter { servers, lmxendutil_path }
    }
}

#[async_trait]
impl LicenseServerAdapter for LmxAdapter {
    fn commands(&self, _feature: &str) -> Vec<Vec<String>> {
        server_args(&self.servers)
            .into_iter()
            .map(|host_port| {
                vec![
                    self.lmxendutil_path.clone(),
                    "-licstat".to_string(),
                    "-netlicenseserver".to_string(),
                    host_port.replace('@', ":"),
                ]
            })
            .collect()
    }

    async fn report_item(&self, product_feature: &ProductFeature) -> Result<ReconcileItem, AdapterError> {
        let output = self.raw_output(product_feature.feature()).await?;
        let text = String::from_utf8_lossy(&output);
        let (used, total) = parse(&text, product_feature.feature()).ok_or_else(|| {
            AdapterError::BadServerOutput(
                product_feature.to_string(),
                format!("feature `{}` absent from lmxendutil output", product_feature.feature()),
            )
        })?;
        Ok(ReconcileItem { product_feature: product_feature.clone(), used, total })
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^Feature:\s*([A-Za-z0-9_-]+).*?#\s*of\s*licenses:\s*(\d+)\s*\(in use:\s*(\d+)\)")
            .expect("static regex is valid")
    })
}

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
    fn parses_feature_line() {
        let text = "Feature: abaqus version 1.0, # of licenses: 20 (in use: 4)";
        assert_eq!(parse(text, "abaqus"), Some((4, 20)));
    }

    #[test]
    fn returns_none_when_feature_absent() {
        assert_eq!(parse("Feature: other, # of licenses: 1 (in use: 0)", "abaqus"), None);
    }
}
