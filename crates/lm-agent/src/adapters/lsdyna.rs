//! LS-Dyna adapter: `lstc_qrun -s <port>@<host> -R`
//! (spec.md §4.2, grounded on `original_source/agent/lm_agent/server_interfaces/lsdyna.py`).
//!
//! Unlike FlexLM, one invocation reports every feature at once; the adapter indexes the
//! parsed map by the requested feature.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use lm_types::entities::LicenseServer;
use lm_types::error::AdapterError;
use lm_types::wire::ReconcileItem;
use lm_types::ProductFeature;
use regex::Regex;

use super::{server_args, LicenseServerAdapter};

pub struct LsDynaAdapter {
    servers: Vec<LicenseServer>,
    lsdyna_path: String,
}

impl LsDynaAdapter {
    pub fn new(servers: Vec<LicenseServer>) -> Self {
        let lsdyna_path = std::env::var("LSDYNA_PATH").unwrap_or_else(|_| "lstc_qrun".to_string());
        LsDynaAdapter { servers, lsdyna_path }
    }
}

#[async_trait]
impl LicenseServerAdapter for LsDynaAdapter {
    fn commands(&self, _feature: &str) -> Vec<Vec<String>> {
        server_args(&self.servers)
            .into_iter()
            .map(|host_port| vec![self.lsdyna_path.clone(), "-s".to_string(), host_port, "-R".to_string()])
            .collect()
    }

    async fn report_item(&self, product_feature: &ProductFeature) -> Result<ReconcileItem, AdapterError> {
        let output = self.raw_output(product_feature.feature()).await?;
        let text = String::from_utf8_lossy(&output);
        let report = parse(&text);
        let (used, total) = report.get(product_feature.feature()).copied().ok_or_else(|| {
            AdapterError::BadServerOutput(
                product_feature.to_string(),
                format!("feature `{}` absent from lstc_qrun output", product_feature.feature()),
            )
        })?;
        Ok(ReconcileItem { product_feature: product_feature.clone(), used, total })
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^\s*([A-Za-z0-9_-]+)\s+(\d+)\s+of\s+(\d+)\s+tokens\s+in\s+use\s*$")
            .expect("static regex is valid")
    })
}

/// Parses a `feature tokens-in-use of total-tokens` line per feature into a map keyed by
/// feature name, each value `(used, total)`.
pub fn parse(text: &str) -> HashMap<String, (i64, i64)> {
    let mut report = HashMap::new();
    for captures in pattern().captures_iter(text) {
        let feature = captures[1].to_string();
        let Ok(used) = captures[2].parse() else { continue };
        let Ok(total) = captures[3].parse() else { continue };
        report.insert(feature, (used, total));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_feature_lines() {
        let text = "explicit      3 of   10 tokens in use\nimplicit      0 of    5 tokens in use\n";
        let report = parse(text);
        assert_eq!(report.get("explicit"), Some(&(3, 10)));
        assert_eq!(report.get("implicit"), Some(&(0, 5)));
    }

    #[test]
    fn empty_output_yields_empty_map() {
        assert!(parse("").is_empty());
    }
}
