//! FlexLM adapter: `lmutil lmstat -c <port>@<host> -f <feature>`
//! (spec.md §4.2, grounded on `original_source/agent/lm_agent/server_interfaces/flexlm.py`).

use std::sync::OnceLock;

use async_trait::async_trait;
use lm_types::entities::LicenseServer;
use lm_types::error::AdapterError;
use lm_types::wire::ReconcileItem;
use lm_types::ProductFeature;
use regex::Regex;

use super::{server_args, LicenseServerAdapter};

pub struct FlexLmAdapter {
    servers: Vec<LicenseServer>,
    lmutil_path: String,
}

impl FlexLmAdapter {
    pub fn new(servers: Vec<LicenseServer>) -> Self {
        let lmutil_path = std::env::var("LMUTIL_PATH").unwrap_or_else(|_| "lmutil".to_string());
        FlexLmAdapter { servers, lmutil_path }
    }
}

#[async_trait]
impl LicenseServerAdapter for FlexLmAdapter {
    fn commands(&self, feature: &str) -> Vec<Vec<String>> {
        server_args(&self.servers)
            .into_iter()
            .map(|host_port| {
                vec![
                    self.lmutil_path.clone(),
                    "lmstat".to_string(),
                    "-c".to_string(),
                    host_port,
                    "-f".to_string(),
                    feature.to_string(),
                ]
            })
            .collect()
    }

    async fn report_item(&self, product_feature: &ProductFeature) -> Result<ReconcileItem, AdapterError> {
        let output = self.raw_output(product_feature.feature()).await?;
        let text = String::from_utf8_lossy(&output);
        let (used, total) = parse(&text).ok_or_else(|| {
            AdapterError::BadServerOutput(product_feature.to_string(), "no `Users of` line found".to_string())
        })?;
        Ok(ReconcileItem { product_feature: product_feature.clone(), used, total })
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)Users of [A-Za-z0-9_-]+:\s*\(Total of (\d+) licenses issued;\s*Total of (\d+) licenses in use\)",
        )
        .expect("static regex is valid")
    })
}

/// Extracts the single `Users of <name>: (Total of N licenses issued; Total of M licenses
/// in use)` block a feature-scoped `lmstat -f` invocation produces, returning `(used,
/// total)`. The reported `<name>` is whatever vendor-internal label FlexLM uses for the
/// queried feature; the caller already knows which `product_feature` this response is for.
pub fn parse(text: &str) -> Option<(i64, i64)> {
    let captures = pattern().captures(text)?;
    let total: i64 = captures[1].parse().ok()?;
    let used: i64 = captures[2].parse().ok()?;
    Some((used, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_users_of_line() {
        let text = "Users of abaqus: (Total of 50 licenses issued;  Total of 7 licenses in use)";
        assert_eq!(parse(text), Some((7, 50)));
    }

    #[test]
    fn ignores_unrelated_lines() {
        let text = "lmutil - Copyright (c) 1989-2021\nsome other banner text\n";
        assert_eq!(parse(text), None);
    }

    #[test]
    fn takes_the_first_block_when_several_are_present() {
        let text = "Users of standard: (Total of 50 licenses issued;  Total of 7 licenses in use)\n\
                     Users of extended: (Total of 10 licenses issued;  Total of 2 licenses in use)";
        assert_eq!(parse(text), Some((7, 50)));
    }
}
