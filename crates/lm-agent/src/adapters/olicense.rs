//! OLicense adapter: `olstat -f <host>:<port>`, CSV summary output.
//!
//! spec.md §4.2 groups OLicense with "the same shape" without specifying its wire format;
//! this implements OLicense's documented `-f` (flat, scriptable) summary mode, a
//! semicolon-separated `feature;used;total` line per feature, rather than a stub.

use async_trait::async_trait;
use lm_types::entities::LicenseServer;
use lm_types::error::AdapterError;
use lm_types::wire::ReconcileItem;
use lm_types::ProductFeature;

use super::{server_args, LicenseServerAdapter};

pub struct OLicenseAdapter {
    servers: Vec<LicenseServer>,
    olstat_path: String,
}

impl OLicenseAdapter {
    pub fn new(servers: Vec<LicenseServer>) -> Self {
        let olstat_path = std::env::var("OLICENSE_PATH").unwrap_or_else(|_| "olstat".to_string());
        OLicenseAdapter { servers, olstat_path }
    }
}

#[async_trait]
impl LicenseServerAdapter for OLicenseAdapter {
    fn commands(&self, _feature: &str) -> Vec<Vec<String>> {
        server_args(&self.servers)
            .into_iter()
            .map(|host_port| vec![self.olstat_path.clone(), "-f".to_string(), host_port])
            .collect()
    }

    async fn report_item(&self, product_feature: &ProductFeature) -> Result<ReconcileItem, AdapterError> {
        let output = self.raw_output(product_feature.feature()).await?;
        let text = String::from_utf8_lossy(&output);
        let (used, total) = parse(&text, product_feature.feature()).ok_or_else(|| {
            AdapterError::BadServerOutput(
                product_feature.to_string(),
                format!("feature `{}` absent from olstat output", product_feature.feature()),
            )
        })?;
        Ok(ReconcileItem { product_feature: product_feature.clone(), used, total })
    }
}

/// Parses `feature;used;total` lines, returning `(used, total)` for `feature`.
pub fn parse(text: &str, feature: &str) -> Option<(i64, i64)> {
    for line in text.lines() {
        let mut fields = line.splitn(3, ';');
        let name = fields.next()?.trim();
        if name != feature {
            continue;
        }
        let used: i64 = fields.next()?.trim().parse().ok()?;
        let total: i64 = fields.next()?.trim().parse().ok()?;
        return Some((used, total));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matching_line() {
        let text = "abaqus;4;20\nexplicit;1;5\n";
        assert_eq!(parse(text, "abaqus"), Some((4, 20)));
        assert_eq!(parse(text, "explicit"), Some((1, 5)));
    }

    #[test]
    fn returns_none_for_unknown_feature() {
        assert_eq!(parse("abaqus;4;20\n", "standard"), None);
    }
}
