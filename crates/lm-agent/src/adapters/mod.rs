//! License-server adapter layer (spec.md §4.2).
//!
//! `AdapterKind` is a closed enum dispatching to implementations of
//! [`LicenseServerAdapter`], mirroring the teacher's closed-dispatch plugin registry
//! (`crates/querymt/src/plugin/host/mod.rs`'s `PluginType` → `Box<dyn PluginLoader>` map).

mod flexlm;
mod lmx;
mod lsdyna;
mod olicense;
mod rlm;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lm_types::entities::LicenseServer;
use lm_types::error::AdapterError;
use lm_types::wire::ReconcileItem;
use lm_types::ProductFeature;
use tokio::process::Command;
use tokio::time::timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    FlexLm,
    Rlm,
    LsDyna,
    Lmx,
    OLicense,
}

impl From<lm_types::entities::ConfigurationType> for AdapterKind {
    fn from(kind: lm_types::entities::ConfigurationType) -> Self {
        use lm_types::entities::ConfigurationType as Ct;
        match kind {
            Ct::Flexlm => AdapterKind::FlexLm,
            Ct::Rlm => AdapterKind::Rlm,
            Ct::Lsdyna => AdapterKind::LsDyna,
            Ct::Lmx => AdapterKind::Lmx,
            Ct::Olicense => AdapterKind::OLicense,
        }
    }
}

#[async_trait]
pub trait LicenseServerAdapter: Send + Sync {
    /// One argv per configured license server, parameterized by `port@host` and,
    /// where required, the feature name.
    fn commands(&self, feature: &str) -> Vec<Vec<String>>;

    /// Runs each command in order, returning the stdout of the first non-empty,
    /// zero-exit invocation.
    async fn raw_output(&self, feature: &str) -> Result<Vec<u8>, AdapterError> {
        for argv in self.commands(feature) {
            let Some((program, args)) = argv.split_first() else { continue };
            let spawn = Command::new(program)
                .args(args)
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output();

            let output = match timeout(COMMAND_TIMEOUT, spawn).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(AdapterError::Spawn(program.clone(), e)),
                Err(_) => return Err(AdapterError::Timeout(program.clone())),
            };

            if output.status.success() && !output.stdout.is_empty() {
                return Ok(output.stdout);
            }
        }
        Err(AdapterError::NoServerAvailable(feature.to_string()))
    }

    /// Parses `raw_output` into a uniform report item.
    async fn report_item(&self, product_feature: &ProductFeature) -> Result<ReconcileItem, AdapterError>;
}

pub fn build_adapter(kind: AdapterKind, servers: Vec<LicenseServer>) -> Box<dyn LicenseServerAdapter> {
    match kind {
        AdapterKind::FlexLm => Box::new(flexlm::FlexLmAdapter::new(servers)),
        AdapterKind::Rlm => Box::new(rlm::RlmAdapter::new(servers)),
        AdapterKind::LsDyna => Box::new(lsdyna::LsDynaAdapter::new(servers)),
        AdapterKind::Lmx => Box::new(lmx::LmxAdapter::new(servers)),
        AdapterKind::OLicense => Box::new(olicense::OLicenseAdapter::new(servers)),
    }
}

pub(crate) fn server_args(servers: &[LicenseServer]) -> Vec<String> {
    servers.iter().map(|s| format!("{}@{}", s.port, s.host)).collect()
}
