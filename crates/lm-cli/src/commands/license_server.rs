use lm_client::BlockingLedgerClient;
use lm_types::entities::{LicenseServer, LicenseServerCreate, LicenseServerUpdate};
use lm_types::error::ClientError;

use crate::cli_args::LicenseServerCommands;
use crate::commands::print_json;

pub fn run(client: &BlockingLedgerClient, command: LicenseServerCommands) -> Result<(), ClientError> {
    match command {
        LicenseServerCommands::Create { config_id, host, port } => {
            let body = LicenseServerCreate { config_id, host, port };
            let created: LicenseServer = client.post("/license-servers", &body)?;
            print_json(&created);
        }
        LicenseServerCommands::Update { id, config_id, host, port } => {
            let body = LicenseServerUpdate { config_id, host, port };
            let updated: LicenseServer = client.put(&format!("/license-servers/{id}"), &body)?;
            print_json(&updated);
        }
        LicenseServerCommands::List => {
            let servers: Vec<LicenseServer> = client.get("/license-servers")?;
            print_json(&servers);
        }
    }
    Ok(())
}
