use lm_client::BlockingLedgerClient;
use lm_types::entities::{Configuration, ConfigurationCreate, ConfigurationUpdate};
use lm_types::error::ClientError;

use crate::cli_args::ConfigCommands;
use crate::commands::print_json;

pub fn run(client: &BlockingLedgerClient, command: ConfigCommands) -> Result<(), ClientError> {
    match command {
        ConfigCommands::Create { name, cluster_id, kind, grace_time } => {
            let body = ConfigurationCreate { name, cluster_id, kind: kind.into(), grace_time };
            let created: Configuration = client.post("/configurations", &body)?;
            print_json(&created);
        }
        ConfigCommands::Update { id, name, cluster_id, kind, grace_time } => {
            let body = ConfigurationUpdate { name, cluster_id, kind: kind.map(Into::into), grace_time };
            let updated: Configuration = client.put(&format!("/configurations/{id}"), &body)?;
            print_json(&updated);
        }
        ConfigCommands::List => {
            let configs: Vec<Configuration> = client.get("/configurations")?;
            print_json(&configs);
        }
    }
    Ok(())
}
