use lm_client::BlockingLedgerClient;
use lm_types::entities::{Feature, FeatureCreate, FeatureUpdate, FeatureView, InventoryUpdate};
use lm_types::error::ClientError;

use crate::cli_args::FeatureCommands;
use crate::commands::print_json;

pub fn run(client: &BlockingLedgerClient, command: FeatureCommands) -> Result<(), ClientError> {
    match command {
        FeatureCommands::Create { name, product_id, config_id, reserved } => {
            let body = FeatureCreate { name, product_id, config_id, reserved };
            let created: Feature = client.post("/features", &body)?;
            print_json(&created);
        }
        FeatureCommands::Update { id, name, product_id, config_id, reserved } => {
            let body = FeatureUpdate { name, product_id, config_id, reserved };
            let updated: Feature = client.put(&format!("/features/{id}"), &body)?;
            print_json(&updated);
        }
        FeatureCommands::List => {
            let features: Vec<Feature> = client.get("/features")?;
            print_json(&features);
        }
        FeatureCommands::SetInventory { id, total, used } => {
            let body = InventoryUpdate { total, used };
            let updated: FeatureView = client.put(&format!("/features/{id}/update_inventory"), &body)?;
            print_json(&updated);
        }
    }
    Ok(())
}
