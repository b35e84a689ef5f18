use lm_client::BlockingLedgerClient;
use lm_types::entities::{Booking, BookingCreate};
use lm_types::error::ClientError;

use crate::cli_args::BookingCommands;
use crate::commands::print_json;

pub fn run(client: &BlockingLedgerClient, command: BookingCommands) -> Result<(), ClientError> {
    match command {
        BookingCommands::Create { job_id, feature_id, quantity } => {
            let body = BookingCreate { job_id, feature_id, quantity };
            let created: Booking = client.post("/bookings", &body)?;
            print_json(&created);
        }
        BookingCommands::List => {
            let bookings: Vec<Booking> = client.get("/bookings")?;
            print_json(&bookings);
        }
        BookingCommands::Delete { id } => {
            client.delete(&format!("/bookings/{id}"))?;
            println!("deleted booking {id}");
        }
    }
    Ok(())
}
