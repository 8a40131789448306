//! `seatgate item <id> <limit>` – define an item.

use anyhow::Result;
use seatgate_core::AdmissionController;

pub async fn run_item(controller: &AdmissionController, id: i64, limit: u32) -> Result<()> {
    controller.define_item(id, limit).await?;
    println!("Item {id} accepts up to {limit} reservations");
    Ok(())
}
