//! `seatgate cancel` / `seatgate cancel-reservation` – give a slot back.

use anyhow::Result;
use seatgate_core::AdmissionController;

pub async fn run_cancel(
    controller: &AdmissionController,
    item: i64,
    requester: i64,
) -> Result<()> {
    if controller.cancel(item, requester).await? {
        println!("Cancelled requester {requester}'s reservation on item {item}");
    } else {
        println!("Requester {requester} holds no reservation on item {item}");
    }
    Ok(())
}

pub async fn run_cancel_reservation(controller: &AdmissionController, id: i64) -> Result<()> {
    if controller.cancel_reservation(id).await? {
        println!("Cancelled reservation {id}");
    } else {
        println!("No reservation {id}");
    }
    Ok(())
}
