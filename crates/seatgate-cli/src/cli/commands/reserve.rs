//! `seatgate reserve <item> <requester>` – submit one admission.

use anyhow::Result;
use seatgate_core::{Admission, AdmissionController};

pub async fn run_reserve(
    controller: &AdmissionController,
    item: i64,
    requester: i64,
) -> Result<()> {
    match controller.submit_admission(item, requester).await? {
        Admission::Admitted(r) => {
            println!("Admitted: reservation {} for requester {requester} on item {item}", r.id)
        }
        Admission::AlreadyAdmitted(r) => {
            println!("Already admitted: reservation {} for requester {requester} on item {item}", r.id)
        }
        Admission::Waitlisted { position } => {
            println!("Item {item} is full; requester {requester} is number {position} in the waitlist")
        }
    }
    Ok(())
}
