//! `seatgate waitlist <item>` – show the queue behind a full item.

use anyhow::Result;
use seatgate_core::AdmissionController;

pub async fn run_waitlist(controller: &AdmissionController, item: i64) -> Result<()> {
    let entries = controller.waitlist_entries(item).await?;
    if entries.is_empty() {
        println!("Waitlist for item {item} is empty.");
        return Ok(());
    }
    println!("{:<6} {:<12} {}", "POS", "REQUESTER", "SINCE");
    for (i, e) in entries.iter().enumerate() {
        println!("{:<6} {:<12} {}", i + 1, e.requester_id, e.enqueued_at);
    }
    Ok(())
}
