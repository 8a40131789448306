//! `seatgate reconcile <item>` – rebuild cached counts from the database.

use anyhow::Result;
use seatgate_core::AdmissionController;

pub async fn run_reconcile(controller: &AdmissionController, item: i64) -> Result<()> {
    let a = controller.reconcile(item).await?;
    println!(
        "Item {item}: {}/{} confirmed, {} waiting",
        a.confirmed_count, a.limit, a.waitlist_len
    );
    Ok(())
}
