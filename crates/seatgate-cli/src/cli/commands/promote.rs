//! `seatgate promote <item>` – fill free slots from the waitlist.

use anyhow::Result;
use seatgate_core::AdmissionController;

pub async fn run_promote(controller: &AdmissionController, item: i64) -> Result<()> {
    let promoted = controller.promote_waitlist(item).await?;
    if promoted.is_empty() {
        println!("Nothing to promote for item {item}");
    }
    for r in promoted {
        println!("Promoted requester {} (reservation {})", r.requester_id, r.id);
    }
    Ok(())
}
