//! `seatgate status [item]` – capacity overview.

use anyhow::Result;
use seatgate_core::ReservationService;

pub async fn run_status(service: &ReservationService, item: Option<i64>) -> Result<()> {
    if let Some(item) = item {
        let a = service.controller().availability(item).await?;
        println!("Item {item}");
        println!("  limit:      {}", a.limit);
        println!("  confirmed:  {}", a.confirmed_count);
        println!("  remaining:  {}", a.remaining());
        println!("  waitlisted: {}", a.waitlist_len);
        return Ok(());
    }

    let items = service.list_items().await?;
    if items.is_empty() {
        println!("No items defined.");
    } else {
        println!("{:<8} {:<8} {:<10}", "ITEM", "LIMIT", "CONFIRMED");
        for i in items {
            println!("{:<8} {:<8} {:<10}", i.id, i.limit, i.confirmed_count);
        }
    }
    Ok(())
}
