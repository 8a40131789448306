//! CLI command handlers, one file per command.

mod cancel;
mod item;
mod load;
mod promote;
mod reconcile;
mod reserve;
mod status;
mod waitlist;

pub use cancel::{run_cancel, run_cancel_reservation};
pub use item::run_item;
pub use load::{run_load, LoadOptions};
pub use promote::run_promote;
pub use reconcile::run_reconcile;
pub use reserve::run_reserve;
pub use status::run_status;
pub use waitlist::run_waitlist;
