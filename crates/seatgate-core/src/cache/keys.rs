//! Key layout shared by every cache backend.

use crate::types::ItemId;

pub fn count_key(item: ItemId) -> String {
    format!("itemId:{item}")
}

pub fn limit_key(item: ItemId) -> String {
    format!("itemLimit:{item}")
}

pub fn waitlist_key(item: ItemId) -> String {
    format!("waitlist:{item}")
}

/// Mutex resource key for an item's exclusive section.
pub fn lock_key(item: ItemId) -> String {
    format!("lock:item:{item}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        assert_eq!(count_key(12), "itemId:12");
        assert_eq!(limit_key(12), "itemLimit:12");
        assert_eq!(waitlist_key(12), "waitlist:12");
        assert_eq!(lock_key(12), "lock:item:12");
    }
}
