//! Record identifiers.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Identifies a record by the page it lives on and its slot within that page.
///
/// B+Tree leaf entries map keys to `Rid`s; the index never interprets the
/// slot beyond equality.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Rid {
    /// Page holding the record.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl Rid {
    /// Creates a new record identifier.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_new() {
        let rid = Rid::new(PageId(3), 7);
        assert_eq!(rid.page_id, PageId(3));
        assert_eq!(rid.slot, 7);
    }

    #[test]
    fn test_rid_default_is_invalid() {
        let rid = Rid::default();
        assert!(!rid.page_id.is_valid());
        assert_eq!(rid.slot, 0);
    }

    #[test]
    fn test_rid_display() {
        let rid = Rid::new(PageId(5), 123);
        assert_eq!(rid.to_string(), "page:5:123");
    }

    #[test]
    fn test_rid_ordering() {
        assert!(Rid::new(PageId(1), 9) < Rid::new(PageId(2), 0));
        assert!(Rid::new(PageId(1), 0) < Rid::new(PageId(1), 1));
    }
}
