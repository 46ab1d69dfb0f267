//! Page identity and size constants for LodestoneDB storage.

use serde::{Deserialize, Serialize};

/// Size of a page in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Unique identifier for a page in the database file.
///
/// Page ids are minted by the buffer pool from a monotonic counter and map
/// directly to file offsets (`page_id * PAGE_SIZE`). Negative ids are never
/// allocated; `-1` is the invalid sentinel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PageId(pub i64);

impl PageId {
    /// Invalid page ID.
    pub const INVALID: PageId = PageId(-1);

    /// The header page holding index name to root page id records.
    pub const HEADER: PageId = PageId(0);

    /// Returns true if this is a valid page ID.
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for PageId {
    fn default() -> Self {
        PageId::INVALID
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_page_id_validity() {
        assert!(PageId(0).is_valid());
        assert!(PageId(1).is_valid());
        assert!(PageId::HEADER.is_valid());
        assert!(!PageId::INVALID.is_valid());
        assert!(!PageId(-7).is_valid());
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId(42).to_string(), "page:42");
        assert_eq!(PageId::INVALID.to_string(), "page:-1");
    }

    #[test]
    fn test_page_id_ordering() {
        assert!(PageId(1) < PageId(2));
        assert!(PageId::INVALID < PageId::HEADER);
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId(1));
        set.insert(PageId(2));
        set.insert(PageId(1));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
