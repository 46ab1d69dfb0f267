//! Configuration structures for LodestoneDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the database file.
    pub db_path: PathBuf,
    /// Buffer pool size in number of pages.
    pub buffer_pool_pages: usize,
    /// History depth K for the LRU-K replacement policy.
    pub replacer_k: usize,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./lodestone.db"),
            buffer_pool_pages: 1024, // 4 MB with 4 KB pages
            replacer_k: 2,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_pages * crate::page::PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./lodestone.db"));
        assert_eq!(config.buffer_pool_pages, 1024);
        assert_eq!(config.replacer_k, 2);
        assert!(config.fsync_enabled);
    }

    #[test]
    fn test_buffer_pool_size_bytes() {
        let config = StorageConfig {
            buffer_pool_pages: 256,
            ..Default::default()
        };
        assert_eq!(config.buffer_pool_size_bytes(), 256 * 4096);
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let config = StorageConfig {
            db_path: PathBuf::from("/tmp/test.db"),
            buffer_pool_pages: 64,
            replacer_k: 3,
            fsync_enabled: false,
        };

        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(config.db_path, deserialized.db_path);
        assert_eq!(config.buffer_pool_pages, deserialized.buffer_pool_pages);
        assert_eq!(config.replacer_k, deserialized.replacer_k);
        assert_eq!(config.fsync_enabled, deserialized.fsync_enabled);
    }
}
