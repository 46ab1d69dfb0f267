//! Buffer pool management for LodestoneDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable page count
//! - LRU-K eviction policy for cache management
//! - Extendible hashing for the page table
//! - Pin counting for concurrent access
//! - Dirty page tracking for write-back

mod disk;
mod frame;
mod hash_table;
mod pool;
mod replacer;

pub use disk::{DiskManager, FileDiskManager, FileDiskManagerConfig};
pub use frame::{BufferFrame, FrameId};
pub use hash_table::ExtendibleHashTable;
pub use pool::{
    BufferPoolConfig, BufferPoolManager, BufferPoolStats, PageReadGuard, PageWriteGuard,
};
pub use replacer::{LruKReplacer, Replacer};
