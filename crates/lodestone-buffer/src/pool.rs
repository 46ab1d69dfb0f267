//! Buffer pool manager.

use crate::disk::DiskManager;
use crate::frame::{BufferFrame, FrameId};
use crate::hash_table::ExtendibleHashTable;
use crate::replacer::{LruKReplacer, Replacer};
use lodestone_common::page::{PageId, PAGE_SIZE};
use lodestone_common::{LodestoneError, Result, StorageConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;
use tracing::debug;

/// Entries per bucket in the page table.
const PAGE_TABLE_BUCKET_SIZE: usize = 8;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
    /// History depth K for the LRU-K replacer.
    pub replacer_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_frames: 1024,
            replacer_k: 2,
        }
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            num_frames: config.buffer_pool_pages,
            replacer_k: config.replacer_k,
        }
    }
}

/// State the pool mutex guards: frame allocation and page id minting.
struct PoolState {
    /// Frames not holding any page.
    free_list: Vec<FrameId>,
    /// Next page id to mint. Page 0 is reserved for the header page.
    next_page_id: i64,
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping through an extendible hash table
/// - Free frame list for unreclaimed frames
/// - LRU-K replacement for eviction
/// - Pin counting for concurrent access
///
/// Every public method holds the pool mutex for its full duration, disk I/O
/// included, so structural decisions never race. A frame handed out under a
/// pin stays valid until the matching unpin; pinned frames are never chosen
/// for eviction.
pub struct BufferPoolManager {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Page replacement policy.
    replacer: LruKReplacer,
    /// Free list and page id counter.
    state: Mutex<PoolState>,
    /// Backing storage.
    disk: Arc<dyn DiskManager>,
}

impl BufferPoolManager {
    /// Creates a new buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskManager>) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list.
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            replacer: LruKReplacer::new(num_frames, config.replacer_k),
            config,
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            state: Mutex::new(PoolState {
                free_list,
                next_page_id: PageId::HEADER.0 + 1,
            }),
            disk,
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames to ensure useful caching even on low-memory
    /// systems.
    pub fn auto_sized(disk: Arc<dyn DiskManager>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(
            BufferPoolConfig {
                num_frames,
                ..Default::default()
            },
            disk,
        )
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(&page_id)
    }

    /// Picks a frame for reuse: the free list first, then an eviction
    /// victim. A dirty victim is written back before its frame is handed
    /// out, and the victim's page table mapping is dropped.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let Some(victim_id) = self.replacer.evict() else {
            return Err(LodestoneError::BufferPoolFull);
        };

        let frame = &self.frames[victim_id.0 as usize];
        let old_page_id = frame.page_id();

        if frame.is_dirty() && old_page_id.is_valid() {
            debug!(page_id = %old_page_id, frame_id = %victim_id, "writing back dirty page on eviction");
            let data = frame.read_data();
            if let Err(e) = self.disk.write_page(old_page_id, &data) {
                // Put the victim back so the pool stays consistent.
                drop(data);
                self.replacer.record_access(victim_id);
                self.replacer.set_evictable(victim_id, true);
                return Err(e);
            }
        }

        if old_page_id.is_valid() {
            self.page_table.remove(&old_page_id);
        }

        Ok(victim_id)
    }

    /// Allocates a brand-new page and pins it.
    ///
    /// The returned frame holds zeroed bytes, pin count 1, and a freshly
    /// minted page id. Fails with `BufferPoolFull` when no frame is free
    /// and nothing is evictable.
    pub fn new_page(&self) -> Result<&BufferFrame> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = PageId(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(frame)
    }

    /// Fetches a page, reading it from disk if it is not resident.
    ///
    /// The page is pinned before being returned. Fails with
    /// `BufferPoolFull` when the page is not resident and no frame can be
    /// reclaimed.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(frame);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();

        {
            let mut data = frame.write_data();
            if let Err(e) = self.disk.read_page(page_id, &mut data) {
                drop(data);
                state.free_list.push(frame_id);
                return Err(e);
            }
        }

        frame.set_page_id(page_id);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(frame)
    }

    /// Returns the frame of a page the caller already holds a pin on.
    ///
    /// Does not touch the pin count or the replacer. Returns None if the
    /// page is not resident; a page under a live pin always is.
    pub fn pinned_frame(&self, page_id: PageId) -> Option<&BufferFrame> {
        let _state = self.state.lock();
        let frame_id = self.page_table.find(&page_id)?;
        Some(&self.frames[frame_id.0 as usize])
    }

    /// Releases one pin on a page, folding `is_dirty` into its dirty flag.
    ///
    /// Returns false if the page is not resident or its pin count is
    /// already zero. When the last pin drops the frame becomes evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.0 as usize];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }

        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }

        true
    }

    /// Writes a page to disk regardless of its dirty flag and clears it.
    ///
    /// Returns `Ok(false)` if the page is not resident. The pin count is
    /// left untouched.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let _state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };

        let frame = &self.frames[frame_id.0 as usize];
        {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)?;
        }
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every resident dirty page.
    ///
    /// Returns the number of pages written.
    pub fn flush_all(&self) -> Result<usize> {
        let _state = self.state.lock();

        let mut flushed = 0;
        for frame in &self.frames {
            let page_id = frame.page_id();
            if page_id.is_valid() && frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(page_id, &data)?;
                drop(data);
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        Ok(flushed)
    }

    /// Deletes a page from the buffer pool and deallocates it on disk.
    ///
    /// Returns `Ok(true)` if the page is gone afterwards, which includes
    /// the vacuous case of a page that was never resident. Returns
    /// `Ok(false)` if the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };

        let frame = &self.frames[frame_id.0 as usize];
        if frame.is_pinned() {
            return Ok(false);
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push(frame_id);

        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns a read guard for a page, pinning it for the guard's
    /// lifetime.
    pub fn read_page(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageReadGuard {
            pool: self,
            page_id,
            frame,
        })
    }

    /// Returns a write guard for a page, pinning it for the guard's
    /// lifetime.
    pub fn write_page(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageWriteGuard {
            pool: self,
            page_id,
            frame,
        })
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();

        let mut used_frames = 0;
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;
        for frame in &self.frames {
            if frame.page_id().is_valid() {
                used_frames += 1;
                if frame.is_pinned() {
                    pinned_frames += 1;
                }
                if frame.is_dirty() {
                    dirty_frames += 1;
                }
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: state.free_list.len(),
            used_frames,
            pinned_frames,
            dirty_frames,
            evictable_frames: self.replacer.size(),
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
    /// Number of frames the replacer may evict.
    pub evictable_frames: usize,
}

/// RAII guard for reading a page.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame: &'a BufferFrame,
}

impl<'a> PageReadGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard for writing a page.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame: &'a BufferFrame,
}

impl<'a> PageWriteGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns mutable access to page data.
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.write_data()
    }

    /// Marks the page as dirty.
    pub fn set_dirty(&self) {
        self.frame.set_dirty(true);
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.frame.is_dirty());
    }
}
