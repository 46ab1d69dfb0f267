//! Disk manager for page-level file I/O.

use lodestone_common::page::{PageId, PAGE_SIZE};
use lodestone_common::{LodestoneError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Synchronous page I/O against stable page identities.
///
/// The buffer pool talks to storage exclusively through this trait, so tests
/// can substitute recording or failing implementations.
pub trait DiskManager: Send + Sync {
    /// Reads the page into `buf`.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes the page from `buf`.
    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Reserves a new on-disk page identity.
    fn allocate_page(&self) -> Result<PageId>;

    /// Releases an on-disk page identity.
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;
}

/// Configuration for the file-backed disk manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiskManagerConfig {
    /// Path to the database file.
    pub db_path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for FileDiskManagerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./lodestone.db"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages within a single database file.
///
/// A page's file offset is `page_id * PAGE_SIZE`. Reads past the current end
/// of file yield a zeroed page rather than an error, so a freshly minted
/// page id can be fetched before its first flush.
pub struct FileDiskManager {
    /// Configuration.
    config: FileDiskManagerConfig,
    /// Open database file and its current page count.
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    num_pages: i64,
}

impl FileDiskManager {
    /// Opens or creates the database file.
    pub fn new(config: FileDiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as i64;

        Ok(Self {
            config,
            inner: Mutex::new(FileInner { file, num_pages }),
        })
    }

    /// Opens the database file at `path` with fsync enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(FileDiskManagerConfig {
            db_path: path.as_ref().to_path_buf(),
            fsync_enabled: true,
        })
    }

    /// Returns the database file path.
    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Returns the number of pages currently materialized in the file.
    pub fn num_pages(&self) -> i64 {
        self.inner.lock().num_pages
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(LodestoneError::PageNotFound { page_id: page_id.0 });
        }

        let mut inner = self.inner.lock();
        if page_id.0 >= inner.num_pages {
            // The page was minted but never flushed; hand back zeroes.
            warn!(%page_id, "read past end of file, returning zeroed page");
            buf.fill(0);
            return Ok(());
        }

        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(LodestoneError::PageNotFound { page_id: page_id.0 });
        }

        let mut inner = self.inner.lock();
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(buf)?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        if page_id.0 >= inner.num_pages {
            inner.num_pages = page_id.0 + 1;
        }

        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let page_id = PageId(inner.num_pages);

        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        inner.num_pages += 1;
        Ok(page_id)
    }

    fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        // The file is never shrunk; the page id simply goes out of use
        // until a future free-page map reclaims it.
        Ok(())
    }
}

impl Drop for FileDiskManager {
    fn drop(&mut self) {
        let _ = self.inner.lock().file.sync_all();
    }
}
