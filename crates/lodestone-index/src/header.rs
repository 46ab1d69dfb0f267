//! Header page: index name to root page id records.
//!
//! The page at `PageId::HEADER` stores a small directory of `(name, root)`
//! records so an index can find its root again after a restart. A zeroed
//! page is a valid empty header, which is exactly what a fresh database
//! file reads as.
//!
//! Layout:
//!
//! ```text
//! +-------------------------+ 0
//! | record_count: 4         |
//! +-------------------------+ 4
//! | name: 32  root: 8       |  * record_count
//! +-------------------------+
//! ```

use lodestone_common::codec::FixedCodec;
use lodestone_common::page::{PageId, PAGE_SIZE};
use lodestone_common::{LodestoneError, Result};

const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

/// Maximum length of an index name.
pub const MAX_NAME_LEN: usize = 32;

const RECORD_SIZE: usize = MAX_NAME_LEN + PageId::ENCODED_SIZE;

/// Maximum number of records a header page can hold.
pub const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Mutable view over the header page's bytes.
pub struct HeaderView<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderView<'a> {
    /// Attaches to a header page. A zeroed page reads as zero records.
    pub fn attach(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Returns the number of records.
    pub fn record_count(&self) -> usize {
        u32::from_le_bytes([
            self.data[COUNT_OFFSET],
            self.data[COUNT_OFFSET + 1],
            self.data[COUNT_OFFSET + 2],
            self.data[COUNT_OFFSET + 3],
        ]) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let offset = Self::record_offset(index);
        let name = &self.data[offset..offset + MAX_NAME_LEN];
        let len = name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        &name[..len]
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    fn write_record(&mut self, index: usize, name: &str, root: PageId) {
        let offset = Self::record_offset(index);
        self.data[offset..offset + MAX_NAME_LEN].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        root.encode_to(&mut self.data[offset + MAX_NAME_LEN..offset + RECORD_SIZE]);
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(LodestoneError::Internal(format!(
                "index name must be 1..={MAX_NAME_LEN} bytes: {name:?}"
            )));
        }
        Ok(())
    }

    /// Returns the root page id recorded for `name`.
    pub fn root_page_id(&self, name: &str) -> Option<PageId> {
        let index = self.find_record(name)?;
        let offset = Self::record_offset(index) + MAX_NAME_LEN;
        Some(PageId::decode_from(&self.data[offset..offset + 8]))
    }

    /// Adds a record. Fails if the name exists or the page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<()> {
        Self::check_name(name)?;
        if self.find_record(name).is_some() {
            return Err(LodestoneError::DuplicateKey);
        }

        let count = self.record_count();
        if count >= MAX_RECORDS {
            return Err(LodestoneError::HeaderFull {
                capacity: MAX_RECORDS,
            });
        }

        self.write_record(count, name, root);
        self.set_record_count(count + 1);
        Ok(())
    }

    /// Overwrites the root page id of an existing record.
    pub fn update_record(&mut self, name: &str, root: PageId) -> Result<()> {
        Self::check_name(name)?;
        let Some(index) = self.find_record(name) else {
            return Err(LodestoneError::RecordNotFound(name.to_string()));
        };

        self.write_record(index, name, root);
        Ok(())
    }

    /// Removes a record, compacting the tail over it.
    pub fn delete_record(&mut self, name: &str) -> Result<()> {
        let Some(index) = self.find_record(name) else {
            return Err(LodestoneError::RecordNotFound(name.to_string()));
        };

        let count = self.record_count();
        let src = Self::record_offset(index + 1);
        let dst = Self::record_offset(index);
        let tail = (count - index - 1) * RECORD_SIZE;
        self.data.copy_within(src..src + tail, dst);
        self.set_record_count(count - 1);
        Ok(())
    }
}
