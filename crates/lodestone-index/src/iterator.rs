//! Ordered forward iteration over B+Tree leaves.

use lodestone_common::codec::FixedCodec;
use lodestone_common::page::PageId;
use lodestone_buffer::BufferPoolManager;
use crate::node::LeafView;
use std::marker::PhantomData;
use std::sync::Arc;

/// Forward iterator over `(key, value)` pairs in key order.
///
/// A non-end iterator owns exactly one pin, on the leaf it currently reads.
/// Advancing past a leaf's last entry hands the pin to the successor leaf
/// through the sibling link; exhausting the rightmost leaf (or dropping the
/// iterator early) releases it.
pub struct IndexIterator<K, V> {
    bpm: Arc<BufferPoolManager>,
    /// Leaf currently pinned, invalid once exhausted.
    page_id: PageId,
    /// Next entry to yield within the current leaf.
    index: usize,
    _marker: PhantomData<(K, V)>,
}

impl<K: FixedCodec, V: FixedCodec> IndexIterator<K, V> {
    /// Builds an iterator positioned at `index` within the leaf `page_id`.
    ///
    /// Takes over a pin on that leaf which the caller has already acquired.
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, index: usize) -> Self {
        Self {
            bpm,
            page_id,
            index,
            _marker: PhantomData,
        }
    }

    /// Builds the exhausted sentinel iterator.
    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            page_id: PageId::INVALID,
            index: 0,
            _marker: PhantomData,
        }
    }

    /// Returns true once the iterator has passed the last entry.
    pub fn is_end(&self) -> bool {
        !self.page_id.is_valid()
    }
}

impl<K: FixedCodec, V: FixedCodec> Iterator for IndexIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        while self.page_id.is_valid() {
            let Some(frame) = self.bpm.pinned_frame(self.page_id) else {
                self.page_id = PageId::INVALID;
                return None;
            };

            let (entry, next_page_id) = {
                let mut data = frame.write_data();
                let leaf = LeafView::<K, V>::attach(&mut data[..]);
                if self.index < leaf.size() {
                    let pair = (leaf.key_at(self.index), leaf.value_at(self.index));
                    (Some(pair), PageId::INVALID)
                } else {
                    (None, leaf.next_page_id())
                }
            };

            if let Some(entry) = entry {
                self.index += 1;
                return Some(entry);
            }

            // Current leaf exhausted: hand the pin over the sibling link.
            let current = self.page_id;
            self.page_id = PageId::INVALID;
            self.index = 0;
            self.bpm.unpin_page(current, false);
            if next_page_id.is_valid() && self.bpm.fetch_page(next_page_id).is_ok() {
                self.page_id = next_page_id;
            }
        }
        None
    }
}

impl<K, V> Drop for IndexIterator<K, V> {
    fn drop(&mut self) {
        if self.page_id.is_valid() {
            self.bpm.unpin_page(self.page_id, false);
        }
    }
}
