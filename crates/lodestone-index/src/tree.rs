//! Disk-resident B+Tree.
//!
//! The tree lives entirely in buffer pool pages: traversal fetches a page,
//! reads it through a typed node view, picks the child, unpins, and
//! descends. Structural changes allocate pages through the pool and link
//! them by page id, never by pointer, so parent chasing also goes through
//! the pool.
//!
//! Single-writer model: lookups and iteration may run concurrently with
//! each other, but at most one mutating operation is in flight at a time.

use crate::header::HeaderView;
use crate::iterator::IndexIterator;
use crate::key::KeyComparator;
use crate::node::{self, InternalView, LeafView, NodeKind};
use lodestone_buffer::{BufferFrame, BufferPoolManager};
use lodestone_common::codec::FixedCodec;
use lodestone_common::page::PageId;
use lodestone_common::{LodestoneError, Result};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What a leaf-level mutation left behind.
enum LeafOutcome {
    /// Key already present (insert) or absent (remove).
    Untouched,
    /// Mutation applied, node within bounds.
    Done,
    /// Mutation applied, node needs a structural fix.
    Rebalance,
}

/// B+Tree index over fixed-width keys and values.
///
/// Keys are unique; inserting an existing key fails. The root page id is
/// persisted in the header page under the index name, so reopening an index
/// over flushed pages finds its data again.
pub struct BPlusTree<K, V, C> {
    index_name: String,
    root_page_id: AtomicI64,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: u32,
    internal_max_size: u32,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: FixedCodec,
    V: FixedCodec,
    C: KeyComparator<K>,
{
    /// Opens the index named `name`, creating it empty if the header page
    /// has no record of it yet.
    pub fn new(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Result<Self> {
        assert!(leaf_max_size >= 2, "leaf_max_size must be at least 2");
        assert!(
            internal_max_size >= 3,
            "internal_max_size must be at least 3"
        );

        let header_frame = bpm.fetch_page(PageId::HEADER)?;
        let root_page_id = {
            let mut data = header_frame.write_data();
            let header = HeaderView::attach(&mut data[..]);
            header.root_page_id(name).unwrap_or(PageId::INVALID)
        };
        bpm.unpin_page(PageId::HEADER, false);

        Ok(Self {
            index_name: name.to_string(),
            root_page_id: AtomicI64::new(root_page_id.0),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        })
    }

    /// Returns the current root page id, invalid for an empty tree.
    pub fn root_page_id(&self) -> PageId {
        PageId(self.root_page_id.load(Ordering::Acquire))
    }

    fn set_root_page_id(&self, page_id: PageId) {
        self.root_page_id.store(page_id.0, Ordering::Release);
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Point lookup: returns the values stored under `key`.
    ///
    /// Keys are unique, so the result holds at most one element.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let leaf_frame = self.find_leaf(key)?;
        let leaf_page_id = leaf_frame.page_id();

        let found = {
            let mut data = leaf_frame.write_data();
            let leaf = LeafView::<K, V>::attach(&mut data[..]);
            leaf.lookup(key, &self.comparator).map(|i| leaf.value_at(i))
        };
        self.bpm.unpin_page(leaf_page_id, false);

        Ok(found.into_iter().collect())
    }

    /// Descends from the root to the leaf covering `key`.
    ///
    /// The returned leaf is pinned; every interior page visited on the way
    /// down has been unpinned again.
    fn find_leaf(&self, key: &K) -> Result<&BufferFrame> {
        let mut frame = self.bpm.fetch_page(self.root_page_id())?;

        loop {
            let child = {
                let mut data = frame.write_data();
                match node::node_kind(&data[..]) {
                    NodeKind::Leaf => None,
                    NodeKind::Internal => {
                        let internal = InternalView::<K>::attach(&mut data[..]);
                        Some(internal.lookup(key, &self.comparator))
                    }
                    NodeKind::Invalid => {
                        let page_id = frame.page_id();
                        drop(data);
                        self.bpm.unpin_page(page_id, false);
                        return Err(LodestoneError::TreeCorrupted(format!(
                            "unformatted page {page_id} on search path"
                        )));
                    }
                }
            };

            let Some(child) = child else {
                return Ok(frame);
            };

            let parent_page_id = frame.page_id();
            let child_frame = match self.bpm.fetch_page(child) {
                Ok(f) => f,
                Err(e) => {
                    self.bpm.unpin_page(parent_page_id, false);
                    return Err(e);
                }
            };
            self.bpm.unpin_page(parent_page_id, false);
            frame = child_frame;
        }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts a key-value pair.
    ///
    /// Returns `Ok(false)` if the key already exists. Allocation failures
    /// surface as errors; pins taken before the failure are released.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        if self.is_empty() {
            return self.start_new_tree(key, value);
        }
        self.insert_into_leaf(key, value)
    }

    /// Creates a single-leaf tree holding the first entry.
    fn start_new_tree(&self, key: &K, value: &V) -> Result<bool> {
        let frame = self.bpm.new_page()?;
        let page_id = frame.page_id();

        {
            let mut data = frame.write_data();
            let mut leaf =
                LeafView::<K, V>::init(&mut data[..], page_id, PageId::INVALID, self.leaf_max_size);
            leaf.insert(key, value, &self.comparator);
        }

        self.set_root_page_id(page_id);
        let persisted = self.persist_root_page_id(true);
        self.bpm.unpin_page(page_id, true);
        persisted?;

        debug!(index = %self.index_name, root = %page_id, "started new tree");
        Ok(true)
    }

    fn insert_into_leaf(&self, key: &K, value: &V) -> Result<bool> {
        let leaf_frame = self.find_leaf(key)?;
        let leaf_page_id = leaf_frame.page_id();

        let outcome = {
            let mut data = leaf_frame.write_data();
            let mut leaf = LeafView::<K, V>::attach(&mut data[..]);
            if !leaf.insert(key, value, &self.comparator) {
                LeafOutcome::Untouched
            } else if leaf.size() >= leaf.max_size() {
                LeafOutcome::Rebalance
            } else {
                LeafOutcome::Done
            }
        };

        match outcome {
            LeafOutcome::Untouched => {
                self.bpm.unpin_page(leaf_page_id, false);
                Ok(false)
            }
            LeafOutcome::Done => {
                self.bpm.unpin_page(leaf_page_id, true);
                Ok(true)
            }
            LeafOutcome::Rebalance => {
                self.split_leaf(leaf_frame)?;
                Ok(true)
            }
        }
    }

    /// Splits a full leaf, relinks the sibling chain, and promotes the new
    /// leaf's first key. Consumes the caller's pin on `leaf_frame`.
    fn split_leaf(&self, leaf_frame: &BufferFrame) -> Result<()> {
        let leaf_page_id = leaf_frame.page_id();

        let new_frame = match self.bpm.new_page() {
            Ok(f) => f,
            Err(e) => {
                self.bpm.unpin_page(leaf_page_id, true);
                return Err(e);
            }
        };
        let new_page_id = new_frame.page_id();

        let (split_key, parent_page_id) = {
            let mut leaf_data = leaf_frame.write_data();
            let mut new_data = new_frame.write_data();

            let mut leaf = LeafView::<K, V>::attach(&mut leaf_data[..]);
            let parent_page_id = leaf.parent_page_id();
            let mut new_leaf = LeafView::<K, V>::init(
                &mut new_data[..],
                new_page_id,
                parent_page_id,
                self.leaf_max_size,
            );

            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(new_page_id);
            let split_key = leaf.move_half_to(&mut new_leaf);
            (split_key, parent_page_id)
        };

        let result = self.insert_into_parent(leaf_page_id, parent_page_id, split_key, new_page_id);
        self.bpm.unpin_page(new_page_id, true);
        self.bpm.unpin_page(leaf_page_id, true);
        result
    }

    /// Splits a full internal node. Consumes the caller's pin on `frame`.
    fn split_internal(&self, frame: &BufferFrame) -> Result<()> {
        let page_id = frame.page_id();

        let new_frame = match self.bpm.new_page() {
            Ok(f) => f,
            Err(e) => {
                self.bpm.unpin_page(page_id, true);
                return Err(e);
            }
        };
        let new_page_id = new_frame.page_id();

        let (split_key, parent_page_id, moved_children) = {
            let mut data = frame.write_data();
            let mut new_data = new_frame.write_data();

            let mut internal = InternalView::<K>::attach(&mut data[..]);
            let parent_page_id = internal.parent_page_id();
            let mut new_internal = InternalView::<K>::init(
                &mut new_data[..],
                new_page_id,
                parent_page_id,
                self.internal_max_size,
            );

            let split_key = internal.move_half_to(&mut new_internal);
            let moved: Vec<PageId> = (0..new_internal.size())
                .map(|i| new_internal.value_at(i))
                .collect();
            (split_key, parent_page_id, moved)
        };

        let result = moved_children
            .into_iter()
            .try_for_each(|child| self.set_parent(child, new_page_id))
            .and_then(|_| {
                self.insert_into_parent(page_id, parent_page_id, split_key, new_page_id)
            });
        self.bpm.unpin_page(new_page_id, true);
        self.bpm.unpin_page(page_id, true);
        result
    }

    /// Hooks a freshly split-off node into the tree: either grows a new
    /// root above the old one or inserts the separator into the existing
    /// parent, splitting it in turn if it overflows.
    ///
    /// Both split halves stay pinned by the caller throughout.
    fn insert_into_parent(
        &self,
        old_page_id: PageId,
        parent_page_id: PageId,
        key: K,
        new_page_id: PageId,
    ) -> Result<()> {
        if !parent_page_id.is_valid() {
            // The old node was the root: grow the tree by one level.
            let root_frame = self.bpm.new_page()?;
            let root_page_id = root_frame.page_id();

            {
                let mut data = root_frame.write_data();
                let mut root = InternalView::<K>::init(
                    &mut data[..],
                    root_page_id,
                    PageId::INVALID,
                    self.internal_max_size,
                );
                root.populate_new_root(old_page_id, &key, new_page_id);
            }

            let result = self
                .set_parent(old_page_id, root_page_id)
                .and_then(|_| self.set_parent(new_page_id, root_page_id))
                .and_then(|_| {
                    self.set_root_page_id(root_page_id);
                    self.persist_root_page_id(false)
                });
            self.bpm.unpin_page(root_page_id, true);

            debug!(index = %self.index_name, root = %root_page_id, "grew new root");
            return result;
        }

        let parent_frame = self.bpm.fetch_page(parent_page_id)?;

        let overflow = {
            let mut data = parent_frame.write_data();
            let mut parent = InternalView::<K>::attach(&mut data[..]);
            parent.insert_node_after(old_page_id, &key, new_page_id);
            parent.size() >= parent.max_size()
        };

        if let Err(e) = self.set_parent(new_page_id, parent_page_id) {
            self.bpm.unpin_page(parent_page_id, true);
            return Err(e);
        }

        if overflow {
            // split_internal consumes the parent pin.
            self.split_internal(parent_frame)
        } else {
            self.bpm.unpin_page(parent_page_id, true);
            Ok(())
        }
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes a key. Removing an absent key is a silent success.
    pub fn remove(&self, key: &K) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let leaf_frame = self.find_leaf(key)?;
        let leaf_page_id = leaf_frame.page_id();

        let outcome = {
            let mut data = leaf_frame.write_data();
            let mut leaf = LeafView::<K, V>::attach(&mut data[..]);
            match leaf.lookup(key, &self.comparator) {
                None => LeafOutcome::Untouched,
                Some(index) => {
                    leaf.remove_at(index);
                    if leaf.size() < leaf.min_size() {
                        LeafOutcome::Rebalance
                    } else {
                        LeafOutcome::Done
                    }
                }
            }
        };

        match outcome {
            LeafOutcome::Untouched => {
                self.bpm.unpin_page(leaf_page_id, false);
                Ok(())
            }
            LeafOutcome::Done => {
                self.bpm.unpin_page(leaf_page_id, true);
                Ok(())
            }
            LeafOutcome::Rebalance => self.coalesce_or_redistribute(leaf_frame),
        }
    }

    /// Fixes an underflowing node by merging with or borrowing from a
    /// sibling; the root is handled by `adjust_root` instead. Consumes the
    /// caller's pin on `frame`.
    fn coalesce_or_redistribute(&self, frame: &BufferFrame) -> Result<()> {
        let page_id = frame.page_id();

        let (kind, size, parent_page_id) = {
            let mut data = frame.write_data();
            match Self::node_header(&mut data[..]) {
                Some(header) => header,
                None => {
                    drop(data);
                    self.bpm.unpin_page(page_id, true);
                    return Err(LodestoneError::TreeCorrupted(format!(
                        "unformatted page {page_id} in rebalance"
                    )));
                }
            }
        };

        if !parent_page_id.is_valid() {
            return self.adjust_root(frame);
        }

        let parent_frame = match self.bpm.fetch_page(parent_page_id) {
            Ok(f) => f,
            Err(e) => {
                self.bpm.unpin_page(page_id, true);
                return Err(e);
            }
        };

        // Prefer the left sibling; only the leftmost child pairs rightward.
        let (node_index, sibling_page_id) = {
            let mut data = parent_frame.write_data();
            let parent = InternalView::<K>::attach(&mut data[..]);
            let Some(node_index) = parent.value_index(page_id) else {
                drop(data);
                self.bpm.unpin_page(parent_page_id, false);
                self.bpm.unpin_page(page_id, true);
                return Err(LodestoneError::TreeCorrupted(format!(
                    "page {page_id} not a child of its parent {parent_page_id}"
                )));
            };
            let sibling_index = if node_index > 0 {
                node_index - 1
            } else {
                1
            };
            (node_index, parent.value_at(sibling_index))
        };

        let sibling_frame = match self.bpm.fetch_page(sibling_page_id) {
            Ok(f) => f,
            Err(e) => {
                self.bpm.unpin_page(parent_page_id, false);
                self.bpm.unpin_page(page_id, true);
                return Err(e);
            }
        };

        let sibling_size = {
            let mut data = sibling_frame.write_data();
            match Self::node_header(&mut data[..]) {
                Some((_, size, _)) => size,
                None => 0,
            }
        };

        let cap = match kind {
            NodeKind::Leaf => self.leaf_max_size,
            _ => self.internal_max_size,
        } as usize;

        if size + sibling_size <= cap {
            // Coalesce into the left-hand operand; the separator above the
            // right-hand one is removed from the parent.
            if node_index > 0 {
                self.coalesce(sibling_frame, frame, parent_frame, node_index)
            } else {
                self.coalesce(frame, sibling_frame, parent_frame, 1)
            }
        } else {
            self.redistribute(sibling_frame, frame, parent_frame, node_index)
        }
    }

    /// Merges `right_frame` into `left_frame`, removes the separator at
    /// `sep_index` from the parent, deletes the emptied page, and recurses
    /// on the parent if it underflows. Consumes all three pins.
    fn coalesce(
        &self,
        left_frame: &BufferFrame,
        right_frame: &BufferFrame,
        parent_frame: &BufferFrame,
        sep_index: usize,
    ) -> Result<()> {
        let left_page_id = left_frame.page_id();
        let right_page_id = right_frame.page_id();
        let parent_page_id = parent_frame.page_id();

        let kind = {
            let data = right_frame.write_data();
            node::node_kind(&data[..])
        };

        let merge_result = match kind {
            NodeKind::Leaf => {
                let mut left_data = left_frame.write_data();
                let mut right_data = right_frame.write_data();
                let mut left = LeafView::<K, V>::attach(&mut left_data[..]);
                let mut right = LeafView::<K, V>::attach(&mut right_data[..]);
                right.move_all_to(&mut left);
                Ok(())
            }
            NodeKind::Internal => {
                let (middle_key, children) = {
                    let mut parent_data = parent_frame.write_data();
                    let parent = InternalView::<K>::attach(&mut parent_data[..]);
                    let middle_key = parent.key_at(sep_index);
                    drop(parent_data);

                    let mut right_data = right_frame.write_data();
                    let right = InternalView::<K>::attach(&mut right_data[..]);
                    let children: Vec<PageId> =
                        (0..right.size()).map(|i| right.value_at(i)).collect();
                    (middle_key, children)
                };

                {
                    let mut left_data = left_frame.write_data();
                    let mut right_data = right_frame.write_data();
                    let mut left = InternalView::<K>::attach(&mut left_data[..]);
                    let mut right = InternalView::<K>::attach(&mut right_data[..]);
                    right.move_all_to(&mut left, &middle_key, &self.comparator);
                }

                children
                    .into_iter()
                    .try_for_each(|child| self.set_parent(child, left_page_id))
            }
            NodeKind::Invalid => Err(LodestoneError::TreeCorrupted(format!(
                "unformatted page {right_page_id} in coalesce"
            ))),
        };

        if let Err(e) = merge_result {
            self.bpm.unpin_page(right_page_id, true);
            self.bpm.unpin_page(left_page_id, true);
            self.bpm.unpin_page(parent_page_id, true);
            return Err(e);
        }

        let (parent_is_root, parent_underflow) = {
            let mut data = parent_frame.write_data();
            let mut parent = InternalView::<K>::attach(&mut data[..]);
            parent.remove_at(sep_index);
            (parent.is_root(), parent.size() < parent.min_size())
        };

        self.bpm.unpin_page(right_page_id, true);
        self.bpm.unpin_page(left_page_id, true);
        let deleted = self.bpm.delete_page(right_page_id).map(|_| ());

        let propagated = if parent_is_root {
            self.adjust_root(parent_frame)
        } else if parent_underflow {
            self.coalesce_or_redistribute(parent_frame)
        } else {
            self.bpm.unpin_page(parent_page_id, true);
            Ok(())
        };

        deleted.and(propagated)
    }

    /// Borrows one entry from `sibling_frame` into `node_frame` and fixes
    /// the separator between them. Consumes all three pins.
    fn redistribute(
        &self,
        sibling_frame: &BufferFrame,
        node_frame: &BufferFrame,
        parent_frame: &BufferFrame,
        node_index: usize,
    ) -> Result<()> {
        let node_page_id = node_frame.page_id();
        let sibling_page_id = sibling_frame.page_id();
        let parent_page_id = parent_frame.page_id();

        let kind = {
            let data = node_frame.write_data();
            node::node_kind(&data[..])
        };

        let result = match kind {
            NodeKind::Leaf => {
                let mut sibling_data = sibling_frame.write_data();
                let mut node_data = node_frame.write_data();
                let mut parent_data = parent_frame.write_data();
                let mut sibling = LeafView::<K, V>::attach(&mut sibling_data[..]);
                let mut node_view = LeafView::<K, V>::attach(&mut node_data[..]);
                let mut parent = InternalView::<K>::attach(&mut parent_data[..]);

                if node_index > 0 {
                    // Left sibling lends its last entry; the separator
                    // becomes the node's new first key.
                    sibling.move_last_to_front_of(&mut node_view);
                    parent.set_key_at(node_index, &node_view.key_at(0));
                } else {
                    // Right sibling lends its first entry.
                    sibling.move_first_to_end_of(&mut node_view);
                    parent.set_key_at(node_index + 1, &sibling.key_at(0));
                }
                Ok(())
            }
            NodeKind::Internal => {
                let borrowed_child = {
                    let mut sibling_data = sibling_frame.write_data();
                    let mut node_data = node_frame.write_data();
                    let mut parent_data = parent_frame.write_data();
                    let mut sibling = InternalView::<K>::attach(&mut sibling_data[..]);
                    let mut node_view = InternalView::<K>::attach(&mut node_data[..]);
                    let mut parent = InternalView::<K>::attach(&mut parent_data[..]);

                    if node_index > 0 {
                        let middle_key = parent.key_at(node_index);
                        let new_separator =
                            sibling.move_last_to_front_of(&mut node_view, &middle_key);
                        parent.set_key_at(node_index, &new_separator);
                        node_view.value_at(0)
                    } else {
                        let middle_key = parent.key_at(node_index + 1);
                        let new_separator =
                            sibling.move_first_to_end_of(&mut node_view, &middle_key);
                        parent.set_key_at(node_index + 1, &new_separator);
                        node_view.value_at(node_view.size() - 1)
                    }
                };

                // The borrowed subtree changed parents.
                self.set_parent(borrowed_child, node_page_id)
            }
            NodeKind::Invalid => Err(LodestoneError::TreeCorrupted(format!(
                "unformatted page {node_page_id} in redistribute"
            ))),
        };

        self.bpm.unpin_page(sibling_page_id, true);
        self.bpm.unpin_page(node_page_id, true);
        self.bpm.unpin_page(parent_page_id, true);
        result
    }

    /// Shrinks the tree at the top: an empty leaf root empties the tree,
    /// an internal root left with a single child hands the root role down.
    /// Consumes the caller's pin on `root_frame`.
    fn adjust_root(&self, root_frame: &BufferFrame) -> Result<()> {
        let root_page_id = root_frame.page_id();

        enum RootChange {
            EmptyTree,
            Promote(PageId),
            Keep,
        }

        let change = {
            let mut data = root_frame.write_data();
            match node::node_kind(&data[..]) {
                NodeKind::Leaf => {
                    let leaf = LeafView::<K, V>::attach(&mut data[..]);
                    if leaf.size() == 0 {
                        RootChange::EmptyTree
                    } else {
                        RootChange::Keep
                    }
                }
                NodeKind::Internal => {
                    let internal = InternalView::<K>::attach(&mut data[..]);
                    if internal.size() == 1 {
                        RootChange::Promote(internal.value_at(0))
                    } else {
                        RootChange::Keep
                    }
                }
                NodeKind::Invalid => {
                    drop(data);
                    self.bpm.unpin_page(root_page_id, true);
                    return Err(LodestoneError::TreeCorrupted(format!(
                        "unformatted root {root_page_id}"
                    )));
                }
            }
        };

        match change {
            RootChange::Keep => {
                self.bpm.unpin_page(root_page_id, true);
                Ok(())
            }
            RootChange::EmptyTree => {
                self.set_root_page_id(PageId::INVALID);
                let persisted = self.persist_root_page_id(false);
                self.bpm.unpin_page(root_page_id, true);
                self.bpm.delete_page(root_page_id)?;
                debug!(index = %self.index_name, "tree emptied");
                persisted
            }
            RootChange::Promote(child) => {
                let result = self.set_parent(child, PageId::INVALID).and_then(|_| {
                    self.set_root_page_id(child);
                    self.persist_root_page_id(false)
                });
                self.bpm.unpin_page(root_page_id, true);
                self.bpm.delete_page(root_page_id)?;
                debug!(index = %self.index_name, root = %child, "root collapsed");
                result
            }
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Returns an iterator positioned at the smallest key.
    pub fn iter(&self) -> Result<IndexIterator<K, V>> {
        if self.is_empty() {
            return Ok(IndexIterator::end(self.bpm.clone()));
        }

        let mut frame = self.bpm.fetch_page(self.root_page_id())?;
        loop {
            let child = {
                let mut data = frame.write_data();
                match node::node_kind(&data[..]) {
                    NodeKind::Leaf => None,
                    NodeKind::Internal => {
                        let internal = InternalView::<K>::attach(&mut data[..]);
                        Some(internal.value_at(0))
                    }
                    NodeKind::Invalid => {
                        let page_id = frame.page_id();
                        drop(data);
                        self.bpm.unpin_page(page_id, false);
                        return Err(LodestoneError::TreeCorrupted(format!(
                            "unformatted page {page_id} on leftmost path"
                        )));
                    }
                }
            };

            let Some(child) = child else {
                return Ok(IndexIterator::new(self.bpm.clone(), frame.page_id(), 0));
            };

            let page_id = frame.page_id();
            let child_frame = match self.bpm.fetch_page(child) {
                Ok(f) => f,
                Err(e) => {
                    self.bpm.unpin_page(page_id, false);
                    return Err(e);
                }
            };
            self.bpm.unpin_page(page_id, false);
            frame = child_frame;
        }
    }

    /// Returns an iterator positioned at the first key not less than `key`.
    pub fn iter_from(&self, key: &K) -> Result<IndexIterator<K, V>> {
        if self.is_empty() {
            return Ok(IndexIterator::end(self.bpm.clone()));
        }

        let leaf_frame = self.find_leaf(key)?;
        let leaf_page_id = leaf_frame.page_id();

        let index = {
            let mut data = leaf_frame.write_data();
            let leaf = LeafView::<K, V>::attach(&mut data[..]);
            let size = leaf.size();
            (0..size)
                .find(|&i| {
                    self.comparator.compare(&leaf.key_at(i), key) != std::cmp::Ordering::Less
                })
                .unwrap_or(size)
        };

        // The iterator takes over the leaf pin, even when positioned past
        // this leaf's last entry; its first advance crosses the link.
        Ok(IndexIterator::new(self.bpm.clone(), leaf_page_id, index))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Reads `(kind, size, parent)` out of a formatted node page.
    fn node_header(data: &mut [u8]) -> Option<(NodeKind, usize, PageId)> {
        match node::node_kind(data) {
            NodeKind::Leaf => {
                let leaf = LeafView::<K, V>::attach(data);
                Some((NodeKind::Leaf, leaf.size(), leaf.parent_page_id()))
            }
            NodeKind::Internal => {
                let internal = InternalView::<K>::attach(data);
                Some((NodeKind::Internal, internal.size(), internal.parent_page_id()))
            }
            NodeKind::Invalid => None,
        }
    }

    /// Rewrites one node's parent link through the buffer pool.
    fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<()> {
        let frame = self.bpm.fetch_page(page_id)?;

        let ok = {
            let mut data = frame.write_data();
            match node::node_kind(&data[..]) {
                NodeKind::Leaf => {
                    LeafView::<K, V>::attach(&mut data[..]).set_parent_page_id(parent);
                    true
                }
                NodeKind::Internal => {
                    InternalView::<K>::attach(&mut data[..]).set_parent_page_id(parent);
                    true
                }
                NodeKind::Invalid => false,
            }
        };

        self.bpm.unpin_page(page_id, ok);
        if ok {
            Ok(())
        } else {
            Err(LodestoneError::TreeCorrupted(format!(
                "unformatted page {page_id} while relinking parent"
            )))
        }
    }

    /// Records the current root page id in the header page.
    ///
    /// `insert_record` distinguishes the first registration of this index
    /// name from later root changes.
    fn persist_root_page_id(&self, insert_record: bool) -> Result<()> {
        let frame = self.bpm.fetch_page(PageId::HEADER)?;

        let result = {
            let mut data = frame.write_data();
            let mut header = HeaderView::attach(&mut data[..]);
            if insert_record {
                match header.insert_record(&self.index_name, self.root_page_id()) {
                    // Re-registering after the tree emptied out.
                    Err(LodestoneError::DuplicateKey) => {
                        header.update_record(&self.index_name, self.root_page_id())
                    }
                    other => other,
                }
            } else {
                header.update_record(&self.index_name, self.root_page_id())
            }
        };

        self.bpm.unpin_page(PageId::HEADER, true);
        result
    }
}
