//! Disk-resident B+Tree index for LodestoneDB.
//!
//! This crate provides:
//! - Typed leaf and internal node views over buffer pool pages
//! - A B+Tree with point lookup, insertion, and deletion
//! - An ordered forward iterator over leaf sibling links
//! - A header page mapping index names to root page ids
//!
//! All page access goes through the buffer pool's pin/unpin discipline: a
//! node's bytes are only dereferenced while the tree holds a pin on its
//! page, and every operation releases exactly the pins it acquired.

mod header;
mod iterator;
mod key;
mod node;
mod tree;

pub use header::HeaderView;
pub use iterator::IndexIterator;
pub use key::{DefaultComparator, KeyComparator};
pub use node::{node_kind, InternalView, LeafView, NodeKind};
pub use tree::BPlusTree;
