//! Fixed-width byte codecs for page-resident records.
//!
//! B+Tree nodes store their entries as a dense array of fixed strides inside
//! a page buffer. Keys and values implement [`FixedCodec`] so a node view can
//! compute entry offsets without any per-entry length bookkeeping.

use crate::page::PageId;
use crate::rid::Rid;

/// A value with a fixed on-page encoding.
pub trait FixedCodec: Copy + Default + std::fmt::Debug + Send + Sync + 'static {
    /// Number of bytes this type occupies on a page.
    const ENCODED_SIZE: usize;

    /// Writes the value into `buf`, which is exactly `ENCODED_SIZE` bytes.
    fn encode_to(&self, buf: &mut [u8]);

    /// Reads a value from `buf`, which is exactly `ENCODED_SIZE` bytes.
    fn decode_from(buf: &[u8]) -> Self;
}

impl FixedCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

impl FixedCodec for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        i64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ])
    }
}

impl FixedCodec for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ])
    }
}

impl FixedCodec for PageId {
    const ENCODED_SIZE: usize = 8;

    fn encode_to(&self, buf: &mut [u8]) {
        self.0.encode_to(buf);
    }

    fn decode_from(buf: &[u8]) -> Self {
        PageId(i64::decode_from(buf))
    }
}

impl FixedCodec for Rid {
    const ENCODED_SIZE: usize = 12;

    fn encode_to(&self, buf: &mut [u8]) {
        self.page_id.encode_to(&mut buf[..8]);
        buf[8..12].copy_from_slice(&self.slot.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        Rid {
            page_id: PageId::decode_from(&buf[..8]),
            slot: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}
