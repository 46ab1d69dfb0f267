//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Marks a frame as evictable or pinned.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction and stops tracking it.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Removes an evictable frame from the replacer.
    fn remove(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Access bookkeeping for a single tracked frame.
#[derive(Debug)]
struct FrameInfo {
    /// Up to K most recent access timestamps, oldest first.
    history: VecDeque<u64>,
    /// Whether this frame may currently be evicted.
    is_evictable: bool,
}

impl FrameInfo {
    fn new(k: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(k),
            is_evictable: false,
        }
    }
}

struct LruKInner {
    /// Tracked frames keyed by frame id.
    frame_table: HashMap<FrameId, FrameInfo>,
    /// Logical clock, incremented on every recorded access.
    current_timestamp: u64,
    /// Number of currently evictable frames.
    curr_size: usize,
}

/// LRU-K replacement algorithm implementation.
///
/// The backward K-distance of a frame is the difference between the current
/// timestamp and the timestamp of its K-th most recent access. Frames with
/// fewer than K recorded accesses have infinite K-distance. The eviction
/// victim is the frame with the largest K-distance; ties are broken by the
/// earliest recorded timestamp, which degenerates to classic LRU among
/// frames with infinite distance.
pub struct LruKReplacer {
    /// Number of frames the replacer tracks at most.
    num_frames: usize,
    /// History depth K.
    k: usize,
    /// Internal state protected by a single mutex.
    inner: Mutex<LruKInner>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer for `num_frames` frames with history
    /// depth `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "history depth K must be positive");
        Self {
            num_frames,
            k,
            inner: Mutex::new(LruKInner {
                frame_table: HashMap::new(),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Returns the history depth K.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        if frame_id.0 as usize >= self.num_frames {
            return;
        }

        let mut inner = self.inner.lock();
        inner.current_timestamp += 1;
        let timestamp = inner.current_timestamp;

        let k = self.k;
        let info = inner
            .frame_table
            .entry(frame_id)
            .or_insert_with(|| FrameInfo::new(k));

        info.history.push_back(timestamp);
        if info.history.len() > k {
            info.history.pop_front();
        }
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();

        let Some(info) = inner.frame_table.get_mut(&frame_id) else {
            return;
        };

        let was_evictable = info.is_evictable;
        info.is_evictable = evictable;

        if was_evictable && !evictable {
            inner.curr_size -= 1;
        } else if !was_evictable && evictable {
            inner.curr_size += 1;
        }
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        if inner.curr_size == 0 {
            return None;
        }

        let now = inner.current_timestamp;
        let mut candidate = None;
        let mut max_distance = 0u64;
        let mut earliest = u64::MAX;

        for (&frame_id, info) in &inner.frame_table {
            if !info.is_evictable {
                continue;
            }

            // history[0] is the oldest retained access: with a full history
            // that is the K-th most recent one, otherwise the very first.
            let frame_earliest = *info.history.front().expect("tracked frame has history");
            let distance = if info.history.len() < self.k {
                u64::MAX
            } else {
                now - frame_earliest
            };

            if candidate.is_none()
                || distance > max_distance
                || (distance == max_distance && frame_earliest < earliest)
            {
                candidate = Some(frame_id);
                max_distance = distance;
                earliest = frame_earliest;
            }
        }

        let victim = candidate?;
        inner.frame_table.remove(&victim);
        inner.curr_size -= 1;
        Some(victim)
    }

    fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();

        let Some(info) = inner.frame_table.get(&frame_id) else {
            return;
        };
        if !info.is_evictable {
            return;
        }

        inner.frame_table.remove(&frame_id);
        inner.curr_size -= 1;
    }

    fn size(&self) -> usize {
        self.inner.lock().curr_size
    }
}
