//! Ordered valid index — the structure that makes streaming reads possible
//! without ever taking a lock.
//!
//! Two views over the same valid blocks are kept in lockstep, both backed
//! by `crossbeam-skiplist` and both mutated only by the engine under the
//! writer lock:
//!
//! - `order`: a set of `(nsec, block_index)` pairs, giving append-order
//!   traversal for the streaming read.
//! - `by_block`: a map from `block_index` to its [`ValidEntry`], giving
//!   O(log N) point lookup for `read_block`/`invalidate`.
//!
//! Both structures support lock-free concurrent reads by construction
//! (that's what a skip list is for). The one place a reader and the
//! writer still need to agree is reclamation: when `invalidate` removes a
//! node, a reader that started traversing *before* the removal must be
//! allowed to finish observing the old state before the node's slot is
//! reused. That's what the two-generation epoch scheme below provides —
//! a grace period with a small, fixed number of epochs (2), not a
//! general-purpose garbage collector.

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::{SkipMap, SkipSet};

/// The valid-index record for one block: its timestamp and how many
/// payload bytes of the block are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidEntry {
    pub nsec: i64,
    pub valid_bytes: u16,
}

/// RAII guard marking that a reader is inside the index. Holding one
/// prevents `wait_grace_period` from returning while the epoch it was
/// acquired in is still being drained.
pub struct ReadGuard<'a> {
    index: &'a ValidIndex,
    gen: usize,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.index.readers[self.gen].fetch_sub(1, Ordering::AcqRel);
    }
}

/// Lock-free ordered index of currently-valid blocks.
pub struct ValidIndex {
    order: SkipSet<(i64, u32)>,
    by_block: SkipMap<u32, ValidEntry>,
    current_gen: AtomicUsize,
    readers: [AtomicUsize; 2],
}

impl ValidIndex {
    pub fn new() -> Self {
        Self {
            order: SkipSet::new(),
            by_block: SkipMap::new(),
            current_gen: AtomicUsize::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    /// Register the calling thread as "inside" the index for as long as
    /// the returned guard lives. Readers must hold a guard for the
    /// duration of any traversal that spans more than one lookup.
    pub fn enter(&self) -> ReadGuard<'_> {
        let gen = self.current_gen.load(Ordering::Acquire) & 1;
        self.readers[gen].fetch_add(1, Ordering::AcqRel);
        ReadGuard { index: self, gen }
    }

    /// Insert a newly valid block, keyed by both its timestamp and index.
    /// Writer-lock-only.
    pub fn insert_in_order(&self, block_index: u32, nsec: i64, valid_bytes: u16) {
        self.order.insert((nsec, block_index));
        self.by_block.insert(block_index, ValidEntry { nsec, valid_bytes });
    }

    /// Remove a block from both views, returning its prior entry if it
    /// was present. Writer-lock-only. The caller is responsible for
    /// calling [`Self::wait_grace_period`] before reusing `block_index`'s
    /// on-disk slot.
    pub fn unlink(&self, block_index: u32) -> Option<ValidEntry> {
        let removed = self.by_block.remove(&block_index)?;
        let entry = *removed.value();
        self.order.remove(&(entry.nsec, block_index));
        Some(entry)
    }

    /// Point lookup by block index. Lock-free, safe from any thread.
    pub fn find_by_index(&self, block_index: u32) -> Option<ValidEntry> {
        self.by_block.get(&block_index).map(|e| *e.value())
    }

    /// The first valid block with a timestamp strictly greater than
    /// `expected_nsec`, if any — the node a streaming session with that
    /// stamp should deliver next. A session only ever needs to remember
    /// a timestamp, not a node reference, because this query re-walks
    /// the index from that stamp every time.
    pub fn next_after(&self, expected_nsec: i64) -> Option<(u32, ValidEntry)> {
        self.order
            .range((Bound::Excluded((expected_nsec, u32::MAX)), Bound::Unbounded))
            .next()
            .and_then(|e| {
                let (_, block_index) = *e.value();
                self.find_by_index(block_index).map(|entry| (block_index, entry))
            })
    }

    /// Number of currently valid blocks.
    pub fn len(&self) -> usize {
        self.by_block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_block.is_empty()
    }

    /// Block until every reader that entered before this call has left
    /// the index. Called by the writer, under the writer lock, after
    /// `unlink` and before the corresponding on-disk block is reused or
    /// its header is overwritten.
    ///
    /// Implementation: flip the current generation so new readers land
    /// in the other bucket, then spin until the bucket readers were
    /// using before the flip drains to zero. Two generations are enough
    /// because a reader only ever needs the guarantee "the index looked
    /// like *something* consistent since I started", not a specific
    /// historical snapshot.
    pub fn wait_grace_period(&self) {
        let old_gen = self.current_gen.fetch_add(1, Ordering::AcqRel) & 1;
        while self.readers[old_gen].load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }
}

impl Default for ValidIndex {
    fn default() -> Self {
        Self::new()
    }
}
