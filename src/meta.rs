//! In-memory metadata table — one entry per data block, mirroring that
//! block's on-disk header so the engine never has to re-read a header off
//! disk to answer "is this block valid, and how long is it".

/// Snapshot of a single data block's header, kept in memory for the
/// lifetime of the bind.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaEntry {
    pub valid: bool,
    pub valid_bytes: u16,
    pub nsec: u64,
}

/// A fixed-length table of [`MetaEntry`], one per data block, indexed by
/// block index (0-based, relative to the first data block).
///
/// Mutated only by the engine while holding the writer lock; reads of an
/// individual entry from within the writer's own critical section don't
/// need any additional synchronization, since the table isn't shared with
/// readers directly — readers go through the [`crate::valid_index::ValidIndex`]
/// instead.
#[derive(Debug)]
pub struct MetadataTable {
    entries: Vec<MetaEntry>,
}

impl MetadataTable {
    /// Build a table of `n` entries, all initially invalid.
    pub fn new(n: usize) -> Self {
        Self {
            entries: vec![MetaEntry::default(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MetaEntry> {
        self.entries.get(index)
    }

    pub fn set(&mut self, index: usize, entry: MetaEntry) {
        self.entries[index] = entry;
    }

    pub fn invalidate(&mut self, index: usize) {
        self.entries[index].valid = false;
    }

    /// Number of entries currently marked valid.
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }
}
