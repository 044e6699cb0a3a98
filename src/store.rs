//! Backing store abstraction — how block bytes actually reach disk.
//!
//! `BackingStore` methods take `&self`, not `&mut self`: the single writer
//! and any number of concurrent readers all hold a shared reference to the
//! same store, so thread-safety has to come from the implementation, not
//! from borrow-checker exclusivity. The file-backed implementation gets
//! this from positioned I/O (`pread`/`pwrite` via [`FileExt`]) rather than
//! a shared seek cursor, which is what keeps `read_block` from ever
//! blocking on the writer's position.

use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::block::BLOCK_SIZE;
use crate::error::{Result, StoreError};

/// Byte-addressable backing storage for fixed-size blocks.
///
/// Implementors must be safe to call concurrently from any number of
/// threads: one thread may be writing block `i` while another reads block
/// `j != i`, and in the single-writer design of this crate that is the
/// only concurrent access pattern that occurs in practice.
pub trait BackingStore: Send + Sync {
    /// Total number of fixed-size blocks in the store.
    fn block_count(&self) -> usize;

    /// Read exactly `BLOCK_SIZE` bytes starting at logical block `index`.
    fn read_block(&self, index: usize) -> Result<Vec<u8>>;

    /// Overwrite exactly `BLOCK_SIZE` bytes starting at logical block
    /// `index`. `data` must be exactly `BLOCK_SIZE` bytes.
    fn write_block(&self, index: usize, data: &[u8]) -> Result<()>;

    /// Force the given block's contents to stable storage.
    fn flush_block(&self, index: usize) -> Result<()>;

    /// Force all outstanding writes to stable storage.
    fn flush(&self) -> Result<()>;
}

/// A [`BackingStore`] over a plain file, addressed with positioned I/O.
pub struct FileBackingStore {
    file: File,
    block_count: usize,
}

impl FileBackingStore {
    /// Wrap an already-open file. `block_count` is the number of
    /// `BLOCK_SIZE`-sized blocks the file is expected to hold; the caller
    /// (the binder) is responsible for having computed it from the file's
    /// actual length.
    pub fn new(file: File, block_count: usize) -> Self {
        Self { file, block_count }
    }

    fn offset_of(&self, index: usize) -> Result<u64> {
        if index >= self.block_count {
            return Err(StoreError::TooBig(format!(
                "block index {index} out of range (block_count = {})",
                self.block_count
            )));
        }
        Ok((index * BLOCK_SIZE) as u64)
    }
}

impl BackingStore for FileBackingStore {
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&self, index: usize) -> Result<Vec<u8>> {
        let offset = self.offset_of(index)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    fn write_block(&self, index: usize, data: &[u8]) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(StoreError::InvalidArgument(format!(
                "write_block expects exactly {BLOCK_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let offset = self.offset_of(index)?;
        self.file.write_all_at(data, offset)?;
        Ok(())
    }

    fn flush_block(&self, _index: usize) -> Result<()> {
        // This implementation has no per-block write cache to flush
        // independently; a full sync covers it.
        self.file.sync_data().map_err(StoreError::from)
    }

    fn flush(&self) -> Result<()> {
        self.file.sync_data().map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    fn store_with(blocks: usize) -> FileBackingStore {
        let file = tempfile().unwrap();
        file.set_len((blocks * BLOCK_SIZE) as u64).unwrap();
        FileBackingStore::new(file, blocks)
    }

    #[test]
    fn write_then_read_roundtrips() {
        let store = store_with(4);
        let mut payload = vec![0u8; BLOCK_SIZE];
        payload[0] = 0xAB;
        store.write_block(2, &payload).unwrap();
        let read_back = store.read_block(2).unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn out_of_range_index_is_too_big() {
        let store = store_with(2);
        assert!(matches!(store.read_block(2), Err(StoreError::TooBig(_))));
    }

    #[test]
    fn wrong_size_write_is_invalid_argument() {
        let store = store_with(2);
        let short = vec![0u8; BLOCK_SIZE - 1];
        assert!(matches!(
            store.write_block(0, &short),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reads_do_not_disturb_each_other() {
        let store = store_with(3);
        let mut a = vec![1u8; BLOCK_SIZE];
        let mut b = vec![2u8; BLOCK_SIZE];
        a[0] = 0xAA;
        b[0] = 0xBB;
        store.write_block(0, &a).unwrap();
        store.write_block(1, &b).unwrap();
        assert_eq!(store.read_block(0).unwrap()[0], 0xAA);
        assert_eq!(store.read_block(1).unwrap()[0], 0xBB);
    }
}
