//! Binder — attaches a [`crate::engine::Engine`] to a backing image,
//! enforcing the single-bound-instance rule and building the in-memory
//! metadata table and valid index from whatever the image already holds
//! on disk.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::block::{
    self, InodeDescriptor, Superblock, BLOCK_SIZE, DATA_BLOCK_OFFSET, HEADER_SIZE, INODE_BLOCK,
    SB_BLOCK_NUMBER,
};
use crate::config::StoreConfig;
use crate::engine::Engine;
use crate::error::{Result, StoreError};
use crate::meta::{MetaEntry, MetadataTable};
use crate::session::Session;
use crate::store::{BackingStore, FileBackingStore};
use crate::valid_index::ValidIndex;

/// Process-wide guard enforcing that only one image is bound at a time.
static BOUND: AtomicBool = AtomicBool::new(false);

/// A store bound to one backing image.
///
/// Dropping a `Store` (or calling [`Store::unbind`] explicitly) releases
/// the process-wide bind guard so a later `bind` call can succeed.
pub struct Store {
    engine: Arc<Engine>,
    released: bool,
}

impl Store {
    /// See [`Engine::append`].
    pub fn append(&self, payload: &[u8]) -> Result<u32> {
        self.engine.append(payload)
    }

    /// See [`Engine::read_block`].
    pub fn read_block(&self, block_index: u32, buf: &mut [u8]) -> Result<usize> {
        self.engine.read_block(block_index, buf)
    }

    /// See [`Engine::invalidate`].
    pub fn invalidate(&self, block_index: u32) -> Result<()> {
        self.engine.invalidate(block_index)
    }

    /// Open a new streaming read session over this store.
    pub fn open_session(&self) -> Session {
        Session::open()
    }

    /// See [`Engine::next`].
    pub fn next(&self, session: &mut Session, buf: &mut [u8]) -> Result<Option<usize>> {
        self.engine.next(session, buf)
    }

    /// Number of data blocks in the bound image.
    pub fn block_count(&self) -> usize {
        self.engine.block_count()
    }

    /// Explicitly release the bind guard. Equivalent to dropping the
    /// store, spelled out for callers that want the release to be
    /// visible at the call site.
    pub fn unbind(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            BOUND.store(false, Ordering::Release);
            self.released = true;
            info!("store unbound");
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.release();
    }
}

/// Bind to an already-open, already-formatted backing file.
///
/// Fails with [`StoreError::Busy`] if another store is already bound in
/// this process, [`StoreError::BadFormat`] if the image fails layout or
/// magic validation, or [`StoreError::TooBig`] if the image's computed
/// block count exceeds `config.nblocks_max`.
pub fn bind(file: File, config: StoreConfig) -> Result<Store> {
    if BOUND
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(StoreError::Busy);
    }

    bind_inner(file, config).map_err(|e| {
        BOUND.store(false, Ordering::Release);
        e
    })
}

/// Convenience wrapper over [`bind`] that opens the file at `path`.
pub fn bind_path<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Store> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    bind(file, config)
}

fn bind_inner(file: File, config: StoreConfig) -> Result<Store> {
    let file_len = file.metadata()?.len();
    let min_len = (DATA_BLOCK_OFFSET as u64) * BLOCK_SIZE as u64;
    if file_len % BLOCK_SIZE as u64 != 0 || file_len < min_len {
        return Err(StoreError::BadFormat);
    }

    let total_blocks = (file_len / BLOCK_SIZE as u64) as usize;
    let n = total_blocks - DATA_BLOCK_OFFSET;
    if n > config.nblocks_max {
        return Err(StoreError::TooBig(format!(
            "image has {n} data blocks, exceeding the configured bound of {}",
            config.nblocks_max
        )));
    }

    let store: Arc<dyn BackingStore> = Arc::new(FileBackingStore::new(file, total_blocks));

    let sb_bytes = store.read_block(SB_BLOCK_NUMBER)?;
    let sb_array: [u8; BLOCK_SIZE] = sb_bytes
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::BadFormat)?;
    Superblock::decode(&sb_array)?;

    let inode_bytes = store.read_block(INODE_BLOCK)?;
    let inode_array: [u8; BLOCK_SIZE] = inode_bytes
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::BadFormat)?;
    let _inode = InodeDescriptor::decode(&inode_array);

    let mut meta = MetadataTable::new(n);
    let valid_index = ValidIndex::new();
    // Tracks the (nsec, block_index) pair with the largest nsec seen so
    // far, i.e. the tail of the valid index in append order, regardless
    // of the order blocks happen to occupy on disk.
    let mut tail: Option<(i64, u32)> = None;

    for i in 0..n {
        let block_bytes = store.read_block(DATA_BLOCK_OFFSET + i)?;
        let header: [u8; HEADER_SIZE] = block_bytes[0..HEADER_SIZE].try_into().unwrap();
        let (nsec, is_valid, valid_bytes) = block::decode_header(&header);
        if !is_valid {
            continue;
        }
        meta.set(
            i,
            MetaEntry {
                valid: true,
                valid_bytes,
                nsec,
            },
        );
        let nsec_signed = nsec as i64;
        valid_index.insert_in_order(i as u32, nsec_signed, valid_bytes);
        tail = match tail {
            Some((prev, _)) if prev >= nsec_signed => tail,
            _ => Some((nsec_signed, i as u32)),
        };
    }

    let last_written = match tail {
        Some((_, block_index)) => block_index as usize,
        None => n.saturating_sub(1),
    };

    info!(n, last_written, "store bound");
    Ok(Store {
        engine: Arc::new(Engine::new(store, config, n, meta, valid_index, last_written)),
        released: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::format_image;
    use tempfile::NamedTempFile;

    #[test]
    fn bind_succeeds_on_freshly_formatted_image() {
        let tmp = NamedTempFile::new().unwrap();
        format_image(tmp.path(), 4).unwrap();
        let store = bind_path(tmp.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.block_count(), 4);
    }

    #[test]
    fn second_bind_is_busy() {
        let tmp_a = NamedTempFile::new().unwrap();
        format_image(tmp_a.path(), 4).unwrap();
        let tmp_b = NamedTempFile::new().unwrap();
        format_image(tmp_b.path(), 4).unwrap();

        let _first = bind_path(tmp_a.path(), StoreConfig::default()).unwrap();
        let second = bind_path(tmp_b.path(), StoreConfig::default());
        assert!(matches!(second, Err(StoreError::Busy)));
    }

    #[test]
    fn unbind_releases_the_guard_for_a_later_bind() {
        let tmp = NamedTempFile::new().unwrap();
        format_image(tmp.path(), 4).unwrap();
        let store = bind_path(tmp.path(), StoreConfig::default()).unwrap();
        store.unbind();

        let tmp2 = NamedTempFile::new().unwrap();
        format_image(tmp2.path(), 4).unwrap();
        let store2 = bind_path(tmp2.path(), StoreConfig::default()).unwrap();
        store2.unbind();
    }

    #[test]
    fn oversized_image_is_rejected_by_config_bound() {
        let tmp = NamedTempFile::new().unwrap();
        format_image(tmp.path(), 4).unwrap();
        let mut cfg = StoreConfig::default();
        cfg.nblocks_max = 2;
        assert!(matches!(
            bind_path(tmp.path(), cfg),
            Err(StoreError::TooBig(_))
        ));
    }

    #[test]
    fn bind_recovers_existing_valid_blocks_in_append_order() {
        let tmp = NamedTempFile::new().unwrap();
        format_image(tmp.path(), 4).unwrap();
        {
            let store = bind_path(tmp.path(), StoreConfig::default()).unwrap();
            store.append(b"one").unwrap();
            store.append(b"two").unwrap();
            store.unbind();
        }
        let store = bind_path(tmp.path(), StoreConfig::default()).unwrap();
        let mut session = store.open_session();
        let mut buf = [0u8; 16];
        let len = store.next(&mut session, &mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], b"one");
        let len = store.next(&mut session, &mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], b"two");
    }
}
