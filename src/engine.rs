//! Engine — the three primitives (`append`, `read_block`, `invalidate`)
//! and the streaming iterator, built on top of the metadata table, the
//! backing store, and the lock-free ordered valid index.
//!
//! Concurrency discipline: every **mutation** (`append`, `invalidate`)
//! takes the writer lock, a short-held `parking_lot::Mutex`, and never
//! performs an operation inside it that can block on another thread
//! (except, when `synchronous_append` is set, the flush itself). Every
//! **read** (`read_block`, streaming `next`) takes no lock at all; it
//! only registers with the valid index's epoch guard for the duration of
//! the call, which a writer never waits on except during the bounded
//! grace period inside `invalidate`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::block::{self, BLOCK_SIZE, DATA_BLOCK_OFFSET, HEADER_SIZE, MAX_PAYLOAD};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::meta::{MetaEntry, MetadataTable};
use crate::session::Session;
use crate::store::BackingStore;
use crate::valid_index::ValidIndex;

/// Writer-only state, guarded by [`Engine`]'s mutex.
struct WriterState {
    meta: MetadataTable,
    /// Rotor hint: the data block index `append` most recently used. The
    /// next scan starts just past it so appends spread across the image
    /// instead of always retrying low indices.
    last_written: usize,
}

/// A bound store: the live engine behind every [`crate::binder`] handle.
pub struct Engine {
    store: Arc<dyn BackingStore>,
    config: StoreConfig,
    n_data_blocks: usize,
    writer: Mutex<WriterState>,
    valid_index: ValidIndex,
    /// Count of blocks currently marked valid, mirrored outside the
    /// writer lock purely for cheap diagnostics (`tracing` fields); the
    /// valid index itself remains the source of truth for readers.
    valid_count_hint: AtomicUsize,
}

fn now_nsec() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX_EPOCH")
        .as_nanos() as i64
}

fn build_data_block(header: [u8; HEADER_SIZE], payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    buf[0..HEADER_SIZE].copy_from_slice(&header);
    buf[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
    buf
}

impl Engine {
    /// Assemble an engine from an already-populated metadata table and
    /// valid index (the binder is responsible for scanning the image and
    /// building both before constructing this).
    pub(crate) fn new(
        store: Arc<dyn BackingStore>,
        config: StoreConfig,
        n_data_blocks: usize,
        meta: MetadataTable,
        valid_index: ValidIndex,
        last_written: usize,
    ) -> Self {
        let valid_count_hint = AtomicUsize::new(meta.valid_count());
        Self {
            store,
            config,
            n_data_blocks,
            writer: Mutex::new(WriterState { meta, last_written }),
            valid_index,
            valid_count_hint,
        }
    }

    /// Number of data blocks in the bound image.
    pub fn block_count(&self) -> usize {
        self.n_data_blocks
    }

    // ── append ───────────────────────────────────────────────────────────

    /// Write `payload` into the next free block in rotor order, publish
    /// it to the valid index, and return its block index.
    ///
    /// Ordering: the block is written durably (and flushed, if
    /// `synchronous_append`) *before* it is inserted into the valid
    /// index, so a reader that finds it via the index can never observe
    /// a torn or stale write.
    pub fn append(&self, payload: &[u8]) -> Result<u32> {
        if payload.len() > MAX_PAYLOAD {
            return Err(StoreError::TooBig(format!(
                "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte block capacity",
                payload.len()
            )));
        }

        let mut writer = self.writer.lock();
        let n = self.n_data_blocks;
        if n == 0 {
            return Err(StoreError::NoSpace);
        }

        let mut found = None;
        let mut steps_scanned = 0usize;
        for step in 1..=n {
            let candidate = (writer.last_written + step) % n;
            steps_scanned = step;
            if !writer.meta.get(candidate).map(|e| e.valid).unwrap_or(false) {
                found = Some(candidate);
                break;
            }
        }
        let block_index = match found {
            Some(i) => i,
            None => {
                warn!("append found no free block after a full rotor scan");
                return Err(StoreError::NoSpace);
            }
        };
        if self.config.debug_audit {
            info!(steps_scanned, block_index, "rotor scan selected a block");
        }

        let nsec = now_nsec();
        let valid_bytes = payload.len() as u16;
        let header = block::encode_header(nsec as u64, true, valid_bytes)?;
        let block_bytes = build_data_block(header, payload);

        let disk_index = DATA_BLOCK_OFFSET + block_index;
        self.store.write_block(disk_index, &block_bytes)?;
        if self.config.synchronous_append {
            self.store.flush_block(disk_index)?;
        }

        writer.meta.set(
            block_index,
            MetaEntry {
                valid: true,
                valid_bytes,
                nsec: nsec as u64,
            },
        );
        writer.last_written = block_index;
        self.valid_index.insert_in_order(block_index as u32, nsec, valid_bytes);
        self.valid_count_hint.fetch_add(1, Ordering::Relaxed);

        debug!(block_index, nsec, valid_bytes, "append committed");
        Ok(block_index as u32)
    }

    // ── read_block ──────────────────────────────────────────────────────

    /// Copy the valid payload of `block_index` into `buf`, returning how
    /// many bytes were written. Never blocks on the writer.
    pub fn read_block(&self, block_index: u32, buf: &mut [u8]) -> Result<usize> {
        if block_index as usize >= self.n_data_blocks {
            return Err(StoreError::TooBig(format!(
                "block index {block_index} out of range"
            )));
        }

        let _guard = self.valid_index.enter();
        let entry = self
            .valid_index
            .find_by_index(block_index)
            .ok_or(StoreError::NoData)?;

        self.read_payload_into(block_index, entry.valid_bytes, buf)
    }

    fn read_payload_into(&self, block_index: u32, valid_bytes: u16, buf: &mut [u8]) -> Result<usize> {
        let disk_index = DATA_BLOCK_OFFSET + block_index as usize;
        let block_bytes = self.store.read_block(disk_index)?;
        let len = (valid_bytes as usize).min(buf.len());
        buf[..len].copy_from_slice(&block_bytes[HEADER_SIZE..HEADER_SIZE + len]);
        trace!(block_index, len, "read_block delivered payload");
        Ok(len)
    }

    // ── invalidate ───────────────────────────────────────────────────────

    /// Mark `block_index` invalid. Readers that started before this call
    /// are allowed to finish; the on-disk header is only rewritten after
    /// the grace period drains.
    pub fn invalidate(&self, block_index: u32) -> Result<()> {
        let idx = block_index as usize;
        let mut writer = self.writer.lock();
        if idx >= writer.meta.len() {
            return Err(StoreError::TooBig(format!(
                "block index {block_index} out of range"
            )));
        }
        if !writer.meta.get(idx).map(|e| e.valid).unwrap_or(false) {
            return Err(StoreError::NoData);
        }

        writer.meta.invalidate(idx);
        self.valid_index.unlink(block_index);
        let remaining = self.valid_count_hint.fetch_sub(1, Ordering::Relaxed) - 1;
        if self.config.debug_audit {
            info!(block_index, remaining, "unlinked block from valid index");
        }

        // Release the writer lock before the grace-period wait: the wait
        // is unbounded in the number of concurrent readers it may need to
        // drain, and holding the lock across it would serialize every
        // other append/invalidate behind this one's reader drain.
        drop(writer);

        // The index no longer yields this block; wait for any reader that
        // grabbed it just before the unlink to finish before the header
        // is rewritten underneath it.
        self.valid_index.wait_grace_period();

        let header = block::encode_header(0, false, 0)?;
        let disk_index = DATA_BLOCK_OFFSET + idx;
        let mut block_bytes = self.store.read_block(disk_index)?;
        block_bytes[0..HEADER_SIZE].copy_from_slice(&header);
        self.store.write_block(disk_index, &block_bytes)?;
        if self.config.synchronous_append {
            self.store.flush_block(disk_index)?;
        }

        debug!(block_index, "invalidate committed");
        Ok(())
    }

    // ── streaming read ───────────────────────────────────────────────────

    /// Deliver the next valid message after `session`'s current position,
    /// in append order. Returns `Ok(None)` once the stream is exhausted
    /// for now; a later append can make more data available to the same
    /// session.
    pub fn next(&self, session: &mut Session, buf: &mut [u8]) -> Result<Option<usize>> {
        let _guard = self.valid_index.enter();
        let (block_index, entry) = match self.valid_index.next_after(session.expected_nsec()) {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let len = self.read_payload_into(block_index, entry.valid_bytes, buf)?;
        // Advance to cur's stamp, not succ's: a subsequent call must skip
        // cur even if its successor has since been invalidated.
        session.advance_to(entry.nsec);
        Ok(Some(len))
    }
}
