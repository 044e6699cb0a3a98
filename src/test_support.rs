//! Image-formatting helper used only by this crate's own unit tests.
//!
//! Grounded on the original `bldmsmakefs` tool: write the superblock, a
//! single-file inode sized to the data region, and zero every data
//! block's header so every block starts invalid. This lays out exactly
//! what [`crate::binder::bind`] expects to find, without shipping a
//! formatter as part of the public API — the tool itself is out of
//! scope, the layout it produces is not.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::block::{BLOCK_SIZE, DATA_BLOCK_OFFSET, InodeDescriptor, Superblock};

pub(crate) fn format_image<P: AsRef<Path>>(path: P, n_data_blocks: usize) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    file.write_all(&Superblock::new(1).encode())?;

    let inode = InodeDescriptor {
        mode: 0o600,
        inode_no: 1,
        data_block_number: DATA_BLOCK_OFFSET as u64,
        file_size: (n_data_blocks * BLOCK_SIZE) as u64,
    };
    file.write_all(&inode.encode())?;

    // An all-zero block decodes as (nsec=0, is_valid=false, valid_bytes=0).
    let zero_block = [0u8; BLOCK_SIZE];
    for _ in 0..n_data_blocks {
        file.write_all(&zero_block)?;
    }

    file.flush()
}
