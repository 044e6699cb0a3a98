//! Image-formatting helper for integration tests, built entirely from the
//! crate's public API — grounded on the original `bldmsmakefs` tool's
//! layout procedure (superblock, single-file inode, zeroed data block
//! headers), but kept out of the crate itself since a shipped formatter
//! binary is out of scope.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use bldms::block::{self, InodeDescriptor, Superblock, BLOCK_SIZE, DATA_BLOCK_OFFSET, HEADER_SIZE};

pub fn format_image<P: AsRef<Path>>(path: P, n_data_blocks: usize) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .unwrap();

    file.write_all(&Superblock::new(1).encode()).unwrap();

    let inode = InodeDescriptor {
        mode: 0o600,
        inode_no: 1,
        data_block_number: DATA_BLOCK_OFFSET as u64,
        file_size: (n_data_blocks * BLOCK_SIZE) as u64,
    };
    file.write_all(&inode.encode()).unwrap();

    let zero_block = [0u8; BLOCK_SIZE];
    for _ in 0..n_data_blocks {
        file.write_all(&zero_block).unwrap();
    }

    file.flush().unwrap();
}

/// Overwrite one data block's header and payload directly, bypassing
/// `append`, so a test can stage an image with a chosen `nsec` ordering
/// before binding to it.
pub fn write_raw_block<P: AsRef<Path>>(path: P, block_index: usize, nsec: u64, payload: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    let offset = ((DATA_BLOCK_OFFSET + block_index) * BLOCK_SIZE) as u64;
    file.seek(SeekFrom::Start(offset)).unwrap();
    let header = block::encode_header(nsec, true, payload.len() as u16).unwrap();
    file.write_all(&header).unwrap();
    file.write_all(payload).unwrap();
    let padding = BLOCK_SIZE - HEADER_SIZE - payload.len();
    file.write_all(&vec![0u8; padding]).unwrap();
    file.flush().unwrap();
}
