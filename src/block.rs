//! Block codec — fixed-size block headers plus the superblock and inode
//! descriptors used to bind to a backing image.
//!
//! # On-disk layout (all fields little-endian)
//!
//! ```text
//! Block 0 (SB_BLOCK_NUMBER):    superblock, 16-byte body + zero padding
//!   Offset  Size  Field
//!      0      8   version                (LE u64)
//!      8      8   magic = 0x30303030     (LE u64)
//!     16    ...   zero padding to BLOCK_SIZE
//!
//! Block 1 (INODE_BLOCK):        single-file inode, rest zero
//!   Offset  Size  Field
//!      0      4   mode                   (LE u32, not interpreted here)
//!      4      8   inode_no               (LE u64)
//!     12      8   data_block_number      (LE u64, not interpreted here)
//!     20      8   file_size              (LE u64) — bytes of the data region
//!     28    ...   zero padding to BLOCK_SIZE
//!
//! Blocks 2..1+N (DATA_BLOCK_OFFSET):  data blocks, HEADER_SIZE-byte header
//!   Offset  Size  Field
//!      0      8   nsec                   (LE u64, monotonic stamp)
//!      8      2   word = (valid_bytes << 1) | is_valid   (LE u16)
//!     10    ...   payload, BLOCK_SIZE - HEADER_SIZE bytes
//! ```
//!
//! # Endianness
//! Every numeric field is little-endian. The header word packs a single
//! validity bit and a 15-bit length because structs must not rely on
//! native layout — this is bit-exact on disk and explicitly encoded/
//! decoded byte by byte, never cast through `#[repr(C)]`.

use crate::error::{Result, StoreError};

/// Bytes per block, including the header for data blocks.
pub const BLOCK_SIZE: usize = 4096;
/// Bytes occupied by a data block's header (8-byte `nsec` + 2-byte word).
pub const HEADER_SIZE: usize = 10;
/// Reference upper bound on the number of data blocks a bound image may have.
pub const NBLOCKS_MAX: usize = 1000;
/// Superblock magic identifying a bldms image.
pub const MAGIC: u64 = 0x3030_3030;

/// Logical block index of the superblock.
pub const SB_BLOCK_NUMBER: usize = 0;
/// Logical block index of the single-file inode.
pub const INODE_BLOCK: usize = 1;
/// Logical block index of the first data block.
pub const DATA_BLOCK_OFFSET: usize = 2;

/// Largest payload that fits in one data block.
pub const MAX_PAYLOAD: usize = BLOCK_SIZE - HEADER_SIZE;

/// Maximum value `valid_bytes` can carry in its 15-bit field.
const VALID_BYTES_MAX: u16 = (1 << 15) - 1;

// ── Data block header ───────────────────────────────────────────────────────

/// Encode a data block header.
///
/// Fails with [`StoreError::TooBig`] if `valid_bytes` does not fit in the
/// header's 15-bit length field (it is, in practice, always bounded above
/// by [`MAX_PAYLOAD`], which fits comfortably).
pub fn encode_header(nsec: u64, is_valid: bool, valid_bytes: u16) -> Result<[u8; HEADER_SIZE]> {
    if valid_bytes > VALID_BYTES_MAX {
        return Err(StoreError::TooBig(format!(
            "valid_bytes {valid_bytes} does not fit in the 15-bit header field"
        )));
    }
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..8].copy_from_slice(&nsec.to_le_bytes());
    let word: u16 = (valid_bytes << 1) | (is_valid as u16);
    buf[8..10].copy_from_slice(&word.to_le_bytes());
    Ok(buf)
}

/// Decode a data block header. Total over any `HEADER_SIZE`-byte input.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> (u64, bool, u16) {
    let nsec = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let word = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
    let is_valid = (word & 0x1) != 0;
    let valid_bytes = word >> 1;
    (nsec, is_valid, valid_bytes)
}

// ── Superblock descriptor ───────────────────────────────────────────────────

/// The persistent superblock at block 0 of the image.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub version: u64,
    pub magic: u64,
}

impl Superblock {
    pub fn new(version: u64) -> Self {
        Self { version, magic: MAGIC }
    }

    /// Encode into a full `BLOCK_SIZE` buffer, zero-padded after the body.
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.magic.to_le_bytes());
        buf
    }

    /// Decode and validate the magic. Fails with [`StoreError::BadFormat`]
    /// if the magic does not match [`MAGIC`].
    pub fn decode(buf: &[u8; BLOCK_SIZE]) -> Result<Self> {
        let version = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let magic = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        if magic != MAGIC {
            return Err(StoreError::BadFormat);
        }
        Ok(Self { version, magic })
    }
}

// ── Inode descriptor ─────────────────────────────────────────────────────────

/// The persistent single-file inode at block 1 of the image.
///
/// Only `file_size` is semantically consumed by the engine; `mode` and
/// `data_block_number` are carried through for format completeness but are
/// not interpreted (the original layout reserved them for a
/// directory-capable inode that this single-file store never needed).
#[derive(Debug, Clone, Copy)]
pub struct InodeDescriptor {
    pub mode: u32,
    pub inode_no: u64,
    pub data_block_number: u64,
    pub file_size: u64,
}

impl InodeDescriptor {
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.mode.to_le_bytes());
        buf[4..12].copy_from_slice(&self.inode_no.to_le_bytes());
        buf[12..20].copy_from_slice(&self.data_block_number.to_le_bytes());
        buf[20..28].copy_from_slice(&self.file_size.to_le_bytes());
        buf
    }

    /// Total: every byte pattern decodes to some inode.
    pub fn decode(buf: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            mode: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            inode_no: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            data_block_number: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
            file_size: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
        }
    }
}
