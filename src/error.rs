//! Error kinds for every primitive exposed by this crate.
//!
//! One variant per logical kind from the design doc's error-handling
//! section; no variant is reused across unrelated failure modes. Each
//! carries the errno an external VFS/syscall shim would map it to, for
//! documentation only — this crate never constructs an errno itself.

use std::io;
use thiserror::Error;

/// Failure modes shared by every mutating and non-mutating primitive.
///
/// Propagation is non-recovering: a primitive that hits any of these
/// releases the writer lock (if held) and drops any pre-allocated
/// buffer/node before returning. No partial state survives a failed call.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No image is currently bound. Maps to `ENODEV`.
    #[error("store is not bound to a backing image")]
    NotBound,

    /// The backing image failed magic/layout validation at bind time.
    /// Maps to `EBADF`.
    #[error("backing image failed format validation")]
    BadFormat,

    /// A second `bind` was attempted while an image is already bound.
    /// Maps to `EBUSY`.
    #[error("store is already bound to another image")]
    Busy,

    /// A block index or payload length exceeded a hard bound. Maps to
    /// `E2BIG`.
    #[error("argument out of bounds: {0}")]
    TooBig(String),

    /// `append` found no free block in a full ring scan. Maps to `ENOMEM`.
    #[error("no free block available")]
    NoSpace,

    /// `read_block` or `invalidate` targeted a block that is not
    /// currently valid. Maps to `ENODATA`.
    #[error("block is not currently valid")]
    NoData,

    /// A session operation (e.g. `rewind`/`seek`) used an argument the
    /// state machine does not accept. Maps to `EINVAL`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A pre-allocation (metadata entry, valid-index node, buffer) failed.
    /// Maps to `ENOMEM`.
    #[error("allocation failed")]
    OutOfMemory,

    /// The backing store reported an I/O failure. Maps to `EIO` /
    /// propagates the underlying errno otherwise. No automatic retry.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
