//! Streaming read session — per-reader cursor over the valid index in
//! append order.
//!
//! A session holds no reference to any valid-index node, only a stamp
//! (`expected_nsec`), so it is immune to concurrent invalidation of
//! blocks it has already passed or hasn't reached yet: nothing about it
//! can be dangling. All the concurrency-sensitive work happens in the
//! engine and the valid index; the session itself needs no
//! synchronization because nothing but its owner ever touches it.

use crate::error::{Result, StoreError};

/// A streaming read cursor, opened against one bound store and advanced
/// by repeated calls to [`crate::engine::Engine::next`].
///
/// `FRESH` is `expected_nsec == 0`; any successful `next()` moves it to
/// `MID` (`expected_nsec > 0`).
#[derive(Debug, Clone, Copy)]
pub struct Session {
    expected_nsec: i64,
}

impl Session {
    /// Open a new session positioned before the first message.
    pub fn open() -> Self {
        Self { expected_nsec: 0 }
    }

    /// Reset the session to `FRESH`. Always succeeds — equivalent to
    /// `seek(session, 0, SET)`.
    pub fn rewind(&mut self) {
        self.expected_nsec = 0;
    }

    /// Move the session to an absolute logical position. Only position
    /// `0` (a rewind) is supported; any other target fails with
    /// [`StoreError::InvalidArgument`], since this store has no concept
    /// of an addressable offset partway through the stream.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position == 0 {
            self.rewind();
            Ok(())
        } else {
            Err(StoreError::InvalidArgument(format!(
                "seek target {position} is not supported; only 0 (rewind) is"
            )))
        }
    }

    /// Close the session. Present for symmetry with `open`; drop does
    /// the same thing since a session owns no external resource.
    pub fn close(self) {}

    pub(crate) fn expected_nsec(&self) -> i64 {
        self.expected_nsec
    }

    pub(crate) fn advance_to(&mut self, nsec: i64) {
        self.expected_nsec = nsec;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::open()
    }
}
