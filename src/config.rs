//! Runtime configuration handed to [`crate::binder::bind`].
//!
//! These replace what a C implementation would wire up as compile-time
//! constants (`NBLOCKS_MAX`, `SYNCHRONOUS_APPEND`, `DEBUG_AUDIT`): a
//! library consumed by more than one caller in the same process cannot
//! ask each of them to recompile it to change a knob, so each becomes an
//! ordinary constructor field instead.

use crate::block::NBLOCKS_MAX;

/// Construction-time knobs for a bound store.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Hard upper bound on the number of data blocks a bound image may
    /// have; `bind` rejects an image whose computed block count exceeds
    /// this.
    pub nblocks_max: usize,
    /// When set, `append` and `invalidate` block until their header
    /// write has reached stable storage before returning.
    pub synchronous_append: bool,
    /// Enables verbose `tracing` events at points this crate otherwise
    /// narrates only at `debug`/`trace` level. Has no effect on behavior.
    pub debug_audit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            nblocks_max: NBLOCKS_MAX,
            synchronous_append: false,
            debug_audit: false,
        }
    }
}
