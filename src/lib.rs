//! # bldms — block-level append-and-invalidate message store
//!
//! A fixed-size backing image divided into blocks, each holding at most
//! one user message plus a small header. Three primitives cover the
//! whole surface:
//!
//! - [`binder::Store::append`] writes a message into the next free block
//!   and publishes it in append order.
//! - [`binder::Store::read_block`] reads one block's current payload by
//!   index, never blocking on a concurrent writer.
//! - [`binder::Store::invalidate`] marks a block free again, after
//!   letting any in-flight reader of it finish.
//!
//! A streaming session ([`session::Session`], driven by
//! [`binder::Store::next`]) walks every currently-valid message in the
//! order it was appended, independent of on-disk block position.
//!
//! Readers never take a lock; only `append` and `invalidate` serialize
//! with each other, via a writer lock held only for bounded, non-blocking
//! work.

pub mod binder;
pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod meta;
pub mod session;
pub mod store;
pub mod valid_index;

#[cfg(test)]
mod test_support;

pub use binder::{bind, bind_path, Store};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use session::Session;
pub use store::{BackingStore, FileBackingStore};
