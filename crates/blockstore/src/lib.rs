//! blockstore - two-tier in-memory/disk-spilling block store queue
//!
//! Sealed blocks are pushed onto an in-memory deque up to a configured
//! byte ceiling. Past that ceiling, pushes spill onto a deque of
//! disk-backed spill files instead, each run through the same
//! self-delimited framing used for the mirror transport. Pop always
//! drains the oldest tier first, so push order is preserved end to end.

mod config;
mod diskspace;
mod error;
mod file_store;
mod queue;

pub use config::StoreConfig;
pub use error::StoreError;
pub use file_store::FileStoreState;
pub use queue::BlockStoreQueue;
