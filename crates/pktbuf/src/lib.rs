//! pktbuf - packet-buffer pool and packet slot model
//!
//! A thread-safe free list of fixed-capacity packet slots that avoids
//! per-packet allocation. Slots are exchanged between a shared page stack
//! and per-thread caches in fixed-size pages, amortizing the cost of the
//! shared lock to roughly one acquisition per `page_size` packets.

mod config;
mod pool;
mod slot;

pub use config::PoolConfig;
pub use pool::{Pool, PoolExhausted, PoolHandle};
pub use slot::PacketSlot;
