use crate::config::PoolConfig;
use crate::slot::PacketSlot;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Error returned when the pool has no free slot to hand out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("packet-buffer pool exhausted")]
pub struct PoolExhausted;

type Page = Vec<PacketSlot>;

/// Shared state behind the page stack. Per §9's design note, the source's
/// spinlock-guarded free list maps to a mutex-plus-deque pair here rather
/// than a hand-rolled lock-free stack — the lock is never held across I/O
/// or while a caller holds a slot, only for the page hand-off itself.
struct Shared {
    config: PoolConfig,
    pages: Mutex<Vec<Page>>,
    allocated_pages: AtomicUsize,
}

impl Shared {
    fn new_page(&self) -> Option<Page> {
        let mut allocated = self.allocated_pages.load(Ordering::Relaxed);
        loop {
            if allocated >= self.config.max_pages {
                return None;
            }
            match self.allocated_pages.compare_exchange_weak(
                allocated,
                allocated + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => allocated = observed,
            }
        }
        Some((0..self.config.page_size).map(|_| PacketSlot::new(self.config.snaplen)).collect())
    }

    fn pop_page(&self) -> Option<Page> {
        self.pages.lock().expect("pool lock poisoned").pop()
    }

    fn push_page(&self, page: Page) {
        self.pages.lock().expect("pool lock poisoned").push(page);
    }
}

/// Bounded, thread-safe free list of [`PacketSlot`]s.
///
/// Slots are exchanged in whole pages between a shared stack and
/// per-thread caches obtained via [`Pool::handle`], amortizing the shared
/// lock to roughly once per `page_size` acquisitions/releases instead of
/// once per packet.
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                pages: Mutex::new(Vec::new()),
                allocated_pages: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Creates a thread-local handle. Each pipeline stage that acquires or
    /// releases slots should own one handle rather than share it, keeping
    /// the local caches genuinely thread-local.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
            free: VecDeque::new(),
        }
    }
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A thread-local cache over a [`Pool`]'s shared page stack.
///
/// Not `Send`-shared by convention: create one per stage thread via
/// [`Pool::handle`]. Nothing prevents sending a handle across threads, but
/// doing so defeats the thread-local caching this type exists to provide.
pub struct PoolHandle {
    shared: Arc<Shared>,
    free: VecDeque<PacketSlot>,
}

impl PoolHandle {
    /// Acquires a slot, refilling the local cache from the shared stack
    /// (or growing the pool, bounded by `max_pages`) if needed.
    ///
    /// Returns `Err(PoolExhausted)` if the pool is at capacity and no slot
    /// is available anywhere. Callers must cope: drop the packet or (for a
    /// defrag reassembly buffer) drop the oldest held fragment.
    pub fn acquire(&mut self) -> Result<PacketSlot, PoolExhausted> {
        if let Some(slot) = self.free.pop_front() {
            return Ok(slot);
        }

        if let Some(page) = self.shared.pop_page() {
            self.free.extend(page);
            return self.free.pop_front().ok_or(PoolExhausted);
        }

        if let Some(page) = self.shared.new_page() {
            self.free.extend(page);
            return self.free.pop_front().ok_or(PoolExhausted);
        }

        Err(PoolExhausted)
    }

    /// Returns a slot to the pool. Slots are cleared of stage-local
    /// metadata but their backing storage is left untouched for reuse.
    ///
    /// Invariant: once `release` returns, the slot is no longer referenced
    /// by any stage, and is either in this handle's local cache or in the
    /// shared stack — never both.
    pub fn release(&mut self, mut slot: PacketSlot) {
        slot.reset();
        self.free.push_back(slot);

        let cap = self.shared.config.local_cache_pages * self.shared.config.page_size;
        if self.free.len() >= cap {
            let page_size = self.shared.config.page_size;
            let page: Page = self.free.drain(..page_size).collect();
            self.shared.push_page(page);
        }
    }

    /// Number of slots currently held in this handle's local cache.
    pub fn cached_len(&self) -> usize {
        self.free.len()
    }
}
