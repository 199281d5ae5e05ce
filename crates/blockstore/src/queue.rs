use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::file_store::FileStore;
use pktcodec::Block;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

/// How often a dropped-for-disk-full push is allowed to log, regardless of
/// how often it actually happens — `warn!` per drop would flood the log
/// during a sustained overflow.
const DISK_FULL_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Same rate limit as `DISK_FULL_LOG_INTERVAL`, applied to the
/// memory-ceiling-with-spill-disabled drop path instead.
const MEMORY_CEILING_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

struct FreeSpaceSample {
    checked_at: Instant,
    free_bytes: u64,
}

/// A two-tier queue of sealed blocks: an in-memory deque up to
/// `max_memory_bytes`, spilling to a deque of disk-backed [`FileStore`]s
/// once that ceiling is reached.
///
/// Ordering is preserved end-to-end: once any backlog has spilled to disk,
/// further pushes spill too rather than slot into memory ahead of older
/// disk-resident blocks, so `pop` draining memory first and file stores
/// second always returns blocks in the order they were pushed.
pub struct BlockStoreQueue {
    config: StoreConfig,
    memory: Mutex<VecDeque<Block>>,
    memory_bytes: AtomicUsize,
    file_stores: Mutex<VecDeque<FileStore>>,
    next_file_id: AtomicU64,
    pushed_total: AtomicU64,
    popped_total: AtomicU64,
    disk_full_dropped: AtomicU64,
    memory_ceiling_dropped: AtomicU64,
    free_space: Mutex<Option<FreeSpaceSample>>,
    last_disk_full_log: Mutex<Option<Instant>>,
    last_memory_ceiling_log: Mutex<Option<Instant>>,
}

impl BlockStoreQueue {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            memory: Mutex::new(VecDeque::new()),
            memory_bytes: AtomicUsize::new(0),
            file_stores: Mutex::new(VecDeque::new()),
            next_file_id: AtomicU64::new(0),
            pushed_total: AtomicU64::new(0),
            popped_total: AtomicU64::new(0),
            disk_full_dropped: AtomicU64::new(0),
            memory_ceiling_dropped: AtomicU64::new(0),
            free_space: Mutex::new(None),
            last_disk_full_log: Mutex::new(None),
            last_memory_ceiling_log: Mutex::new(None),
        }
    }

    /// Whether the spill directory's free space is at or below the
    /// configured floor. Samples the filesystem at most once per
    /// `free_space_poll_interval`, reusing the last sample otherwise.
    fn disk_space_low(&self) -> bool {
        if self.config.disk_free_min_bytes == 0 {
            return false;
        }
        let mut sample = self.free_space.lock().expect("blockstore lock poisoned");
        let stale = match sample.as_ref() {
            Some(s) => s.checked_at.elapsed() >= self.config.free_space_poll_interval,
            None => true,
        };
        if stale {
            let free_bytes = crate::diskspace::free_bytes(&self.config.folder).unwrap_or(u64::MAX);
            *sample = Some(FreeSpaceSample { checked_at: Instant::now(), free_bytes });
        }
        sample.as_ref().expect("just populated").free_bytes <= self.config.disk_free_min_bytes
    }

    fn log_disk_full_rate_limited(&self) {
        let mut last = self.last_disk_full_log.lock().expect("blockstore lock poisoned");
        let should_log = match *last {
            Some(t) => t.elapsed() >= DISK_FULL_LOG_INTERVAL,
            None => true,
        };
        if should_log {
            warn!(
                dropped_total = self.disk_full_dropped.load(Ordering::Relaxed),
                "spill directory below free-space floor, dropping block"
            );
            *last = Some(Instant::now());
        }
    }

    /// Total blocks dropped because both the memory ceiling and the disk
    /// free-space floor were reached (`DiskFull`, §7).
    pub fn disk_full_dropped(&self) -> u64 {
        self.disk_full_dropped.load(Ordering::Relaxed)
    }

    /// Total blocks dropped because the memory ceiling was reached while
    /// disk spill is disabled (`MemoryCeiling`, §7).
    pub fn memory_ceiling_dropped(&self) -> u64 {
        self.memory_ceiling_dropped.load(Ordering::Relaxed)
    }

    fn log_memory_ceiling_rate_limited(&self) {
        let mut last = self.last_memory_ceiling_log.lock().expect("blockstore lock poisoned");
        let should_log = match *last {
            Some(t) => t.elapsed() >= MEMORY_CEILING_LOG_INTERVAL,
            None => true,
        };
        if should_log {
            warn!(
                dropped_total = self.memory_ceiling_dropped.load(Ordering::Relaxed),
                "block store memory ceiling reached and disk spill disabled, dropping block"
            );
            *last = Some(Instant::now());
        }
    }

    /// Pushes a sealed block onto the queue, spilling to disk if the
    /// in-memory tier is at capacity or already has a backlog, or
    /// dropping it if the memory ceiling is reached and disk spill is
    /// disabled (§7 `MemoryCeiling`).
    pub fn push(&self, block: Block) -> Result<(), StoreError> {
        let size = block.size_bytes();
        let mut file_stores = self.file_stores.lock().expect("blockstore lock poisoned");

        if file_stores.is_empty() {
            let mut memory = self.memory.lock().expect("blockstore lock poisoned");
            let used = self.memory_bytes.load(Ordering::Relaxed);
            if used + size <= self.config.max_memory_bytes {
                memory.push_back(block);
                self.memory_bytes.fetch_add(size, Ordering::Relaxed);
                self.pushed_total.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }

        if !self.config.disk_spill_enabled {
            self.memory_ceiling_dropped.fetch_add(1, Ordering::Relaxed);
            self.log_memory_ceiling_rate_limited();
            return Ok(());
        }

        if self.disk_space_low() {
            self.disk_full_dropped.fetch_add(1, Ordering::Relaxed);
            self.log_disk_full_rate_limited();
            return Ok(());
        }

        self.spill(&mut file_stores, block)?;
        self.pushed_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn spill(
        &self,
        file_stores: &mut VecDeque<FileStore>,
        block: Block,
    ) -> Result<(), StoreError> {
        if let Some(last) = file_stores.back_mut() {
            if !last.check_full(&self.config) {
                return last.push(&block);
            }
        }

        let id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        let mut store = FileStore::create(id, &self.config.folder)?;
        warn!(file_id = id, "block store memory tier full, spilling to disk");
        store.push(&block)?;
        file_stores.push_back(store);
        Ok(())
    }

    /// Pops the oldest block in the queue, memory tier first. Returns
    /// `None` if nothing is currently available — this does not mean the
    /// queue is permanently empty, only that there is nothing ready now.
    pub fn pop(&self) -> Result<Option<Block>, StoreError> {
        {
            let mut memory = self.memory.lock().expect("blockstore lock poisoned");
            if let Some(block) = memory.pop_front() {
                self.memory_bytes.fetch_sub(block.size_bytes(), Ordering::Relaxed);
                self.popped_total.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(block));
            }
        }

        let mut file_stores = self.file_stores.lock().expect("blockstore lock poisoned");
        loop {
            let front = match file_stores.front_mut() {
                Some(f) => f,
                None => return Ok(None),
            };
            front.check_full(&self.config);

            if let Some(block) = front.pop()? {
                self.popped_total.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(block));
            }

            if front.is_drained() {
                let drained = file_stores.pop_front().expect("front_mut just returned Some");
                let id = drained.id();
                drained.destroy()?;
                tracing::debug!(file_id = id, "spill file drained and removed");
                continue;
            }

            return Ok(None);
        }
    }

    /// Forces the current tail file store (if any) closed for push,
    /// regardless of its size/age ceilings. Useful on shutdown so a
    /// partially-written file becomes poppable instead of stuck open.
    pub fn seal_open_file_store(&self) {
        let mut file_stores = self.file_stores.lock().expect("blockstore lock poisoned");
        if let Some(last) = file_stores.back_mut() {
            last.force_close();
        }
    }

    /// Total blocks pushed since creation.
    pub fn pushed_total(&self) -> u64 {
        self.pushed_total.load(Ordering::Relaxed)
    }

    /// Total blocks popped since creation.
    pub fn popped_total(&self) -> u64 {
        self.popped_total.load(Ordering::Relaxed)
    }

    /// Blocks currently queued (pushed but not yet popped), across both
    /// tiers.
    pub fn len(&self) -> u64 {
        self.pushed_total().saturating_sub(self.popped_total())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any block is currently spilled to disk.
    pub fn has_disk_backlog(&self) -> bool {
        !self.file_stores.lock().expect("blockstore lock poisoned").is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes.load(Ordering::Relaxed)
    }
}
