/// Configuration for the packet-buffer pool.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PoolConfig {
    /// Snap length: capacity of each packet slot, in bytes.
    pub snaplen: usize,
    /// Number of slots exchanged as one page between a thread-local cache
    /// and the shared pool.
    pub page_size: usize,
    /// Number of pages a thread-local cache may hold before it pushes a
    /// full page back to the shared pool.
    pub local_cache_pages: usize,
    /// Upper bound on total pages the pool will ever allocate. `acquire`
    /// fails with [`PoolError::Exhausted`](crate::PoolError::Exhausted)
    /// once this bound is reached and both the shared stack and the
    /// calling thread's local cache are empty.
    pub max_pages: usize,
}

impl PoolConfig {
    pub const fn new(snaplen: usize, page_size: usize, local_cache_pages: usize, max_pages: usize) -> Self {
        Self {
            snaplen,
            page_size,
            local_cache_pages,
            max_pages,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            snaplen: 65536,
            page_size: 100,
            local_cache_pages: 5,
            max_pages: 256,
        }
    }
}
