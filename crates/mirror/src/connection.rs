use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Identifies one accepted mirror connection (§3 "Mirror connection").
/// Lifetime: created on accept, destroyed once its reader thread
/// observes EOF/error and a later cleanup pass reaps it.
pub(crate) struct ConnectionEntry {
    pub(crate) peer_addr: String,
    pub(crate) active: Arc<AtomicBool>,
    pub(crate) handle: Option<JoinHandle<()>>,
}

/// The receiver's map of live connections, guarded by a single mutex —
/// the mutual-exclusion contract the source expresses with a spinlock
/// (§9: "specify only the mutual-exclusion contract"). Never held across
/// socket I/O; only while the map itself is touched.
#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    next_id: AtomicU32,
    entries: Mutex<HashMap<u32, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self { next_id: AtomicU32::new(0), entries: Mutex::new(HashMap::new()) }
    }

    pub(crate) fn insert(&self, peer_addr: String, active: Arc<AtomicBool>, handle: JoinHandle<()>) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().expect("connection registry lock poisoned");
        entries.insert(id, ConnectionEntry { peer_addr, active, handle: Some(handle) });
        id
    }

    /// Removes and joins every entry whose reader thread has gone
    /// inactive. Run periodically rather than per-connection so a
    /// momentary observer never sees a half-torn-down map.
    pub(crate) fn reap_inactive(&self) -> usize {
        let mut entries = self.entries.lock().expect("connection registry lock poisoned");
        let dead: Vec<u32> = entries
            .iter()
            .filter(|(_, e)| !e.active.load(Ordering::Acquire))
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            if let Some(mut entry) = entries.remove(id) {
                if let Some(handle) = entry.handle.take() {
                    let _ = handle.join();
                }
            }
        }
        dead.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("connection registry lock poisoned").len()
    }

    /// Joins and drops every connection, active or not — used on shutdown.
    pub(crate) fn drain_all(&self) {
        let mut entries = self.entries.lock().expect("connection registry lock poisoned");
        for (_, mut entry) in entries.drain() {
            if let Some(handle) = entry.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
