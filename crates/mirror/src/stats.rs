use std::sync::atomic::{AtomicU64, Ordering};

/// Counters exposed through the statistics surface (§7), covering both
/// sender and receiver roles — an instance only ever drives the
/// counters relevant to its own direction.
#[derive(Default)]
pub struct MirrorStats {
    pub blocks_sent: AtomicU64,
    pub blocks_dropped: AtomicU64,
    pub reconnects: AtomicU64,
    pub mirror_io_errors: AtomicU64,
    pub blocks_received: AtomicU64,
    pub connections_accepted: AtomicU64,
    pub connections_reaped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorStatsSnapshot {
    pub blocks_sent: u64,
    pub blocks_dropped: u64,
    pub reconnects: u64,
    pub mirror_io_errors: u64,
    pub blocks_received: u64,
    pub connections_accepted: u64,
    pub connections_reaped: u64,
}

impl MirrorStats {
    pub fn snapshot(&self) -> MirrorStatsSnapshot {
        MirrorStatsSnapshot {
            blocks_sent: self.blocks_sent.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            mirror_io_errors: self.mirror_io_errors.load(Ordering::Relaxed),
            blocks_received: self.blocks_received.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_reaped: self.connections_reaped.load(Ordering::Relaxed),
        }
    }
}
