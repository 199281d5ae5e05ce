use crate::config::DispatchConfig;
use blockstore::BlockStoreQueue;
use pktcodec::{Block, PacketHeader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info_span;

/// A lazily-opened stand-in for `pcap_open_dead(dlt, snaplen)`: a handle
/// scoped to one link-layer type, used by a downstream processor to
/// interpret a packet's bytes without needing a live capture handle.
/// Opaque beyond its `dlt` — actually decoding a link-layer type is the
/// downstream processor's job, not this core's (§1 "out of scope").
#[derive(Debug, Clone, Copy)]
pub struct DltHandle {
    dlt: u16,
}

impl DltHandle {
    pub fn dlt(&self) -> u16 {
        self.dlt
    }
}

/// Caches one [`DltHandle`] per distinct link-layer type seen, bounded by
/// `dlt_max` (§4.8: "resolve a pcap-style handle for that link type
/// (lazily opening dead-handles per dlt, bounded by DLT_TYPES_MAX)"),
/// matching the source's `pcapDeadHandles[DLT_TYPES_MAX]`.
struct DltHandleCache {
    handles: Vec<Option<DltHandle>>,
}

impl DltHandleCache {
    fn new(dlt_max: usize) -> Self {
        Self { handles: vec![None; dlt_max] }
    }

    /// Resolves the handle for `dlt`, opening and caching it on first use.
    /// A `dlt` at or past `dlt_max` is still served, just never cached —
    /// this is meant to bound memory for the common case, not to reject
    /// traffic outright.
    fn resolve(&mut self, dlt: u16) -> DltHandle {
        let idx = dlt as usize;
        match self.handles.get_mut(idx) {
            Some(slot) => *slot.get_or_insert(DltHandle { dlt }),
            None => DltHandle { dlt },
        }
    }
}

/// The downstream API's `on_packet` callback (§6), invoked once per
/// packet in non-decreasing timestamp order per interface (§4.8).
pub trait PacketProcessor: Send + Sync {
    fn process(&self, header: &PacketHeader, payload: &[u8], block_id: u64, index: usize, dlt: DltHandle, sensor_id: u32);
}

/// Adapts any `Fn` into a [`PacketProcessor`], the common case for tests
/// and simple host processes that don't need a dedicated type.
impl<F> PacketProcessor for F
where
    F: Fn(&PacketHeader, &[u8], u64, usize, DltHandle, u32) + Send + Sync,
{
    fn process(&self, header: &PacketHeader, payload: &[u8], block_id: u64, index: usize, dlt: DltHandle, sensor_id: u32) {
        self(header, payload, block_id, index, dlt, sensor_id)
    }
}

struct OpenBlock {
    block: Block,
    cursor: usize,
}

/// Drains the block store queue in timestamp order (§4.8), keeping up to
/// `open_block_window` sealed blocks open at once and always emitting the
/// packet with the smallest capture timestamp among their current
/// cursors. Since packets are already in increasing-timestamp order
/// within a block (one block never mixes interfaces, and one interface is
/// strict FIFO end-to-end, §5), this is a simple k-way merge rather than
/// a full sort.
pub struct DispatchCore {
    terminate: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DispatchCore {
    pub fn spawn<P: PacketProcessor + 'static>(config: DispatchConfig, store: Arc<BlockStoreQueue>, processor: Arc<P>) -> Self {
        let terminate = Arc::new(AtomicBool::new(false));
        let handle = {
            let terminate = Arc::clone(&terminate);
            std::thread::spawn(move || dispatch_loop(config, store, processor, terminate))
        };
        Self { terminate, handle: Some(handle) }
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DispatchCore {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn dispatch_loop<P: PacketProcessor>(
    config: DispatchConfig,
    store: Arc<BlockStoreQueue>,
    processor: Arc<P>,
    terminate: Arc<AtomicBool>,
) {
    let span = info_span!("dispatch_core");
    let _enter = span.enter();
    let mut dlt_cache = DltHandleCache::new(config.dlt_max);
    let mut open: Vec<OpenBlock> = Vec::with_capacity(config.open_block_window);
    let idle_poll = Duration::from_millis(20);

    loop {
        while open.len() < config.open_block_window {
            match store.pop() {
                Ok(Some(block)) => open.push(OpenBlock { block, cursor: 0 }),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "dispatch core failed to pop from block store");
                    break;
                }
            }
        }

        if open.is_empty() {
            if terminate.load(Ordering::Relaxed) && store.is_empty() {
                break;
            }
            std::thread::sleep(idle_poll);
            continue;
        }

        let winner = open
            .iter()
            .enumerate()
            .min_by_key(|(_, ob)| ob.block.headers()[ob.cursor].captured_at_us)
            .map(|(i, _)| i)
            .expect("open is non-empty");

        let (header, payload, block_id, index, sensor_id) = {
            let ob = &open[winner];
            let header = ob.block.headers()[ob.cursor];
            let payload = ob.block.packet_bytes(ob.cursor).to_vec();
            (header, payload, ob.block.id(), ob.cursor, ob.block.sensor_id())
        };
        let dlt = dlt_cache.resolve(header.dlt);
        processor.process(&header, &payload, block_id, index, dlt, sensor_id);

        open[winner].cursor += 1;
        if open[winner].cursor >= open[winner].block.count() {
            open.remove(winner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore::StoreConfig;
    use pktcodec::{BlockBuilder, BlockIdSource, BuilderConfig};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Collector(Mutex<Vec<(u64, u32)>>);

    impl PacketProcessor for Collector {
        fn process(&self, header: &PacketHeader, _payload: &[u8], _block_id: u64, _index: usize, _dlt: DltHandle, sensor_id: u32) {
            self.0.lock().unwrap().push((header.captured_at_us, sensor_id));
        }
    }

    fn block_with(ids: &BlockIdSource, sensor_id: u32, timestamps: &[u64]) -> Block {
        let mut builder = BlockBuilder::new(BuilderConfig::new(1 << 20, Duration::from_secs(3600)), ids.clone(), sensor_id);
        for &ts in timestamps {
            let header = PacketHeader { captured_at_us: ts, wire_len: 4, captured_len: 4, dlt: 1, link_offset: 0, payload_offset: 0 };
            builder.append(header, &[1, 2, 3, 4]);
        }
        builder.flush().unwrap()
    }

    #[test]
    fn merges_open_blocks_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStoreQueue::new(StoreConfig::new(dir.path(), 1 << 20, 1 << 20, Duration::from_secs(3600))));
        let ids = BlockIdSource::new();

        store.push(block_with(&ids, 1, &[10, 30, 50])).unwrap();
        store.push(block_with(&ids, 2, &[20, 40, 60])).unwrap();

        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let config = DispatchConfig { open_block_window: 8, dlt_max: 16 };
        let core = DispatchCore::spawn(config, Arc::clone(&store), Arc::clone(&collector));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while collector.0.lock().unwrap().len() < 6 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        core.request_terminate();
        core.join();

        let seen = collector.0.lock().unwrap().clone();
        let timestamps: Vec<u64> = seen.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(timestamps, vec![10, 20, 30, 40, 50, 60]);
    }
}
