use crate::config::MirrorConfig;
use crate::connection::ConnectionRegistry;
use crate::error::MirrorError;
use crate::stats::{MirrorStats, MirrorStatsSnapshot};
use blockstore::BlockStoreQueue;
use pktcodec::{deserialize_block, DEFAULT_MAX_FRAME_BYTES};
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, info_span, warn};

/// Listens on the configured endpoint and spawns one reader thread per
/// accepted connection (§4.7, receiver side), pushing every block a
/// reader deserializes into the local [`BlockStoreQueue`] as though it
/// had been captured locally (§2).
pub struct MirrorReceiver {
    terminate: Arc<AtomicBool>,
    stats: Arc<MirrorStats>,
    registry: Arc<ConnectionRegistry>,
    accept_handle: Option<JoinHandle<()>>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl MirrorReceiver {
    pub fn spawn(config: MirrorConfig, store: Arc<BlockStoreQueue>) -> Result<Self, MirrorError> {
        let listener = TcpListener::bind(&config.endpoint)
            .map_err(|e| MirrorError::Listen { endpoint: config.endpoint.clone(), source: e })?;
        // Accept loop still needs to observe `terminate` between
        // connections; a short read timeout on the listener's accept
        // isn't available on `TcpListener` directly, so the accept
        // thread instead relies on `set_nonblocking` plus a poll sleep.
        listener.set_nonblocking(true).map_err(MirrorError::Io)?;

        let terminate = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(MirrorStats::default());
        let registry = Arc::new(ConnectionRegistry::new());

        let accept_handle = {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            let registry = Arc::clone(&registry);
            let store = Arc::clone(&store);
            let config = config.clone();
            std::thread::spawn(move || accept_loop(listener, config, store, registry, terminate, stats))
        };

        let cleanup_handle = {
            let terminate = Arc::clone(&terminate);
            let registry = Arc::clone(&registry);
            let stats = Arc::clone(&stats);
            let interval = config.cleanup_interval;
            std::thread::spawn(move || cleanup_loop(registry, stats, terminate, interval))
        };

        Ok(Self {
            terminate,
            stats,
            registry,
            accept_handle: Some(accept_handle),
            cleanup_handle: Some(cleanup_handle),
        })
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MirrorStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    pub fn join(mut self) {
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.cleanup_handle.take() {
            let _ = handle.join();
        }
        self.registry.drain_all();
    }
}

impl Drop for MirrorReceiver {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.cleanup_handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    config: MirrorConfig,
    store: Arc<BlockStoreQueue>,
    registry: Arc<ConnectionRegistry>,
    terminate: Arc<AtomicBool>,
    stats: Arc<MirrorStats>,
) {
    let span = info_span!("mirror_receiver_accept", endpoint = %config.endpoint);
    let _enter = span.enter();

    loop {
        if terminate.load(Ordering::Relaxed) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                info!(peer = %peer, "mirror connection accepted");
                let active = Arc::new(AtomicBool::new(true));
                let reader_active = Arc::clone(&active);
                let reader_store = Arc::clone(&store);
                let reader_stats = Arc::clone(&stats);
                let reader_terminate = Arc::clone(&terminate);
                let reader_config = config.clone();
                let handle = std::thread::spawn(move || {
                    reader_loop(stream, reader_config, reader_store, reader_stats, reader_terminate);
                    reader_active.store(false, Ordering::Release);
                });
                registry.insert(peer.to_string(), active, handle);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            Err(e) => {
                warn!(error = %e, "mirror accept failed");
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
        }
    }
}

/// Deserializes blocks off one connection until EOF, error, or shutdown,
/// pushing each into the local store. Mirrors §3's connection lifetime:
/// "destroyed when its reader thread observes EOF or error".
fn reader_loop(
    stream: TcpStream,
    config: MirrorConfig,
    store: Arc<BlockStoreQueue>,
    stats: Arc<MirrorStats>,
    terminate: Arc<AtomicBool>,
) {
    if let Err(e) = stream.set_read_timeout(Some(config.read_timeout)) {
        warn!(error = %e, "failed to set mirror connection read timeout");
    }
    let mut reader = BufReader::new(stream);

    loop {
        if terminate.load(Ordering::Relaxed) {
            break;
        }
        match deserialize_block(&mut reader, DEFAULT_MAX_FRAME_BYTES) {
            Ok(Some(block)) => {
                if let Err(e) = store.push(block) {
                    warn!(error = %e, "mirror receiver failed to push block into local store");
                }
                stats.blocks_received.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => break, // clean EOF between frames
            Err(pktcodec::CodecError::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue; // read timeout, just a chance to check `terminate`
            }
            Err(e) => {
                warn!(error = %e, "mirror connection read failed, closing");
                stats.mirror_io_errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
    debug!("mirror reader thread exiting");
}

fn cleanup_loop(registry: Arc<ConnectionRegistry>, stats: Arc<MirrorStats>, terminate: Arc<AtomicBool>, interval: std::time::Duration) {
    loop {
        if terminate.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(interval);
        let reaped = registry.reap_inactive();
        if reaped > 0 {
            stats.connections_reaped.fetch_add(reaped as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore::StoreConfig;
    use pktcodec::{serialize_block, BlockBuilder, BlockIdSource, BuilderConfig, PacketHeader};
    use std::time::Duration;

    fn block_of(ids: &BlockIdSource) -> pktcodec::Block {
        let mut builder = BlockBuilder::new(BuilderConfig::new(1 << 16, Duration::from_secs(3600)), ids.clone(), 1);
        let header = PacketHeader { captured_at_us: 1, wire_len: 4, captured_len: 4, dlt: 1, link_offset: 0, payload_offset: 0 };
        builder.append(header, &[9, 9, 9, 9]);
        builder.flush().unwrap()
    }

    #[test]
    fn reader_pushes_every_frame_from_a_live_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStoreQueue::new(StoreConfig::new(dir.path(), 1 << 20, 1 << 20, Duration::from_secs(3600))));

        let config = MirrorConfig::receiver("127.0.0.1:0");
        // Bind directly so the test can learn the ephemeral port before
        // handing the listener to the receiver.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut bound_config = config;
        bound_config.endpoint = addr.to_string();
        let receiver = MirrorReceiver::spawn(bound_config, Arc::clone(&store)).unwrap();

        // Give the accept loop a moment to start polling.
        std::thread::sleep(Duration::from_millis(50));

        let mut stream = TcpStream::connect(addr).unwrap();
        let ids = BlockIdSource::new();
        for _ in 0..5 {
            serialize_block(&block_of(&ids), &mut stream).unwrap();
        }
        drop(stream);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while store.len() < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(store.len(), 5);

        receiver.request_terminate();
        receiver.join();
    }
}
