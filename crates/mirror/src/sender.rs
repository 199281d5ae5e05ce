use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::stats::{MirrorStats, MirrorStatsSnapshot};
use blockstore::BlockStoreQueue;
use pktcodec::serialize_block;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info_span, warn};

/// Drains a [`BlockStoreQueue`] and ships each block across one
/// persistent TCP connection to the configured peer (§4.7, sender side).
///
/// On this instance's side, the mirror sender stands in for the
/// dispatch core (§2: "If mirror-send is enabled, C7 replaces C8 on
/// the sender side") — the queue it drains would otherwise be handed
/// to a local downstream processor.
pub struct MirrorSender {
    terminate: Arc<AtomicBool>,
    stats: Arc<MirrorStats>,
    handle: Option<JoinHandle<()>>,
}

impl MirrorSender {
    pub fn spawn(config: MirrorConfig, store: Arc<BlockStoreQueue>) -> Self {
        let terminate = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(MirrorStats::default());

        let handle = {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || send_loop(config, store, terminate, stats))
        };

        Self { terminate, stats, handle: Some(handle) }
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MirrorStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MirrorSender {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn connect(config: &MirrorConfig) -> Result<TcpStream, MirrorError> {
    use std::net::ToSocketAddrs;
    let addr = config
        .endpoint
        .to_socket_addrs()
        .map_err(|e| MirrorError::Connect { endpoint: config.endpoint.clone(), source: e })?
        .next()
        .ok_or_else(|| MirrorError::Connect {
            endpoint: config.endpoint.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
        })?;

    let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
        .map_err(|e| MirrorError::Connect { endpoint: config.endpoint.clone(), source: e })?;
    stream.set_write_timeout(Some(config.write_timeout))?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Owns the sender's persistent connection and reconnect backoff state
/// across iterations of [`send_loop`].
struct SenderConn {
    stream: Option<TcpStream>,
    attempt: u32,
}

impl SenderConn {
    fn ensure_connected(&mut self, config: &MirrorConfig, stats: &MirrorStats) -> Option<&mut TcpStream> {
        if self.stream.is_none() {
            match connect(config) {
                Ok(stream) => {
                    if self.attempt > 0 {
                        stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    }
                    self.attempt = 0;
                    self.stream = Some(stream);
                }
                Err(e) => {
                    warn!(error = %e, endpoint = %config.endpoint, "mirror sender failed to connect, backing off");
                    let delay = config.retry.delay_for_attempt(self.attempt);
                    self.attempt = self.attempt.saturating_add(1);
                    std::thread::sleep(delay);
                }
            }
        }
        self.stream.as_mut()
    }

    fn drop_connection(&mut self) {
        self.stream = None;
    }
}

fn send_loop(config: MirrorConfig, store: Arc<BlockStoreQueue>, terminate: Arc<AtomicBool>, stats: Arc<MirrorStats>) {
    let span = info_span!("mirror_sender", endpoint = %config.endpoint);
    let _enter = span.enter();
    let mut conn = SenderConn { stream: None, attempt: 0 };
    let idle_poll = Duration::from_millis(20);

    loop {
        if terminate.load(Ordering::Relaxed) && store.is_empty() {
            break;
        }

        let block = match store.pop() {
            Ok(Some(block)) => block,
            Ok(None) => {
                std::thread::sleep(idle_poll);
                continue;
            }
            Err(e) => {
                error!(error = %e, "mirror sender failed to pop from block store");
                continue;
            }
        };

        let Some(stream) = conn.ensure_connected(&config, &stats) else {
            stats.blocks_dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        match serialize_block(&block, stream).and_then(|()| stream.flush().map_err(Into::into)) {
            Ok(()) => {
                stats.blocks_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(error = %e, "mirror sender write failed, dropping block and reconnecting");
                stats.blocks_dropped.fetch_add(1, Ordering::Relaxed);
                stats.mirror_io_errors.fetch_add(1, Ordering::Relaxed);
                conn.drop_connection();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore::StoreConfig;
    use pktcodec::{BlockBuilder, BlockIdSource, BuilderConfig, PacketHeader};
    use std::net::TcpListener;
    use std::time::Duration as StdDuration;

    fn block_of(ids: &BlockIdSource) -> pktcodec::Block {
        let mut builder = BlockBuilder::new(BuilderConfig::new(1 << 16, StdDuration::from_secs(3600)), ids.clone(), 1);
        let header = PacketHeader { captured_at_us: 1, wire_len: 4, captured_len: 4, dlt: 1, link_offset: 0, payload_offset: 0 };
        builder.append(header, &[1, 2, 3, 4]);
        builder.flush().unwrap()
    }

    #[test]
    fn sends_queued_blocks_to_a_listening_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let received = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream);
            let mut blocks = Vec::new();
            while let Some(block) = pktcodec::deserialize_block(&mut reader, pktcodec::DEFAULT_MAX_FRAME_BYTES).unwrap() {
                blocks.push(block);
                if blocks.len() == 3 {
                    break;
                }
            }
            blocks
        });

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStoreQueue::new(StoreConfig::new(dir.path(), 1 << 20, 1 << 20, StdDuration::from_secs(3600))));
        let ids = BlockIdSource::new();
        for _ in 0..3 {
            store.push(block_of(&ids)).unwrap();
        }

        let config = MirrorConfig::sender(addr.to_string());
        let sender = MirrorSender::spawn(config, Arc::clone(&store));

        let blocks = received.join().unwrap();
        assert_eq!(blocks.len(), 3);

        sender.request_terminate();
        sender.join();
    }
}
