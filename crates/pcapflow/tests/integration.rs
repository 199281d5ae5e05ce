//! End-to-end scenarios wiring every crate in the workspace together
//! through [`pcapflow::Pipeline`], covering the spillover and mirror
//! paths that no single crate's own tests can exercise alone.

use capture::synthetic::{self, SyntheticDriver};
use capture::{CaptureConfig, CaptureDriver};
use mirror::MirrorConfig;
use pcapflow::{DispatchConfig, DltHandle, PacketHeader, PacketProcessor, Pipeline, PipelineConfig, StoreConfig};
use pktring::Config as RingConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Collector {
    timestamps: Mutex<Vec<u64>>,
    delivered: AtomicUsize,
}

impl Collector {
    fn new() -> Self {
        Self { timestamps: Mutex::new(Vec::new()), delivered: AtomicUsize::new(0) }
    }

    fn len(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl PacketProcessor for Collector {
    fn process(&self, header: &PacketHeader, _payload: &[u8], _block_id: u64, _index: usize, _dlt: DltHandle, _sensor_id: u32) {
        self.timestamps.lock().unwrap().push(header.captured_at_us);
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

fn wait_for<F: Fn() -> bool>(timeout: Duration, cond: F) {
    let deadline = std::time::Instant::now() + timeout;
    while !cond() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// S4 — Spillover: a tight memory ceiling forces blocks to disk, and the
/// dispatch consumer still sees every packet with no loss.
#[test]
fn spillover_preserves_all_packets_across_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();

    let mut iface = CaptureConfig::new("eth0");
    iface.ring = RingConfig::new(10, 1, false);
    iface.dedup_enabled = false;
    // Small blocks, sealed quickly, so several distinct blocks get built
    // and the store has more than one to juggle between tiers.
    iface.builder = pktcodec::BuilderConfig::new(2048, Duration::from_millis(10));

    // A memory ceiling tight enough that most blocks must spill.
    let store = StoreConfig::new(dir.path(), 4096, 4096, Duration::from_secs(3600));
    let mut config = PipelineConfig::new(vec![iface], store);
    config.dispatch = DispatchConfig { open_block_window: 4, dlt_max: 16 };

    let frame_count = 2_000u64;
    let frames: Vec<(u64, Vec<u8>)> = (0..frame_count)
        .map(|i| (i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, b"abc")))
        .collect();
    let driver: Box<dyn CaptureDriver> = Box::new(SyntheticDriver::new(frames).terminate_when_drained());

    let collector = Arc::new(Collector::new());
    let pipeline = Pipeline::spawn(config, vec![driver], Arc::clone(&collector)).unwrap();

    wait_for(Duration::from_secs(10), || collector.len() as u64 >= frame_count);
    pipeline.shutdown();

    assert_eq!(collector.len() as u64, frame_count);
    let seen = collector.timestamps.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "FIFO order must survive the memory/disk boundary");

    let remaining_files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(remaining_files, 0, "every spill file must be unlinked once drained");
}

/// S2 — Dedup: a run of identical packets followed by distinct ones
/// collapses to one plus the distinct count.
#[test]
fn dedup_enabled_end_to_end_collapses_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let mut iface = CaptureConfig::new("eth0");
    iface.ring = RingConfig::new(10, 1, false);
    iface.dedup_enabled = true;
    iface.defrag_enabled = false;

    let store = StoreConfig::new(dir.path(), 1 << 24, 1 << 24, Duration::from_secs(3600));
    let mut config = PipelineConfig::new(vec![iface], store);
    config.dispatch = DispatchConfig { open_block_window: 4, dlt_max: 16 };

    let mut frames = Vec::new();
    for i in 0..1_000u64 {
        frames.push((i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, b"same-payload")));
    }
    for i in 1_000..2_000u64 {
        let payload = format!("distinct-{i}");
        frames.push((i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, payload.as_bytes())));
    }
    let driver: Box<dyn CaptureDriver> = Box::new(SyntheticDriver::new(frames).terminate_when_drained());

    let collector = Arc::new(Collector::new());
    let pipeline = Pipeline::spawn(config, vec![driver], Arc::clone(&collector)).unwrap();

    wait_for(Duration::from_secs(10), || collector.len() >= 1 + 1_000);
    pipeline.shutdown();

    assert_eq!(collector.len(), 1 + 1_000);
}

/// S5 — Mirror: a sender-only pipeline ships blocks across a real TCP
/// loopback connection to a receiver-only pipeline, which dispatches
/// them to its own downstream consumer.
#[test]
fn mirror_send_and_receive_round_trips_packets_over_tcp() {
    let recv_dir = tempfile::tempdir().unwrap();
    let send_dir = tempfile::tempdir().unwrap();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let recv_store = StoreConfig::new(recv_dir.path(), 1 << 24, 1 << 24, Duration::from_secs(3600));
    let mut recv_config = PipelineConfig::new(Vec::new(), recv_store);
    recv_config.mirror = MirrorConfig::receiver(addr.to_string());
    recv_config.dispatch = DispatchConfig { open_block_window: 4, dlt_max: 16 };

    let collector = Arc::new(Collector::new());
    let receiver_pipeline = Pipeline::spawn(recv_config, Vec::new(), Arc::clone(&collector)).unwrap();

    // Give the receiver's accept loop a moment to start polling before the
    // sender's first connect attempt.
    std::thread::sleep(Duration::from_millis(100));

    let mut iface = CaptureConfig::new("eth0");
    iface.ring = RingConfig::new(10, 1, false);
    iface.dedup_enabled = false;
    iface.builder = pktcodec::BuilderConfig::new(4096, Duration::from_millis(10));

    let send_store = StoreConfig::new(send_dir.path(), 1 << 20, 1 << 20, Duration::from_secs(3600));
    let mut send_config = PipelineConfig::new(vec![iface], send_store);
    send_config.mirror = MirrorConfig::sender(addr.to_string());

    let frame_count = 500u64;
    let frames: Vec<(u64, Vec<u8>)> = (0..frame_count)
        .map(|i| (i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, b"abc")))
        .collect();
    let driver: Box<dyn CaptureDriver> = Box::new(SyntheticDriver::new(frames).terminate_when_drained());

    // The sender-side dispatch core never runs (mirror-send replaces it),
    // so it needs a processor type anyway to satisfy the generic; it will
    // simply never be invoked.
    let sender_pipeline = Pipeline::spawn(send_config, vec![driver], Arc::new(Collector::new())).unwrap();

    wait_for(Duration::from_secs(10), || collector.len() as u64 >= frame_count);

    sender_pipeline.shutdown();
    receiver_pipeline.shutdown();

    assert_eq!(collector.len() as u64, frame_count);
}
