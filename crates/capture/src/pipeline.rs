use crate::config::CaptureConfig;
use crate::dedup::DedupCache;
use crate::defrag::{Defragmenter, Ipv4View};
use crate::digest::{self, PartialDigest};
use crate::driver::{CaptureDriver, NextOutcome};
use pktbuf::{Pool, PoolHandle};
use pktcodec::{Block, BlockBuilder, BlockIdSource, BuilderConfig, PacketHeader};
use pktring::{Backoff, Channel, Config as RingConfig, Producer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{error, info_span, warn};

/// Per-interface drop/outcome counters, matching §7's error table: a
/// counter per row, each incremented at the point the corresponding event
/// happens and accompanied by a (rate-limited, in the caller's logging
/// config) log event.
#[derive(Default)]
pub struct DropCounters {
    pub pool_exhausted: AtomicU64,
    pub ring_full: AtomicU64,
    pub capture_transient: AtomicU64,
    pub capture_fatal: AtomicU64,
    pub defrag_malformed: AtomicU64,
    pub defrag_pruned: AtomicU64,
    pub dedup_dropped: AtomicU64,
    pub delivered: AtomicU64,
    /// Mirrors the driver's own `ps_drop`/`ps_ifdrop`, sampled on every
    /// read-stage loop iteration rather than tracked independently.
    pub driver_ps_drop: AtomicU64,
    pub driver_ps_ifdrop: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DropCountersSnapshot {
    pub pool_exhausted: u64,
    pub ring_full: u64,
    pub capture_transient: u64,
    pub capture_fatal: u64,
    pub defrag_malformed: u64,
    pub defrag_pruned: u64,
    pub dedup_dropped: u64,
    pub delivered: u64,
    pub driver_ps_drop: u64,
    pub driver_ps_ifdrop: u64,
}

impl DropCounters {
    fn snapshot(&self) -> DropCountersSnapshot {
        DropCountersSnapshot {
            pool_exhausted: self.pool_exhausted.load(Ordering::Relaxed),
            ring_full: self.ring_full.load(Ordering::Relaxed),
            capture_transient: self.capture_transient.load(Ordering::Relaxed),
            capture_fatal: self.capture_fatal.load(Ordering::Relaxed),
            defrag_malformed: self.defrag_malformed.load(Ordering::Relaxed),
            defrag_pruned: self.defrag_pruned.load(Ordering::Relaxed),
            dedup_dropped: self.dedup_dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            driver_ps_drop: self.driver_ps_drop.load(Ordering::Relaxed),
            driver_ps_ifdrop: self.driver_ps_ifdrop.load(Ordering::Relaxed),
        }
    }
}

fn link_header_len(dlt: u16) -> u16 {
    match dlt {
        1 => 14, // DLT_EN10MB
        _ => 0,
    }
}

/// True once the upstream ring has been closed by its producer and fully
/// drained — the cascade signal a downstream stage uses to shut itself
/// down in turn.
fn upstream_done<T>(in_ch: &Channel<T>) -> bool {
    in_ch.get_ring(0).is_some_and(|r| r.is_closed() && r.is_empty())
}

/// Five OS threads (read, defrag, md1, md2, dedup) wired by dedicated
/// single-producer/single-consumer [`pktring::Channel`]s, implementing one
/// interface's capture pipeline end to end.
pub struct InterfacePipeline {
    terminate: Arc<AtomicBool>,
    stats: Arc<DropCounters>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl InterfacePipeline {
    /// Spawns the pipeline. `block_sink` is this interface's registered
    /// producer on the block writer's shared channel (§4.5) — sealed
    /// blocks flow there, never back through this type.
    pub fn spawn<D: CaptureDriver + 'static>(
        interface: String,
        config: CaptureConfig,
        driver: D,
        ids: BlockIdSource,
        block_sink: Producer<Block>,
    ) -> Self {
        let pool = Pool::new(config.pool);
        let stage_ring_cfg = RingConfig::new(config.ring.ring_bits, 1, config.ring.enable_metrics);

        let read_to_defrag = Channel::new(stage_ring_cfg);
        let read_producer = read_to_defrag.register().expect("fresh channel has room for one producer");

        let defrag_to_md1 = Channel::new(stage_ring_cfg);
        let defrag_producer = defrag_to_md1.register().expect("fresh channel has room for one producer");

        let md1_to_md2 = Channel::new(stage_ring_cfg);
        let md1_producer = md1_to_md2.register().expect("fresh channel has room for one producer");

        let md2_to_dedup = Channel::new(stage_ring_cfg);
        let md2_producer = md2_to_dedup.register().expect("fresh channel has room for one producer");

        let terminate = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(DropCounters::default());

        let mut handles = Vec::with_capacity(5);

        {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            let pool = pool.handle();
            let interface = interface.clone();
            handles.push(std::thread::spawn(move || {
                read_stage(interface, driver, pool, read_producer, terminate, stats);
            }));
        }
        {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            let pool = pool.handle();
            let interface = interface.clone();
            let defrag_enabled = config.defrag_enabled;
            let prune_interval = config.defrag_prune_interval;
            let max_age = config.defrag_max_age;
            handles.push(std::thread::spawn(move || {
                defrag_stage(
                    interface,
                    read_to_defrag,
                    pool,
                    defrag_producer,
                    terminate,
                    stats,
                    defrag_enabled,
                    prune_interval,
                    max_age,
                );
            }));
        }
        {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            let interface = interface.clone();
            handles.push(std::thread::spawn(move || {
                md1_stage(interface, defrag_to_md1, md1_producer, terminate, stats);
            }));
        }
        {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            let interface = interface.clone();
            handles.push(std::thread::spawn(move || {
                md2_stage(interface, md1_to_md2, md2_producer, terminate, stats);
            }));
        }
        {
            let terminate = Arc::clone(&terminate);
            let stats = Arc::clone(&stats);
            let pool = pool.handle();
            let dedup_enabled = config.dedup_enabled;
            let builder_config = config.builder;
            let sensor_id = config.sensor_id;
            handles.push(std::thread::spawn(move || {
                dedup_stage(
                    interface,
                    md2_to_dedup,
                    pool,
                    block_sink,
                    ids,
                    builder_config,
                    sensor_id,
                    dedup_enabled,
                    terminate,
                    stats,
                );
            }));
        }

        Self { terminate, stats, handles: Mutex::new(handles) }
    }

    /// Signals every stage to wind down once its current input is
    /// drained. Does not block; call [`Self::join`] to wait.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn stats(&self) -> DropCountersSnapshot {
        self.stats.snapshot()
    }

    /// Waits for all five stage threads to exit, leaves-first (the order
    /// they were spawned in already matches read→defrag→…→dedup, so a
    /// plain join in spawn order respects the dependency chain). Takes
    /// `&self` rather than consuming the pipeline so callers can still
    /// read `stats()` (or re-join, a no-op past the first call)
    /// afterward.
    pub fn join(&self) {
        let mut handles = self.handles.lock().expect("pipeline handles lock poisoned");
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn read_stage<D: CaptureDriver>(
    interface: String,
    mut driver: D,
    mut pool: PoolHandle,
    out: Producer<pktbuf::PacketSlot>,
    terminate: Arc<AtomicBool>,
    stats: Arc<DropCounters>,
) {
    let span = info_span!("capture_stage", interface = %interface, stage = "read");
    let _enter = span.enter();
    let mut backoff = Backoff::new();
    // The link-layer type is fixed for the life of an open capture handle,
    // so it's read once rather than on every packet — `next()`'s returned
    // borrow otherwise makes a second call into `driver` impossible until
    // the packet is consumed.
    let dlt = driver.dlt();

    loop {
        if terminate.load(Ordering::Relaxed) {
            break;
        }
        match driver.next() {
            Ok(NextOutcome::Packet(raw)) => {
                match pool.acquire() {
                    Ok(mut slot) => {
                        let link_offset = link_header_len(dlt);
                        let n = raw.bytes.len().min(slot.capacity());
                        slot.backing_mut()[..n].copy_from_slice(&raw.bytes[..n]);
                        slot.captured_len = n as u32;
                        slot.wire_len = raw.wire_len;
                        slot.captured_at_us = raw.captured_at_us;
                        slot.link_offset = link_offset;
                        slot.dlt = dlt;
                        if !out.push(slot) {
                            stats.ring_full.fetch_add(1, Ordering::Relaxed);
                            warn!(counter = "ring_full", stage = "read", "defrag ring full, dropping packet");
                        }
                    }
                    Err(_) => {
                        stats.pool_exhausted.fetch_add(1, Ordering::Relaxed);
                        warn!(counter = "pool_exhausted", stage = "read", "packet pool exhausted, dropping packet");
                    }
                }
                backoff.reset();
            }
            Ok(NextOutcome::Timeout) => backoff.snooze(),
            Err(e) if e.is_fatal() => {
                stats.capture_fatal.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, interface = %interface, "fatal capture error, terminating interface pipeline");
                break;
            }
            Err(e) => {
                stats.capture_transient.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, interface = %interface, "transient capture error");
                backoff.snooze();
            }
        }

        let driver_stats = driver.stats();
        stats.driver_ps_drop.store(driver_stats.ps_drop, Ordering::Relaxed);
        stats.driver_ps_ifdrop.store(driver_stats.ps_ifdrop, Ordering::Relaxed);
    }

    out.close();
}

#[allow(clippy::too_many_arguments)]
fn defrag_stage(
    interface: String,
    in_ch: Channel<pktbuf::PacketSlot>,
    mut pool: PoolHandle,
    out: Producer<pktbuf::PacketSlot>,
    terminate: Arc<AtomicBool>,
    stats: Arc<DropCounters>,
    enabled: bool,
    prune_interval: std::time::Duration,
    max_age: std::time::Duration,
) {
    let span = info_span!("capture_stage", interface = %interface, stage = "defrag");
    let _enter = span.enter();
    let mut defrag = Defragmenter::new(prune_interval, max_age);
    let mut backoff = Backoff::new();

    loop {
        let mut drained = 0usize;
        in_ch.consume_all_owned(|slot| {
            drained += 1;
            if !enabled {
                if !out.push(slot) {
                    stats.ring_full.fetch_add(1, Ordering::Relaxed);
                }
                return;
            }

            let Some(view) = Ipv4View::parse(slot.ip_payload()) else {
                stats.defrag_malformed.fetch_add(1, Ordering::Relaxed);
                pool.release(slot);
                return;
            };
            let is_fragment = view.is_fragment();

            match defrag.process(view, Instant::now()) {
                None => pool.release(slot),
                Some(_) if !is_fragment => {
                    if !out.push(slot) {
                        stats.ring_full.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Some(bytes) => {
                    let link_offset = slot.link_offset;
                    let dlt = slot.dlt;
                    let captured_at_us = slot.captured_at_us;
                    pool.release(slot);
                    match pool.acquire() {
                        Ok(mut fresh) => {
                            let room = fresh.capacity().saturating_sub(link_offset as usize);
                            let n = bytes.len().min(room);
                            let start = link_offset as usize;
                            fresh.backing_mut()[start..start + n].copy_from_slice(&bytes[..n]);
                            fresh.captured_len = (link_offset as u32) + n as u32;
                            fresh.wire_len = fresh.captured_len;
                            fresh.link_offset = link_offset;
                            fresh.dlt = dlt;
                            fresh.captured_at_us = captured_at_us;
                            if !out.push(fresh) {
                                stats.ring_full.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(_) => stats.pool_exhausted.fetch_add(1, Ordering::Relaxed),
                    }
                }
            }
        });

        let pruned = defrag.prune_if_due(Instant::now());
        if pruned > 0 {
            stats.defrag_pruned.fetch_add(pruned as u64, Ordering::Relaxed);
        }

        if drained == 0 {
            if terminate.load(Ordering::Relaxed) || upstream_done(&in_ch) {
                out.close();
                break;
            }
            backoff.snooze();
        } else {
            backoff.reset();
        }
    }
}

fn md1_stage(
    interface: String,
    in_ch: Channel<pktbuf::PacketSlot>,
    out: Producer<PartialDigest>,
    terminate: Arc<AtomicBool>,
    stats: Arc<DropCounters>,
) {
    let span = info_span!("capture_stage", interface = %interface, stage = "md1");
    let _enter = span.enter();
    let mut backoff = Backoff::new();

    loop {
        let mut drained = 0usize;
        in_ch.consume_all_owned(|slot| {
            drained += 1;
            let partial = digest::start(slot);
            if !out.push(partial) {
                stats.ring_full.fetch_add(1, Ordering::Relaxed);
            }
        });

        if drained == 0 {
            if terminate.load(Ordering::Relaxed) || upstream_done(&in_ch) {
                out.close();
                break;
            }
            backoff.snooze();
        } else {
            backoff.reset();
        }
    }
}

fn md2_stage(
    interface: String,
    in_ch: Channel<PartialDigest>,
    out: Producer<pktbuf::PacketSlot>,
    terminate: Arc<AtomicBool>,
    stats: Arc<DropCounters>,
) {
    let span = info_span!("capture_stage", interface = %interface, stage = "md2");
    let _enter = span.enter();
    let mut backoff = Backoff::new();

    loop {
        let mut drained = 0usize;
        in_ch.consume_all_owned(|partial| {
            drained += 1;
            let slot = digest::finish(partial);
            if !out.push(slot) {
                stats.ring_full.fetch_add(1, Ordering::Relaxed);
            }
        });

        if drained == 0 {
            if terminate.load(Ordering::Relaxed) || upstream_done(&in_ch) {
                out.close();
                break;
            }
            backoff.snooze();
        } else {
            backoff.reset();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dedup_stage(
    interface: String,
    in_ch: Channel<pktbuf::PacketSlot>,
    mut pool: PoolHandle,
    block_sink: Producer<Block>,
    ids: BlockIdSource,
    builder_config: BuilderConfig,
    sensor_id: u32,
    enabled: bool,
    terminate: Arc<AtomicBool>,
    stats: Arc<DropCounters>,
) {
    let span = info_span!("capture_stage", interface = %interface, stage = "dedup");
    let _enter = span.enter();
    let mut cache = DedupCache::new();
    let mut builder = BlockBuilder::new(builder_config, ids, sensor_id);
    let mut backoff = Backoff::new();
    let mut last_flush_check = Instant::now();

    loop {
        let mut drained = 0usize;
        let mut sealed_blocks = Vec::new();
        in_ch.consume_all_owned(|slot| {
            drained += 1;
            if enabled && cache.check_and_insert(&slot.digest) {
                stats.dedup_dropped.fetch_add(1, Ordering::Relaxed);
                pool.release(slot);
                return;
            }

            let header = PacketHeader {
                captured_at_us: slot.captured_at_us,
                wire_len: slot.wire_len,
                captured_len: slot.captured_len,
                dlt: slot.dlt,
                link_offset: slot.link_offset,
                payload_offset: 0,
            };
            let payload = slot.payload().to_vec();
            pool.release(slot);
            if let Some(sealed) = builder.append(header, &payload) {
                sealed_blocks.push(sealed);
            }
            stats.delivered.fetch_add(1, Ordering::Relaxed);
        });

        for block in sealed_blocks {
            if !block_sink.push(block) {
                stats.ring_full.fetch_add(1, Ordering::Relaxed);
                warn!(counter = "ring_full", stage = "dedup", "block writer ring full, dropping block");
            }
        }

        if drained == 0 {
            if last_flush_check.elapsed() >= builder_config.max_age {
                if let Some(sealed) = builder.flush() {
                    let _ = block_sink.push(sealed);
                }
                last_flush_check = Instant::now();
            }
            if terminate.load(Ordering::Relaxed) || upstream_done(&in_ch) {
                if let Some(sealed) = builder.flush() {
                    let _ = block_sink.push(sealed);
                }
                block_sink.close();
                break;
            }
            backoff.snooze();
        } else {
            backoff.reset();
        }
    }
}
