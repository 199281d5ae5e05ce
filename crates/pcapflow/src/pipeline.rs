use crate::config::PipelineConfig;
use crate::dispatch::{DispatchCore, PacketProcessor};
use crate::error::PipelineError;
use crate::writer::BlockWriter;
use blockstore::BlockStoreQueue;
use capture::{CaptureDriver, InterfacePipeline};
use mirror::{MirrorDirection, MirrorReceiver, MirrorSender};
use pktcodec::{Block, BlockIdSource};
use pktring::Channel;
use std::sync::Arc;

/// Ties together every named role in §2's data flow into one running
/// process: one [`InterfacePipeline`] per configured interface feeding a
/// shared [`BlockWriter`], a single [`BlockStoreQueue`], and — depending
/// on `mirror.direction` — a [`MirrorSender`] standing in for the
/// dispatch core, a [`MirrorReceiver`] feeding the store from a remote
/// peer, and/or a [`DispatchCore`] handing packets to the host's
/// `PacketProcessor`.
///
/// §9: global `pcap` handles and buffer controls become this one explicit
/// context object, threaded through at construction rather than reached
/// for as statics.
pub struct Pipeline {
    interfaces: Vec<InterfacePipeline>,
    writer: BlockWriter,
    store: Arc<BlockStoreQueue>,
    mirror_sender: Option<MirrorSender>,
    mirror_receiver: Option<MirrorReceiver>,
    dispatch: Option<DispatchCore>,
}

impl Pipeline {
    /// Spawns every thread named in §5: five per interface, one block
    /// writer, the mirror sender/receiver (if configured), and the
    /// dispatch core (unless mirror-send replaces it on this instance).
    ///
    /// `drivers` must have exactly one entry per `config.interfaces`
    /// entry, matched by index; a live deployment supplies real NIC
    /// handles, tests supply [`capture::synthetic::SyntheticDriver`]s
    /// boxed as `Box<dyn CaptureDriver>`.
    pub fn spawn<P: PacketProcessor + 'static>(
        config: PipelineConfig,
        drivers: Vec<Box<dyn CaptureDriver>>,
        processor: Arc<P>,
    ) -> Result<Self, PipelineError> {
        if config.interfaces.is_empty() && config.mirror.direction != MirrorDirection::Recv {
            return Err(PipelineError::NoInterfaces);
        }
        assert_eq!(
            config.interfaces.len(),
            drivers.len(),
            "one capture driver must be supplied per configured interface"
        );

        let ids = BlockIdSource::new();
        let writer_channel = Channel::<Block>::new(config.writer_ring);

        let mut interfaces = Vec::with_capacity(config.interfaces.len());
        for (cfg, driver) in config.interfaces.into_iter().zip(drivers) {
            let producer = writer_channel
                .register()
                .expect("writer_ring.max_producers must be >= interfaces.len()");
            interfaces.push(InterfacePipeline::spawn(cfg.interface.clone(), cfg, driver, ids.clone(), producer));
        }

        let store = Arc::new(BlockStoreQueue::new(config.store));
        let writer = BlockWriter::spawn(writer_channel, Arc::clone(&store));

        let mirror_sender = (config.mirror.direction == MirrorDirection::Send)
            .then(|| MirrorSender::spawn(config.mirror.clone(), Arc::clone(&store)));

        let mirror_receiver = match config.mirror.direction {
            MirrorDirection::Recv => Some(MirrorReceiver::spawn(config.mirror.clone(), Arc::clone(&store))?),
            _ => None,
        };

        // §2: mirror-send replaces the dispatch core on the sender side;
        // every other direction (none, or receiver feeding its own local
        // consumer) still drains the store through dispatch.
        let dispatch = (config.mirror.direction != MirrorDirection::Send)
            .then(|| DispatchCore::spawn(config.dispatch, Arc::clone(&store), processor));

        Ok(Self { interfaces, writer, store, mirror_sender, mirror_receiver, dispatch })
    }

    pub fn store(&self) -> &Arc<BlockStoreQueue> {
        &self.store
    }

    /// Signals every interface pipeline to wind down, then tears the rest
    /// of the process down leaves-first: interfaces, then the block
    /// writer (so every sealed block reaches the store before anything
    /// downstream is told to stop), then the mirror sender/receiver, then
    /// dispatch last (§5: "joins threads in reverse dependency order").
    pub fn shutdown(self) {
        for pipeline in &self.interfaces {
            pipeline.request_terminate();
        }
        for pipeline in self.interfaces {
            pipeline.join();
        }

        self.writer.join();

        if let Some(sender) = self.mirror_sender {
            sender.request_terminate();
            sender.join();
        }
        if let Some(receiver) = self.mirror_receiver {
            receiver.request_terminate();
            receiver.join();
        }
        if let Some(dispatch) = self.dispatch {
            dispatch.request_terminate();
            dispatch.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use blockstore::StoreConfig;
    use capture::synthetic::{self, SyntheticDriver};
    use capture::CaptureConfig;
    use mirror::MirrorConfig;
    use pktring::Config as RingConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Collector(Mutex<Vec<u64>>);

    impl PacketProcessor for Collector {
        fn process(
            &self,
            header: &pktcodec::PacketHeader,
            _payload: &[u8],
            _block_id: u64,
            _index: usize,
            _dlt: crate::dispatch::DltHandle,
            _sensor_id: u32,
        ) {
            self.0.lock().unwrap().push(header.captured_at_us);
        }
    }

    fn straight_path_config(dir: &std::path::Path) -> PipelineConfig {
        let mut iface = CaptureConfig::new("eth0");
        iface.ring = RingConfig::new(10, 1, false);
        iface.dedup_enabled = false;
        let store = StoreConfig::new(dir, 1 << 24, 1 << 24, Duration::from_secs(3600));
        let mut config = PipelineConfig::new(vec![iface], store);
        config.dispatch = DispatchConfig { open_block_window: 4, dlt_max: 16 };
        config.mirror = MirrorConfig::disabled();
        config
    }

    #[test]
    fn straight_path_delivers_every_packet_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = straight_path_config(dir.path());

        let frames: Vec<(u64, Vec<u8>)> = (0..500u64)
            .map(|i| (i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, b"abc")))
            .collect();
        let driver: Box<dyn CaptureDriver> = Box::new(SyntheticDriver::new(frames).terminate_when_drained());

        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let pipeline = Pipeline::spawn(config, vec![driver], Arc::clone(&collector)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while collector.0.lock().unwrap().len() < 500 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        pipeline.shutdown();

        let seen = collector.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 500);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "packets must arrive in non-decreasing timestamp order");
    }
}
