//! capture - per-interface capture pipeline
//!
//! Five threads per interface (read, defrag, md1, md2, dedup), each its own
//! OS thread connected to its neighbor by a dedicated [`pktring`] SPSC
//! ring, reassembling IP fragments, content-hashing, and deduplicating
//! packets before handing sealed [`pktcodec::Block`]s to the block writer.

mod config;
mod dedup;
mod defrag;
mod digest;
mod driver;
mod error;
mod pipeline;

pub mod synthetic;

pub use config::{CaptureConfig, DEDUP_WINDOW_SLOTS};
pub use dedup::DedupCache;
pub use defrag::{Defragmenter, Ipv4View};
pub use digest::PartialDigest;
pub use driver::{CaptureDriver, DriverStats, NextOutcome, RawPacket};
pub use error::CaptureError;
pub use pipeline::{DropCounters, DropCountersSnapshot, InterfacePipeline};

#[cfg(test)]
mod tests {
    use super::*;
    use pktcodec::{BlockIdSource, BuilderConfig};
    use pktring::Config as RingConfig;
    use std::time::Duration;

    fn test_config() -> CaptureConfig {
        let mut config = CaptureConfig::new("test0");
        config.snaplen = 2048;
        config.ring = RingConfig::new(8, 1, false);
        config.builder = BuilderConfig::new(1 << 16, Duration::from_millis(20));
        config
    }

    #[test]
    fn straight_path_delivers_all_packets_untouched() {
        let config = test_config();
        let frames: Vec<(u64, Vec<u8>)> = (0..200u64)
            .map(|i| {
                (
                    i,
                    synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, b"abc"),
                )
            })
            .collect();
        let driver = synthetic::SyntheticDriver::new(frames).terminate_when_drained();

        let sink_channel = pktring::Channel::<pktcodec::Block>::new(RingConfig::new(8, 1, false));
        let sink_producer = sink_channel.register().unwrap();

        let pipeline = InterfacePipeline::spawn("test0".to_string(), config, driver, BlockIdSource::new(), sink_producer);
        pipeline.join();

        let mut delivered = 0usize;
        sink_channel.consume_all(|block| delivered += block.count());

        let stats = pipeline.stats();
        assert_eq!(delivered, 200);
        assert_eq!(stats.pool_exhausted, 0);
        assert_eq!(stats.ring_full, 0);
    }

    #[test]
    fn dedup_drops_repeats_but_keeps_distinct() {
        let mut config = test_config();
        config.dedup_enabled = true;
        config.defrag_enabled = false;

        let mut frames = Vec::new();
        for i in 0..50u64 {
            frames.push((i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, b"same-payload")));
        }
        for i in 50..60u64 {
            let payload = format!("distinct-{i}");
            frames.push((i, synthetic::udp_frame(1, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, payload.as_bytes())));
        }

        let driver = synthetic::SyntheticDriver::new(frames).terminate_when_drained();
        let sink_channel = pktring::Channel::<pktcodec::Block>::new(RingConfig::new(8, 1, false));
        let sink_producer = sink_channel.register().unwrap();

        let pipeline = InterfacePipeline::spawn("test0".to_string(), config, driver, BlockIdSource::new(), sink_producer);
        pipeline.join();

        let mut delivered = 0usize;
        sink_channel.consume_all(|block| delivered += block.count());

        // first of the 50 repeats survives, the other 49 are deduped, plus 10 distinct
        assert_eq!(delivered, 1 + 10);
        assert_eq!(pipeline.stats().dedup_dropped, 49);
    }

    #[test]
    fn fragmented_datagrams_reassemble_out_of_order() {
        let mut config = test_config();
        config.defrag_enabled = true;
        config.dedup_enabled = false;

        let payload: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let mut frames = synthetic::fragmented_udp_frames(42, [10, 0, 0, 1], [10, 0, 0, 2], 1000, 2000, &payload);
        frames.reverse(); // arrive out of order

        let tagged: Vec<(u64, Vec<u8>)> = frames.into_iter().enumerate().map(|(i, f)| (i as u64, f)).collect();
        let driver = synthetic::SyntheticDriver::new(tagged).terminate_when_drained();

        let sink_channel = pktring::Channel::<pktcodec::Block>::new(RingConfig::new(8, 1, false));
        let sink_producer = sink_channel.register().unwrap();

        let pipeline = InterfacePipeline::spawn("test0".to_string(), config, driver, BlockIdSource::new(), sink_producer);
        pipeline.join();

        let mut delivered = 0usize;
        sink_channel.consume_all(|block| delivered += block.count());

        assert_eq!(delivered, 1);
        assert_eq!(pipeline.stats().defrag_malformed, 0);
    }
}
