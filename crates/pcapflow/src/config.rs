use blockstore::StoreConfig;
use capture::CaptureConfig;
use mirror::MirrorConfig;
use pktring::Config as RingConfig;
use serde::{Deserialize, Serialize};

/// Tuning for [`crate::dispatch::DispatchCore`] (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How many of the oldest unfinished blocks are kept open at once for
    /// the timestamp-sorted merge. Larger windows tolerate more timestamp
    /// skew across interfaces at the cost of holding more blocks resident.
    pub open_block_window: usize,
    /// Upper bound on distinct link-layer types this process will ever
    /// see, sizing the lazily-populated DLT handle cache
    /// (`pcapDeadHandles[DLT_TYPES_MAX]` in the source).
    pub dlt_max: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { open_block_window: 8, dlt_max: 256 }
    }
}

/// Top-level configuration for a whole pipeline process: one
/// [`CaptureConfig`] per interface, the shared block store, the mirror
/// transport, and the dispatch core (§1A: "composed by a top-level
/// `PipelineConfig` in the `pcapflow` crate").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub interfaces: Vec<CaptureConfig>,
    pub store: StoreConfig,
    pub mirror: MirrorConfig,
    pub dispatch: DispatchConfig,
    /// Ring configuration for the block writer's multiplexed channel;
    /// `max_producers` should be at least `interfaces.len()`.
    pub writer_ring: RingConfig,
}

impl PipelineConfig {
    pub fn new(interfaces: Vec<CaptureConfig>, store: StoreConfig) -> Self {
        let max_producers = interfaces.len().max(1);
        Self {
            interfaces,
            store,
            mirror: MirrorConfig::disabled(),
            dispatch: DispatchConfig::default(),
            writer_ring: RingConfig::new(10, max_producers, false),
        }
    }
}
