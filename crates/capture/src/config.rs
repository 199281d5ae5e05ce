use pktbuf::PoolConfig;
use pktcodec::BuilderConfig;
use pktring::Config as RingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Direct-mapped dedup cache size: 65536 recent digests, matching the
/// source's `prevmd5s` table.
pub const DEDUP_WINDOW_SLOTS: usize = 65536;

/// Tuning for one [`crate::InterfacePipeline`]: capture parameters plus
/// the stage-local pool/ring/block-builder sizing that §1A groups into
/// per-subsystem config structs rather than one flat bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface name (or synthetic source id) this pipeline reads from.
    pub interface: String,
    /// Stamped onto every block this pipeline builds, so the dispatch
    /// core and mirror transport can tell which interface a block came
    /// from without consulting `interface` at dispatch time (§4.8).
    pub sensor_id: u32,
    /// Snap length passed to the capture driver's `open()`. Should match
    /// `pool.snaplen` — the driver truncates captures to this length, and
    /// the pool must have room to hold one.
    pub snaplen: usize,
    pub promisc: bool,
    pub timeout_ms: u32,
    pub buffer_size: usize,
    pub bpf_filter: Option<String>,
    pub dedup_enabled: bool,
    pub defrag_enabled: bool,
    /// How often the defrag stage prunes stale, incomplete reassemblies.
    #[serde(with = "duration_millis")]
    pub defrag_prune_interval: Duration,
    /// Age past which an incomplete reassembly is dropped rather than
    /// held waiting for its remaining fragments.
    #[serde(with = "duration_millis")]
    pub defrag_max_age: Duration,
    pub pool: PoolConfig,
    pub ring: RingConfig,
    pub builder: BuilderConfig,
}

impl CaptureConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Self::default_for("")
        }
    }

    /// Like [`Self::new`] but with an explicit `sensor_id`, for a
    /// multi-interface pipeline where the default of `0` would collide
    /// across interfaces.
    pub fn with_sensor_id(interface: impl Into<String>, sensor_id: u32) -> Self {
        Self {
            interface: interface.into(),
            sensor_id,
            ..Self::default_for("")
        }
    }

    fn default_for(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            sensor_id: 0,
            snaplen: 65536,
            promisc: false,
            timeout_ms: 100,
            buffer_size: 2 << 20,
            bpf_filter: None,
            dedup_enabled: true,
            defrag_enabled: true,
            defrag_prune_interval: Duration::from_secs(1),
            defrag_max_age: Duration::from_secs(2),
            pool: PoolConfig::default(),
            ring: RingConfig::new(12, 16, false),
            builder: BuilderConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::default_for("any")
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
