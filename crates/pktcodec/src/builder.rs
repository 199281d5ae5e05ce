use crate::block::Block;
use crate::header::PacketHeader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Size and age thresholds past which a [`BlockBuilder`] seals its current
/// block instead of accepting more packets into it.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BuilderConfig {
    pub max_bytes: usize,
    #[serde(with = "duration_millis")]
    pub max_age: Duration,
}

/// `Duration` has no native `serde` impl; config files carry the age
/// ceiling as plain milliseconds instead.
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

impl BuilderConfig {
    pub const fn new(max_bytes: usize, max_age: Duration) -> Self {
        Self { max_bytes, max_age }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_bytes: 1 << 20,
            max_age: Duration::from_millis(100),
        }
    }
}

/// Hands out globally-unique, monotonically increasing block ids.
///
/// One source is shared (it's an `Arc` under the hood, so `clone()` is
/// cheap) across every per-interface [`BlockBuilder`] in a pipeline, so
/// that block ids stay ordered across interfaces rather than just within
/// one.
#[derive(Clone)]
pub struct BlockIdSource(Arc<AtomicU64>);

impl BlockIdSource {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for BlockIdSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates packets into a [`Block`], sealing it once it is full or has
/// been open longer than `max_age`.
///
/// The size-or-age decision mirrors `BatchProcessor::should_flush`'s batch
/// logic, applied to packet blocks instead of span batches: a block seals
/// when it would exceed its byte ceiling, or when it is non-empty and has
/// sat open past its age ceiling, whichever comes first.
pub struct BlockBuilder {
    config: BuilderConfig,
    ids: BlockIdSource,
    sensor_id: u32,
    current: Option<Block>,
    opened_at: Instant,
}

impl BlockBuilder {
    pub fn new(config: BuilderConfig, ids: BlockIdSource, sensor_id: u32) -> Self {
        Self {
            config,
            ids,
            sensor_id,
            current: None,
            opened_at: Instant::now(),
        }
    }

    fn ensure_open(&mut self) {
        if self.current.is_none() {
            self.current = Some(Block::new(self.ids.next(), self.sensor_id));
            self.opened_at = Instant::now();
        }
    }

    fn should_seal_for_age(&self) -> bool {
        match &self.current {
            Some(block) => !block.is_empty() && self.opened_at.elapsed() >= self.config.max_age,
            None => false,
        }
    }

    fn take_sealed(&mut self) -> Option<Block> {
        let mut block = self.current.take()?;
        block.seal();
        Some(block)
    }

    /// A fresh, empty block always accepts its first packet regardless of
    /// size (see [`Block::append`]), so this only returns `false` when the
    /// current block already holds packets and the new one wouldn't fit.
    fn push(&mut self, header: PacketHeader, bytes: &[u8]) -> bool {
        let block = self.current.as_mut().expect("ensure_open populated this");
        block.append(header, bytes, self.config.max_bytes).is_ok()
    }

    /// Appends one packet. Returns the previous block if this append caused
    /// it to seal, either because it had aged out or because the new
    /// packet didn't fit. The packet itself always lands in the builder's
    /// (possibly now-new) current block.
    pub fn append(&mut self, header: PacketHeader, bytes: &[u8]) -> Option<Block> {
        if self.should_seal_for_age() {
            let sealed = self.take_sealed();
            self.ensure_open();
            self.push(header, bytes);
            return sealed;
        }

        self.ensure_open();
        if self.push(header, bytes) {
            return None;
        }

        let sealed = self.take_sealed();
        self.ensure_open();
        self.push(header, bytes);
        sealed
    }

    /// Seals and returns the currently open block, if it holds any
    /// packets. Called on a timer tick to bound block age under low packet
    /// rate, and on shutdown to flush the last partial block rather than
    /// drop it.
    pub fn flush(&mut self) -> Option<Block> {
        match &self.current {
            Some(block) if !block.is_empty() => self.take_sealed(),
            _ => None,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.current.as_ref().map_or(0, Block::count)
    }

    pub fn pending_bytes(&self) -> usize {
        self.current.as_ref().map_or(0, Block::size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ts: u64) -> PacketHeader {
        PacketHeader {
            captured_at_us: ts,
            wire_len: 4,
            captured_len: 4,
            dlt: 1,
            link_offset: 0,
            payload_offset: 0,
        }
    }

    #[test]
    fn seals_on_byte_ceiling() {
        let config = BuilderConfig::new(32, Duration::from_secs(3600));
        let mut builder = BlockBuilder::new(config, BlockIdSource::new(), 1);

        assert!(builder.append(header(1), &[0u8; 16]).is_none());
        // Second packet would push the block over 32 bytes once headers
        // are counted, so it must seal the first block and start a new one.
        let sealed = builder.append(header(2), &[0u8; 16]);
        assert!(sealed.is_some());
        let sealed = sealed.unwrap();
        assert_eq!(sealed.count(), 1);
        assert!(sealed.is_completed());
        assert_eq!(builder.pending_count(), 1);
    }

    #[test]
    fn seals_on_age_ceiling() {
        let config = BuilderConfig::new(1 << 20, Duration::from_millis(0));
        let mut builder = BlockBuilder::new(config, BlockIdSource::new(), 1);

        assert!(builder.append(header(1), &[0u8; 4]).is_none());
        std::thread::sleep(Duration::from_millis(1));
        let sealed = builder.append(header(2), &[0u8; 4]);
        assert!(sealed.is_some());
        assert_eq!(sealed.unwrap().count(), 1);
    }

    #[test]
    fn flush_returns_partial_block_once() {
        let config = BuilderConfig::new(1 << 20, Duration::from_secs(3600));
        let mut builder = BlockBuilder::new(config, BlockIdSource::new(), 1);

        assert!(builder.flush().is_none());
        builder.append(header(1), &[0u8; 4]);
        let flushed = builder.flush().expect("non-empty block should flush");
        assert_eq!(flushed.count(), 1);
        assert!(flushed.is_completed());
        assert!(builder.flush().is_none());
    }

    #[test]
    fn block_ids_are_monotonic_across_builders() {
        let ids = BlockIdSource::new();
        let mut a = BlockBuilder::new(BuilderConfig::default(), ids.clone(), 1);
        let mut b = BlockBuilder::new(BuilderConfig::default(), ids, 1);

        let first = a.append(header(1), &[0u8; 4]);
        assert!(first.is_none());
        let a_block = a.flush().unwrap();
        let b_block = b.append(header(1), &[0u8; 4]);
        assert!(b_block.is_none());
        let b_block = b.flush().unwrap();

        assert_ne!(a_block.id(), b_block.id());
    }
}
