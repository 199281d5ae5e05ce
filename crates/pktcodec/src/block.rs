use crate::header::PacketHeader;

/// An ordered, append-only container of processed packets plus per-packet
/// headers — the unit of spill, transport, and dispatch.
///
/// Once [`Block::seal`] is called, `count` and `size_bytes` are immutable:
/// no further `append` is accepted. A sealed block holds either an
/// uncompressed payload or a compressed one, never a partial mix of both —
/// [`Block::compress`] atomically replaces the former with the latter.
#[derive(Debug, Clone)]
pub struct Block {
    id: u64,
    /// Identifies which capture interface (or, on a mirror receiver, which
    /// remote peer connection) this block's packets came from. Carried on
    /// the block rather than per packet since a block is never split
    /// across sources (§4.8's `process(..., sensor_id)`).
    sensor_id: u32,
    headers: Vec<PacketHeader>,
    payload: Vec<u8>,
    compressed: Option<Vec<u8>>,
    min_ts: u64,
    max_ts: u64,
    dirty: bool,
    completed: bool,
}

/// Returned by [`Block::append`] when the block has no room for another
/// packet of the given size under the builder's configured byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFull;

impl Block {
    pub(crate) fn new(id: u64, sensor_id: u32) -> Self {
        Self {
            id,
            sensor_id,
            headers: Vec::new(),
            payload: Vec::new(),
            compressed: None,
            min_ts: u64::MAX,
            max_ts: 0,
            dirty: false,
            completed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sensor_id(&self) -> u32 {
        self.sensor_id
    }

    pub fn count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Size in bytes of headers plus payload (or compressed payload, once
    /// compressed). This is what a block-store ceiling accounts against.
    pub fn size_bytes(&self) -> usize {
        let payload_len = self.compressed.as_ref().map_or(self.payload.len(), Vec::len);
        self.headers.len() * std::mem::size_of::<PacketHeader>() + payload_len
    }

    pub fn min_timestamp(&self) -> Option<u64> {
        (self.min_ts != u64::MAX).then_some(self.min_ts)
    }

    pub fn max_timestamp(&self) -> u64 {
        self.max_ts
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn headers(&self) -> &[PacketHeader] {
        &self.headers
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed.is_some()
    }

    /// Raw bytes of packet `index`, looked up by header offset/length.
    /// Panics if the block is compressed — decompress first via the block
    /// codec's companion decompression step, which is outside this crate's
    /// contract (§4.3 leaves compression opaque).
    pub fn packet_bytes(&self, index: usize) -> &[u8] {
        assert!(self.compressed.is_none(), "block is compressed; decompress before reading packets");
        let h = &self.headers[index];
        let start = h.payload_offset as usize;
        let end = start + h.captured_len as usize;
        &self.payload[start..end]
    }

    /// Appends one packet. Fails with [`BlockFull`] if `max_bytes` would be
    /// exceeded; the builder is responsible for sealing and starting a new
    /// block in that case, never for silently dropping the append.
    pub(crate) fn append(
        &mut self,
        mut header: PacketHeader,
        bytes: &[u8],
        max_bytes: usize,
    ) -> Result<(), BlockFull> {
        assert!(!self.completed, "cannot append to a sealed block");

        let projected = self.size_bytes() + std::mem::size_of::<PacketHeader>() + bytes.len();
        if !self.headers.is_empty() && projected > max_bytes {
            return Err(BlockFull);
        }

        header.payload_offset = self.payload.len() as u32;
        header.captured_len = bytes.len() as u32;
        self.payload.extend_from_slice(bytes);

        self.min_ts = self.min_ts.min(header.captured_at_us);
        self.max_ts = self.max_ts.max(header.captured_at_us);
        self.headers.push(header);
        self.dirty = true;

        Ok(())
    }

    /// Seals the block: no further appends are permitted.
    ///
    /// # Panics
    ///
    /// Panics if `min_timestamp() > max_timestamp()` for a non-empty block
    /// — this would mean a caller bypassed `append` and hand-built headers
    /// inconsistently; it is a programmer error, not a data condition.
    pub(crate) fn seal(&mut self) {
        if let Some(min_ts) = self.min_timestamp() {
            assert!(min_ts <= self.max_ts, "min timestamp after max timestamp");
        }
        self.completed = true;
        self.dirty = false;
    }

    /// Replaces the uncompressed payload with a compressed one. The two
    /// never coexist: the swap is atomic from the caller's perspective.
    pub fn compress(&mut self, compressed: Vec<u8>) {
        self.payload = Vec::new();
        self.compressed = Some(compressed);
    }

    /// Ratio of compressed to uncompressed size, for statistics. `None` if
    /// the block hasn't been compressed.
    pub fn compression_ratio(&self, uncompressed_len: usize) -> Option<f64> {
        self.compressed.as_ref().map(|c| {
            if uncompressed_len == 0 {
                1.0
            } else {
                c.len() as f64 / uncompressed_len as f64
            }
        })
    }

    pub(crate) fn raw_payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn compressed_payload(&self) -> Option<&[u8]> {
        self.compressed.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn headers_mut(&mut self) -> &mut Vec<PacketHeader> {
        &mut self.headers
    }

    /// Reconstructs a block from its wire/on-disk parts. Used only by the
    /// codec's deserialization path, which has already validated framing
    /// and checksum by the time it calls this.
    pub(crate) fn from_parts(
        id: u64,
        sensor_id: u32,
        headers: Vec<PacketHeader>,
        payload: Vec<u8>,
        compressed: Option<Vec<u8>>,
        min_ts: Option<u64>,
        max_ts: u64,
        completed: bool,
    ) -> Self {
        Self {
            id,
            sensor_id,
            headers,
            payload,
            compressed,
            min_ts: min_ts.unwrap_or(u64::MAX),
            max_ts,
            dirty: false,
            completed,
        }
    }
}
