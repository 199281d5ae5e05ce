use serde::{Deserialize, Serialize};

/// Per-packet header stored alongside a packet's bytes inside a [`crate::Block`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacketHeader {
    /// Wall-clock capture timestamp, microseconds.
    pub captured_at_us: u64,
    /// Original length of the frame on the wire.
    pub wire_len: u32,
    /// Number of bytes actually captured and stored in the block payload.
    pub captured_len: u32,
    /// Link-layer type id (libpcap DLT_*).
    pub dlt: u16,
    /// Byte offset of the link-layer payload within this packet's bytes.
    pub link_offset: u16,
    /// Offset of this packet's bytes within the block's payload buffer.
    pub payload_offset: u32,
}
