//! pktcodec - packet block model and on-disk/on-wire block codec
//!
//! Packets are accumulated into [`Block`]s by a [`BlockBuilder`], which
//! seals a block once it is full or has aged past its configured ceiling.
//! Sealed blocks are framed by [`serialize_block`]/[`deserialize_block`]
//! into self-delimited, checksummed frames suitable for both the spilled
//! block store and the mirror transport's TCP stream.

mod block;
mod builder;
mod codec;
mod header;

pub use block::{Block, BlockFull};
pub use builder::{BlockBuilder, BlockIdSource, BuilderConfig};
pub use codec::{deserialize_block, serialize_block, CodecError, DEFAULT_MAX_FRAME_BYTES};
pub use header::PacketHeader;
