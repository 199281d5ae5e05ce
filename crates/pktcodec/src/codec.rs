use crate::block::Block;
use crate::header::PacketHeader;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Errors from encoding or decoding a block frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error while framing a block: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode block body: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("frame length {0} exceeds the configured maximum of {1} bytes")]
    FrameTooLarge(u32, u32),
}

/// Plain-old-data mirror of [`Block`] used only as the bincode wire shape.
/// `Block`'s own fields stay private so that `append`/`seal` remain the
/// only way to mutate a live block; this type exists solely so `serde` has
/// something to derive against.
#[derive(Serialize, Deserialize)]
struct WireBlock {
    id: u64,
    sensor_id: u32,
    headers: Vec<PacketHeader>,
    payload: Vec<u8>,
    compressed: Option<Vec<u8>>,
    min_ts: Option<u64>,
    max_ts: u64,
    completed: bool,
}

impl From<&Block> for WireBlock {
    fn from(block: &Block) -> Self {
        Self {
            id: block.id(),
            sensor_id: block.sensor_id(),
            headers: block.headers().to_vec(),
            payload: block.raw_payload().to_vec(),
            compressed: block.compressed_payload().map(<[u8]>::to_vec),
            min_ts: block.min_timestamp(),
            max_ts: block.max_timestamp(),
            completed: block.is_completed(),
        }
    }
}

impl From<WireBlock> for Block {
    fn from(wire: WireBlock) -> Self {
        Block::from_parts(
            wire.id,
            wire.sensor_id,
            wire.headers,
            wire.payload,
            wire.compressed,
            wire.min_ts,
            wire.max_ts,
            wire.completed,
        )
    }
}

/// A frame is `len: u32 | crc32: u32 | bincode(WireBlock)`, so a reader on
/// a byte stream (TCP socket, spilled file) can always tell where one
/// block ends and the next begins without a separate index.
const LENGTH_PREFIX_BYTES: usize = 4;
const CHECKSUM_BYTES: usize = 4;

/// Default ceiling on a single frame's encoded body, guarding a reader
/// against an unbounded allocation if a stream is corrupt or malicious.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Encodes `block` as one self-delimited frame and writes it to `out`.
pub fn serialize_block<W: Write>(block: &Block, out: &mut W) -> Result<(), CodecError> {
    let wire = WireBlock::from(block);
    let body = bincode::serialize(&wire)?;
    let checksum = crc32fast::hash(&body);

    out.write_all(&(body.len() as u32).to_le_bytes())?;
    out.write_all(&checksum.to_le_bytes())?;
    out.write_all(&body)?;
    Ok(())
}

/// Reads one frame previously written by [`serialize_block`] from `input`,
/// verifying its checksum before reconstructing the [`Block`].
///
/// Returns `Ok(None)` if `input` is at EOF before any byte of a new frame
/// has been read — the stream ended cleanly between frames. Any other
/// truncation surfaces as an `Io` error from the underlying `read_exact`.
pub fn deserialize_block<R: Read>(
    input: &mut R,
    max_frame_bytes: u32,
) -> Result<Option<Block>, CodecError> {
    let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
    match read_exact_or_eof(input, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_le_bytes(len_buf);
    if len > max_frame_bytes {
        return Err(CodecError::FrameTooLarge(len, max_frame_bytes));
    }

    let mut checksum_buf = [0u8; CHECKSUM_BYTES];
    input.read_exact(&mut checksum_buf)?;
    let expected = u32::from_le_bytes(checksum_buf);

    let mut body = vec![0u8; len as usize];
    input.read_exact(&mut body)?;

    let computed = crc32fast::hash(&body);
    if computed != expected {
        return Err(CodecError::ChecksumMismatch { expected, computed });
    }

    let wire: WireBlock = bincode::deserialize(&body)?;
    Ok(Some(wire.into()))
}

/// Like [`std::io::Read::read_exact`] but distinguishes "zero bytes read,
/// stream at EOF" (returns `Ok(false)`) from any other outcome, so callers
/// can loop over a stream of frames without mistaking end-of-stream for an
/// error.
fn read_exact_or_eof<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match input.read(&mut buf[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
