use pktcodec::CodecError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error in block store: {0}")]
    Io(#[from] io::Error),
    #[error("block framing error: {0}")]
    Codec(#[from] CodecError),
    /// §7's `MemoryCeiling` row: the in-memory tier is over its ceiling
    /// and disk spill is disabled, so the block was dropped rather than
    /// queued. Not returned as an `Err` by `push()` — a dropped block is
    /// still a successfully handled push — but kept as a `StoreError`
    /// variant so the outcome is representable wherever callers match on
    /// this error family (mirroring how `DiskFull` is represented).
    #[error("block store memory ceiling reached and disk spill disabled, dropping block")]
    MemoryCeiling,
}
