use thiserror::Error;

/// Aggregates every per-crate error that can cross a boundary at the
/// orchestration layer (§1A/§7): capture, the block store, the mirror
/// transport, and the block codec each own their own failure modes, and
/// this type just composes them for callers one level up.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] capture::CaptureError),
    #[error(transparent)]
    Store(#[from] blockstore::StoreError),
    #[error(transparent)]
    Mirror(#[from] mirror::MirrorError),
    #[error(transparent)]
    Codec(#[from] pktcodec::CodecError),
    #[error("no interfaces configured")]
    NoInterfaces,
}
