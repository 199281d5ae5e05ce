use std::io;
use thiserror::Error;

/// Failure modes surfaced by the mirror transport (§7's `MirrorConnect`/
/// `MirrorIO` rows).
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The sender could not reach `endpoint`. Not fatal: the sender
    /// backs off and retries.
    #[error("failed to connect to mirror peer {endpoint}: {source}")]
    Connect { endpoint: String, #[source] source: io::Error },
    /// A read or write against an already-established connection failed
    /// mid-stream. The connection is closed; a sender retries, a
    /// receiver's reader thread exits and the peer may reconnect.
    #[error("mirror connection i/o error: {0}")]
    Io(#[from] io::Error),
    /// A frame read off the wire failed to decode.
    #[error("mirror frame decode error: {0}")]
    Codec(#[from] pktcodec::CodecError),
    /// The receiver's local block store rejected a pushed block.
    #[error("failed to push received block into local store: {0}")]
    Store(#[from] blockstore::StoreError),
    /// Could not bind the configured listen endpoint.
    #[error("failed to bind mirror listener on {endpoint}: {source}")]
    Listen { endpoint: String, #[source] source: io::Error },
}
