//! mirror - framed TCP transport carrying blocks between a sender and a
//! receiver instance of the pipeline (§4.7 "Mirror transport").
//!
//! There is no framing layer of its own: each transmitted block is the
//! byte output of [`pktcodec::serialize_block`], which is already
//! self-delimited. The sender maintains one reconnecting connection to
//! its configured peer and drains a [`blockstore::BlockStoreQueue`] into
//! it; the receiver listens, spawns one reader thread per accepted
//! connection, and pushes every deserialized block into its own local
//! store as though it had been captured locally.

mod config;
mod connection;
mod error;
mod receiver;
mod sender;
mod stats;

pub use config::{MirrorConfig, MirrorDirection, RetryPolicy};
pub use error::MirrorError;
pub use receiver::MirrorReceiver;
pub use sender::MirrorSender;
pub use stats::{MirrorStats, MirrorStatsSnapshot};
