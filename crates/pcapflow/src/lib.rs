//! pcapflow - top-level packet capture pipeline
//!
//! Wires together every other crate in this workspace into one running
//! process (§2's data flow, leaves first): [`capture`]'s per-interface
//! pipelines feed a single block writer (C5, this crate's [`writer`]
//! module), which hands sealed blocks to a [`blockstore::BlockStoreQueue`]
//! (C6). From there either a [`mirror::MirrorSender`] ships them to a
//! peer, a [`mirror::MirrorReceiver`] feeds them in from one, or this
//! crate's dispatch core (C8, [`dispatch`] module) drains the queue in
//! timestamp order and hands packets to the host process.
//!
//! [`pipeline::Pipeline`] is the entry point a host process links
//! against: it owns every thread this module spawns and tears them all
//! down in dependency order on [`pipeline::Pipeline::shutdown`].

mod config;
mod dispatch;
mod error;
mod pipeline;
mod writer;

pub use config::{DispatchConfig, PipelineConfig};
pub use dispatch::{DispatchCore, DltHandle, PacketProcessor};
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use writer::BlockWriter;

// Re-exported so a host process can build a full `PipelineConfig` and
// driver set without depending on every member crate directly.
pub use blockstore::StoreConfig;
pub use capture::{synthetic, CaptureConfig, CaptureDriver, CaptureError};
pub use mirror::{MirrorConfig, MirrorDirection};
pub use pktcodec::{Block, PacketHeader};
