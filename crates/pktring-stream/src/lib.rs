//! pktring-stream - async Stream/Sink adapters over pktring
//!
//! Bridges the thread-per-stage pipeline's lock-free rings (`pktring`) into
//! `tokio`'s async world, for the two places this codebase needs that
//! bridge: the mirror receiver's per-connection reader threads draining
//! into the block store, and anything downstream that would rather poll a
//! `Stream` than spin a dedicated consumer thread.
//!
//! # Features
//!
//! - **Hybrid polling**: event-driven via `Notify`, with a poll-interval
//!   safety net for the rare missed wakeup.
//! - **Backpressure**: senders await when the ring is full, woken when
//!   space frees up.
//! - **Graceful shutdown**: an internal oneshot plus a cloneable
//!   [`ShutdownSignal`] external handle.
//! - **Zero-copy path**: inherits `pktring`'s ownership-transfer semantics.
//!
//! ```ignore
//! use pktring_stream::channel;
//! use pktring::Config;
//! use tokio_stream::StreamExt;
//! use futures_sink::SinkExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (factory, mut rx) = channel::<u64>(Config::default());
//!     let mut tx = factory.register().unwrap();
//!     tx.send(42).await.unwrap();
//!     while let Some(item) = rx.next().await {
//!         println!("received: {item}");
//!     }
//! }
//! ```

mod channel;
mod config;
mod error;
mod invariants;
mod receiver;
mod sender;
mod shutdown;

pub use channel::{channel, channel_with_stream_config, SenderFactory};
pub use config::StreamConfig;
pub use error::StreamError;
pub use receiver::RingReceiver;
pub use sender::RingSender;
pub use shutdown::ShutdownSignal;

pub use tokio_stream::StreamExt;
