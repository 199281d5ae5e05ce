use blockstore::BlockStoreQueue;
use pktcodec::Block;
use pktring::{Backoff, Channel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info_span, warn};

/// The block writer (C5): the single consumer on the ring-decomposed
/// channel every [`capture::InterfacePipeline`] registers a producer on.
/// It applies no transformation — it only drains sealed blocks in
/// round-robin producer order (§4.5, §9's round-robin open question) and
/// hands each to the shared [`BlockStoreQueue`].
///
/// The round-robin fairness falls out of [`Channel::consume_all_owned`]'s
/// own iteration over `rings[..producer_count]` in registration order; no
/// separate scheduler is needed here.
pub struct BlockWriter {
    terminate: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BlockWriter {
    pub fn spawn(channel: Channel<Block>, store: Arc<BlockStoreQueue>) -> Self {
        let terminate = Arc::new(AtomicBool::new(false));
        let handle = {
            let terminate = Arc::clone(&terminate);
            std::thread::spawn(move || writer_loop(channel, store, terminate))
        };
        Self { terminate, handle: Some(handle) }
    }

    /// Signals the writer to drain whatever is already in flight and
    /// exit. Does not block; call [`Self::join`] to wait.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// True once every registered producer ring has been closed by its
/// interface pipeline and fully drained — the cascade signal the writer
/// uses to stop, mirroring `capture::pipeline::upstream_done`.
fn all_producers_done(channel: &Channel<Block>) -> bool {
    let count = channel.producer_count();
    (0..count).all(|id| channel.get_ring(id).is_some_and(|r| r.is_closed() && r.is_empty()))
}

fn writer_loop(channel: Channel<Block>, store: Arc<BlockStoreQueue>, terminate: Arc<AtomicBool>) {
    let span = info_span!("block_writer");
    let _enter = span.enter();
    let mut backoff = Backoff::new();

    loop {
        let mut drained = 0usize;
        channel.consume_all_owned(|block| {
            drained += 1;
            if let Err(e) = store.push(block) {
                warn!(error = %e, "block writer failed to push block into store");
            }
        });

        if drained == 0 {
            if terminate.load(Ordering::Relaxed) || all_producers_done(&channel) {
                break;
            }
            backoff.snooze();
        } else {
            backoff.reset();
        }
    }
}
