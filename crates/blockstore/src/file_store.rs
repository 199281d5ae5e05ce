use crate::config::StoreConfig;
use crate::error::StoreError;
use pktcodec::{deserialize_block, serialize_block, Block, DEFAULT_MAX_FRAME_BYTES};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Observable lifecycle of one spill file.
///
/// `OpenForPush` accepts new blocks. Once it fills or ages out it becomes
/// `Full` and is closed for further writes. The first `pop` against a
/// `Full` file opens a read handle and moves it to `OpenForPop`. Once
/// every pushed block has also been popped back out, it is `Drained` and
/// the queue deletes its backing file — there is no in-memory
/// "destroyed" state to observe, since nothing is left to hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStoreState {
    OpenForPush,
    Full,
    OpenForPop,
    Drained,
}

/// One disk-backed spill file: a sequence of [`Block`] frames written by
/// [`serialize_block`] and read back by [`deserialize_block`] in the same
/// order they were written.
pub(crate) struct FileStore {
    id: u64,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    reader: Option<BufReader<File>>,
    size: u64,
    push_count: u64,
    pop_count: u64,
    opened_at: Instant,
    full: bool,
}

impl FileStore {
    pub(crate) fn create(id: u64, folder: &Path) -> Result<Self, StoreError> {
        let path = folder.join(format!("blockstore-{id:020}.blk"));
        let file = File::create(&path)?;
        Ok(Self {
            id,
            path,
            writer: Some(BufWriter::new(file)),
            reader: None,
            size: 0,
            push_count: 0,
            pop_count: 0,
            opened_at: Instant::now(),
            full: false,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> FileStoreState {
        if !self.full {
            FileStoreState::OpenForPush
        } else if self.pop_count == self.push_count {
            FileStoreState::Drained
        } else if self.reader.is_some() {
            FileStoreState::OpenForPop
        } else {
            FileStoreState::Full
        }
    }

    /// Checks the size/age ceilings and, if either is crossed, closes the
    /// file for further pushes. Idempotent: a file already full stays full.
    pub(crate) fn check_full(&mut self, config: &StoreConfig) -> bool {
        if self.full {
            return true;
        }
        if self.size >= config.file_max_bytes
            || (self.size > 0 && self.opened_at.elapsed() >= config.file_max_age)
        {
            self.writer = None;
            self.full = true;
        }
        self.full
    }

    /// Closes the file for push regardless of its size/age ceilings.
    pub(crate) fn force_close(&mut self) {
        self.writer = None;
        self.full = true;
    }

    pub(crate) fn push(&mut self, block: &Block) -> Result<(), StoreError> {
        let writer = self
            .writer
            .as_mut()
            .expect("push called on a file store already closed for push");
        let before = writer.get_ref().metadata().map(|m| m.len()).unwrap_or(0);
        serialize_block(block, writer)?;
        writer.flush()?;
        let after = writer.get_ref().metadata().map(|m| m.len()).unwrap_or(before);
        self.size += after.saturating_sub(before);
        self.push_count += 1;
        Ok(())
    }

    /// Reads the next block back, opening the read handle lazily on first
    /// call. Returns `None` once every pushed block has been popped.
    pub(crate) fn pop(&mut self) -> Result<Option<Block>, StoreError> {
        if self.pop_count >= self.push_count {
            return Ok(None);
        }
        if self.reader.is_none() {
            let file = File::open(&self.path)?;
            self.reader = Some(BufReader::new(file));
        }
        let reader = self.reader.as_mut().expect("just populated");
        let block = deserialize_block(reader, DEFAULT_MAX_FRAME_BYTES)?;
        if block.is_some() {
            self.pop_count += 1;
        }
        Ok(block)
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.full && self.pop_count >= self.push_count
    }

    /// Consumes the file store and removes its backing file. Only valid
    /// once [`FileStore::is_drained`] holds.
    pub(crate) fn destroy(self) -> Result<(), StoreError> {
        drop(self.writer);
        drop(self.reader);
        fs::remove_file(&self.path)?;
        Ok(())
    }
}
