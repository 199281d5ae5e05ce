use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tuning for a [`crate::BlockStoreQueue`]: how much is kept in memory
/// before spilling to disk, and how large or old a spill file is allowed
/// to grow before it is closed for further writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Folder spill files are created in. Must exist and be writable.
    pub folder: PathBuf,
    /// Total size, summed across queued blocks, kept in memory before new
    /// pushes start spilling to a file store instead.
    pub max_memory_bytes: usize,
    /// Whether blocks are allowed to spill to disk at all once the memory
    /// ceiling is reached. `false` makes this a memory-only store:
    /// `push()` drops and counts instead of opening a spill file (§7's
    /// `MemoryCeiling` row — "C6 in-memory over limit and disk disabled").
    pub disk_spill_enabled: bool,
    /// Size ceiling for a single spill file before it is closed for push
    /// and a new one is opened.
    pub file_max_bytes: u64,
    /// Age ceiling for a single spill file before it is closed for push
    /// even if under its size ceiling — bounds how long a block can sit
    /// unflushed to a fresh file during a lull.
    #[serde(with = "duration_millis")]
    pub file_max_age: Duration,
    /// Minimum free space `folder`'s filesystem must retain. Once the
    /// memory ceiling is also reached, pushes are dropped and counted
    /// rather than spilled, instead of running the disk to empty. `0`
    /// disables the check.
    pub disk_free_min_bytes: u64,
    /// How often the free-space check actually stats the filesystem,
    /// rather than reusing its last sample — coarse by design, since
    /// `statvfs` is one syscall per push otherwise.
    #[serde(with = "duration_millis")]
    pub free_space_poll_interval: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl StoreConfig {
    pub fn new(
        folder: impl Into<PathBuf>,
        max_memory_bytes: usize,
        file_max_bytes: u64,
        file_max_age: Duration,
    ) -> Self {
        Self {
            folder: folder.into(),
            max_memory_bytes,
            disk_spill_enabled: true,
            file_max_bytes,
            file_max_age,
            disk_free_min_bytes: 0,
            free_space_poll_interval: Duration::from_secs(1),
        }
    }

    /// Sets the disk free-space floor and how often it is actually
    /// re-checked against the filesystem.
    pub fn with_disk_free_min(mut self, min_bytes: u64, poll_interval: Duration) -> Self {
        self.disk_free_min_bytes = min_bytes;
        self.free_space_poll_interval = poll_interval;
        self
    }

    /// Disables disk spill entirely, making this a memory-only store:
    /// pushes past `max_memory_bytes` are dropped and counted rather than
    /// written to a file store.
    pub fn with_disk_spill_disabled(mut self) -> Self {
        self.disk_spill_enabled = false;
        self
    }
}
