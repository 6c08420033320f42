//! Store open configuration.

use mica_storage::DurabilityMode;
use std::path::PathBuf;

/// Default address-space ceiling: 1 GiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 30;

/// Everything needed to open (or create) a store.
///
/// The config is the process-scoped context object: one per open store,
/// no globals. `path = None` opens a transient in-memory store, useful
/// for tests and caches; such a store ignores `durability`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backing file path, or None for an in-memory store
    pub path: Option<PathBuf>,
    /// Ceiling on the logical address space (and thus the file size)
    pub max_file_size: u64,
    /// AES-256-GCM page encryption key, or None for plaintext
    pub encryption_key: Option<[u8; 32]>,
    /// How eagerly commits reach the disk
    pub durability: DurabilityMode,
    /// Keep per-commit change logs for replication
    pub record_history: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            encryption_key: None,
            durability: DurabilityMode::Strict,
            record_history: false,
        }
    }
}

impl StoreConfig {
    /// Config for an in-memory store
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Config for a file-backed store at `path`
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the encryption key
    pub fn with_encryption_key(mut self, key: [u8; 32]) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Set the address-space ceiling
    pub fn with_max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = max;
        self
    }

    /// Set the durability mode
    pub fn with_durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Enable per-commit change history
    pub fn with_history(mut self) -> Self {
        self.record_history = true;
        self
    }
}
