//! The store: one open database.
//!
//! A `Store` wires the layers together: the arena and optional backing
//! file from `mica-storage`, the version registry, writer gate and
//! notification hub from `mica-concurrency`. It hands out `Transaction`s
//! and owns the commit history used for replication.
//!
//! The store itself is cheap to clone handles of (`Arc` inside) and is
//! `Send + Sync`; transactions are caller-confined.

use crate::change::ChangeOp;
use crate::config::StoreConfig;
use crate::transaction::Transaction;
use mica_concurrency::{NotificationHub, VersionRegistry, WriterGate};
use mica_core::{Error, Ref, Result, Scheduler};
use mica_storage::{codec_for_key, Arena, FileStore};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One committed write transaction's change log
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Commit number the changes were published at
    pub version: u64,
    /// API-level mutations, in execution order
    pub changes: Vec<ChangeOp>,
}

pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) arena: Arc<Arena>,
    pub(crate) file: Option<FileStore>,
    pub(crate) registry: VersionRegistry,
    pub(crate) gate: WriterGate,
    pub(crate) hub: NotificationHub,
    pub(crate) history: Mutex<Vec<CommitRecord>>,
}

/// An open store
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.config.path)
            .field("version", &self.inner.registry.current().0)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the store described by `config`.
    ///
    /// A file-backed store validates the file header and replays the
    /// record log; the writer lockfile sits next to the store file.
    pub fn open(config: StoreConfig) -> Result<Store> {
        let codec = codec_for_key(config.encryption_key)?;
        let arena = Arc::new(Arena::new(config.max_file_size));
        let (file, gate, version, top_ref) = match &config.path {
            Some(path) => {
                let gate = WriterGate::for_store(&path.with_extension("lock"))?;
                if path.exists() {
                    let (fs, outcome) =
                        FileStore::open(path, codec, config.durability, &arena)?;
                    info!(path = %path.display(), version = outcome.version, "store opened");
                    (Some(fs), gate, outcome.version, outcome.top_ref)
                } else {
                    let fs = FileStore::create(path, codec, config.durability)?;
                    (Some(fs), gate, 0, Ref::NULL)
                }
            }
            None => (None, WriterGate::in_memory(), 0, Ref::NULL),
        };
        Ok(Store {
            inner: Arc::new(StoreInner {
                config,
                arena,
                file,
                registry: VersionRegistry::new(version, top_ref),
                gate,
                hub: NotificationHub::new(),
                history: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Start a read transaction pinned to the current version
    pub fn begin_read(&self) -> Result<Transaction> {
        Transaction::attach(Arc::clone(&self.inner))
    }

    /// Start a transaction already promoted to writing
    pub fn begin_write(&self) -> Result<Transaction> {
        let mut txn = self.begin_read()?;
        txn.promote_to_write()?;
        Ok(txn)
    }

    /// Commit number of the latest published version
    pub fn current_version(&self) -> u64 {
        self.inner.registry.current().0
    }

    /// Register a scheduler for commit notifications
    pub fn register_scheduler(&self, scheduler: &Arc<dyn Scheduler>) {
        self.inner.hub.register(scheduler);
    }

    /// Recorded change logs (empty unless `record_history` is set)
    pub fn history(&self) -> Vec<CommitRecord> {
        self.inner.history.lock().clone()
    }

    /// Rewrite the backing file keeping only live nodes.
    ///
    /// Takes the writer gate for its duration; refs stay valid.
    pub fn compact(&self) -> Result<()> {
        let file = self.inner.file.as_ref().ok_or_else(|| {
            Error::InvalidOperation("compact requires a file-backed store".to_string())
        })?;
        self.inner.gate.acquire()?;
        let (version, top_ref) = self.inner.registry.current();
        let result = file.compact(&self.inner.arena, version, top_ref);
        self.inner.gate.release();
        result
    }

    /// Write a zstd-compressed backup of the store file
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        let file = self.inner.file.as_ref().ok_or_else(|| {
            Error::InvalidOperation("backup requires a file-backed store".to_string())
        })?;
        self.inner.gate.acquire()?;
        let result = file.backup_to(dest);
        self.inner.gate.release();
        result
    }
}
