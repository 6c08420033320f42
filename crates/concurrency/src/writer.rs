//! Writer mutual exclusion.
//!
//! At most one write transaction is open store-wide at a time. Exclusion
//! spans two scopes:
//!
//! - in-process: a busy flag under a `parking_lot` mutex, with a condvar
//!   for waiters
//! - cross-process: an exclusive `fs2` lock on the store's lockfile
//!
//! The gate is token-style rather than guard-style: `acquire` blocks
//! until the caller owns the gate and `release` gives it back. The owner
//! of a write transaction is responsible for pairing the two, which keeps
//! the gate free of lifetimes and lets a transaction object own its store
//! handle outright.
//!
//! Readers never touch the gate; they only pin versions in the registry,
//! which is why a writer never blocks them.

use fs2::FileExt;
use mica_core::Result;
use parking_lot::{Condvar, Mutex};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::trace;

/// Gate serializing write transactions
pub struct WriterGate {
    busy: Mutex<bool>,
    freed: Condvar,
    lock_file: Option<File>,
}

impl WriterGate {
    /// Gate backed by a lockfile next to the store (cross-process exclusion)
    pub fn for_store(lock_path: &Path) -> Result<Self> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;
        Ok(Self {
            busy: Mutex::new(false),
            freed: Condvar::new(),
            lock_file: Some(lock_file),
        })
    }

    /// Gate for an in-memory store (in-process exclusion only)
    pub fn in_memory() -> Self {
        Self {
            busy: Mutex::new(false),
            freed: Condvar::new(),
            lock_file: None,
        }
    }

    /// Block until this caller is the store's only writer.
    ///
    /// Every successful `acquire` must be paired with exactly one
    /// `release`.
    pub fn acquire(&self) -> Result<()> {
        let mut busy = self.busy.lock();
        while *busy {
            self.freed.wait(&mut busy);
        }
        *busy = true;
        drop(busy);
        if let Some(file) = &self.lock_file {
            if let Err(e) = file.lock_exclusive() {
                *self.busy.lock() = false;
                self.freed.notify_one();
                return Err(e.into());
            }
        }
        trace!("writer gate acquired");
        Ok(())
    }

    /// Give the gate back after a commit or rollback
    pub fn release(&self) {
        if let Some(file) = &self.lock_file {
            // Best effort; the lock also dies with the process
            let _ = file.unlock();
        }
        *self.busy.lock() = false;
        self.freed.notify_one();
        trace!("writer gate released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_in_memory_gate_serializes_threads() {
        let gate = Arc::new(WriterGate::in_memory());
        let active = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    gate.acquire().unwrap();
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    active.fetch_sub(1, Ordering::SeqCst);
                    gate.release();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_file_gate_creates_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");
        let gate = WriterGate::for_store(&path).unwrap();
        gate.acquire().unwrap();
        assert!(path.exists());
        gate.release();
        // Reacquirable after release
        gate.acquire().unwrap();
        gate.release();
    }
}
