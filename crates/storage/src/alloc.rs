//! Arena allocator over the store's logical address space.
//!
//! The arena owns all node memory. Refs are byte offsets in a logical
//! address space that mirrors the on-disk file layout: offset 0..64 is
//! reserved for the file header, nodes are placed at 8-byte-aligned
//! offsets after it, and freed ranges are recycled through size-classed
//! free lists.
//!
//! # Versioning contract
//!
//! Published nodes are immutable; mutation happens through `WriteArena`, a
//! private copy-on-write overlay owned by the single write transaction.
//! Freeing a committed node is deferred: the range is queued with the
//! version that freed it and only recycled once the reader watermark (the
//! oldest version any reader still pins) has moved past that version. This
//! is what lets readers keep dereferencing a superseded version's refs
//! without any locking against the writer.
//!
//! Readers take a brief read lock to clone out the `Arc` of a node's
//! bytes; the writer only takes the matching write lock for the moment a
//! commit is published.

use mica_core::{Error, NodeStore, NodeStoreMut, Ref, Result};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Bytes at the front of the address space reserved for the file header
pub const HEADER_RESERVED: u64 = 64;

#[inline]
fn round8(n: usize) -> usize {
    ((n + 7) & !7).max(8)
}

/// A freed range awaiting the reader watermark
#[derive(Debug, Clone, Copy)]
struct DeferredFree {
    /// Version whose commit freed the range
    version: u64,
    at: u64,
    size: usize,
}

#[derive(Debug, Default)]
struct AllocState {
    logical_end: u64,
    /// Rounded size -> freed offsets available for reuse
    free_lists: FxHashMap<usize, Vec<u64>>,
    deferred: Vec<DeferredFree>,
}

/// The set of node changes one commit publishes into the arena
#[derive(Debug, Default)]
pub struct CommitSet {
    /// Nodes created by the transaction, ready to publish
    pub new_nodes: Vec<(u64, Arc<[u8]>)>,
    /// Committed refs the transaction freed (deferred reclamation)
    pub freed: Vec<u64>,
    /// Reservations the transaction abandoned before commit
    pub abandoned: Vec<(u64, usize)>,
}

/// Shared node arena for one open store
pub struct Arena {
    nodes: RwLock<FxHashMap<u64, Arc<[u8]>>>,
    state: Mutex<AllocState>,
    max_size: u64,
}

impl Arena {
    /// Create an empty arena with a size ceiling
    pub fn new(max_size: u64) -> Self {
        Self {
            nodes: RwLock::new(FxHashMap::default()),
            state: Mutex::new(AllocState {
                logical_end: HEADER_RESERVED,
                ..AllocState::default()
            }),
            max_size,
        }
    }

    /// Whether `r` currently addresses a published node
    pub fn contains(&self, r: Ref) -> bool {
        self.nodes.read().contains_key(&r.0)
    }

    /// Current end of the logical address space
    pub fn logical_end(&self) -> u64 {
        self.state.lock().logical_end
    }

    /// Reserve an address range for `size` bytes (rounded to 8)
    pub fn reserve(&self, size: usize) -> Result<u64> {
        let size = round8(size);
        let mut state = self.state.lock();
        if let Some(list) = state.free_lists.get_mut(&size) {
            if let Some(at) = list.pop() {
                trace!(at, size, "arena reuse from free list");
                return Ok(at);
            }
        }
        let at = state.logical_end;
        let new_end = at + size as u64;
        if new_end > self.max_size {
            return Err(Error::AllocationFailed {
                requested: size,
                limit: self.max_size,
            });
        }
        state.logical_end = new_end;
        Ok(at)
    }

    /// Return an unused reservation to the free lists
    pub fn release(&self, at: u64, size: usize) {
        let size = round8(size);
        self.state.lock().free_lists.entry(size).or_default().push(at);
    }

    /// Publish a commit's node set at `version`.
    ///
    /// Called under the store's writer lock. Freed committed refs are
    /// queued for reclamation rather than dropped, so readers pinning
    /// older versions keep resolving them.
    pub fn publish(&self, commit: CommitSet, version: u64) {
        let mut deferred = Vec::with_capacity(commit.freed.len());
        {
            let nodes = self.nodes.read();
            for at in &commit.freed {
                if let Some(bytes) = nodes.get(at) {
                    deferred.push(DeferredFree {
                        version,
                        at: *at,
                        size: round8(bytes.len()),
                    });
                }
            }
        }
        {
            let mut nodes = self.nodes.write();
            for (at, bytes) in commit.new_nodes {
                nodes.insert(at, bytes);
            }
        }
        let mut state = self.state.lock();
        state.deferred.extend(deferred);
        for (at, size) in commit.abandoned {
            state.free_lists.entry(round8(size)).or_default().push(at);
        }
    }

    /// Reclaim every deferred range freed at a version older than
    /// `watermark` (the oldest version still pinned by a reader).
    pub fn reclaim(&self, watermark: u64) {
        let ready: Vec<DeferredFree> = {
            let mut state = self.state.lock();
            let (ready, keep): (Vec<_>, Vec<_>) = state
                .deferred
                .drain(..)
                .partition(|d| d.version < watermark);
            state.deferred = keep;
            ready
        };
        if ready.is_empty() {
            return;
        }
        debug!(count = ready.len(), watermark, "reclaiming superseded nodes");
        {
            let mut nodes = self.nodes.write();
            for d in &ready {
                nodes.remove(&d.at);
            }
        }
        let mut state = self.state.lock();
        for d in ready {
            state.free_lists.entry(d.size).or_default().push(d.at);
        }
    }

    /// Install a node loaded from the backing file
    pub fn load_node(&self, at: u64, bytes: Vec<u8>) {
        let rounded = round8(bytes.len()) as u64;
        self.nodes.write().insert(at, Arc::from(bytes));
        let mut state = self.state.lock();
        state.logical_end = state.logical_end.max(at + rounded);
    }

    /// Drop a node recorded as freed in the backing file
    pub fn drop_node(&self, at: u64) {
        if let Some(bytes) = self.nodes.write().remove(&at) {
            self.state
                .lock()
                .free_lists
                .entry(round8(bytes.len()))
                .or_default()
                .push(at);
        }
    }

    /// Snapshot of every published node (for compaction)
    pub fn live_nodes(&self) -> Vec<(u64, Arc<[u8]>)> {
        let mut out: Vec<(u64, Arc<[u8]>)> = self
            .nodes
            .read()
            .iter()
            .map(|(at, bytes)| (*at, Arc::clone(bytes)))
            .collect();
        out.sort_by_key(|(at, _)| *at);
        out
    }

    /// Number of published nodes (diagnostics and tests)
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

impl NodeStore for Arena {
    fn node(&self, r: Ref) -> Result<Arc<[u8]>> {
        self.nodes.read().get(&r.0).cloned().ok_or(Error::InvalidRef(r))
    }
}

/// Copy-on-write overlay for the single write transaction.
///
/// Nodes created here stay private until `into_commit` hands them to
/// `Arena::publish`. Writing to a committed node relocates it into the
/// overlay; writing to an overlay node mutates in place and keeps its ref.
pub struct WriteArena {
    arena: Arc<Arena>,
    staged: FxHashMap<u64, Vec<u8>>,
    reservations: FxHashMap<u64, usize>,
    abandoned: Vec<(u64, usize)>,
    freed_committed: Vec<u64>,
}

impl WriteArena {
    /// Open an overlay on `arena`
    pub fn new(arena: Arc<Arena>) -> Self {
        Self {
            arena,
            staged: FxHashMap::default(),
            reservations: FxHashMap::default(),
            abandoned: Vec::new(),
            freed_committed: Vec::new(),
        }
    }

    /// Whether `r` was created by this transaction
    pub fn is_staged(&self, r: Ref) -> bool {
        self.staged.contains_key(&r.0)
    }

    /// Finish the transaction, producing the commit set to publish
    pub fn into_commit(self) -> CommitSet {
        CommitSet {
            new_nodes: self
                .staged
                .into_iter()
                .map(|(at, bytes)| (at, Arc::from(bytes)))
                .collect(),
            freed: self.freed_committed,
            abandoned: self.abandoned,
        }
    }

    /// Abandon the transaction, returning every reservation to the arena
    pub fn rollback(self) {
        let count = self.reservations.len() + self.abandoned.len();
        for (at, size) in self.reservations {
            self.arena.release(at, size);
        }
        for (at, size) in self.abandoned {
            self.arena.release(at, size);
        }
        trace!(count, "write overlay rolled back");
    }
}

impl NodeStore for WriteArena {
    fn node(&self, r: Ref) -> Result<Arc<[u8]>> {
        if let Some(bytes) = self.staged.get(&r.0) {
            return Ok(Arc::from(bytes.clone()));
        }
        self.arena.node(r)
    }
}

impl NodeStoreMut for WriteArena {
    fn put_node(&mut self, bytes: Vec<u8>) -> Result<Ref> {
        let size = round8(bytes.len());
        let at = self.arena.reserve(size)?;
        self.staged.insert(at, bytes);
        self.reservations.insert(at, size);
        Ok(Ref(at))
    }

    fn write_node(&mut self, r: Ref, bytes: Vec<u8>) -> Result<Ref> {
        if let Some(size) = self.reservations.get(&r.0).copied() {
            if round8(bytes.len()) <= size {
                self.staged.insert(r.0, bytes);
                return Ok(r);
            }
            // Outgrew the reservation: relocate within the overlay
            self.staged.remove(&r.0);
            self.reservations.remove(&r.0);
            self.abandoned.push((r.0, size));
            return self.put_node(bytes);
        }
        if !self.arena.contains(r) {
            return Err(Error::InvalidRef(r));
        }
        // Copy-on-write relocation of a committed node
        self.freed_committed.push(r.0);
        self.put_node(bytes)
    }

    fn free_node(&mut self, r: Ref) -> Result<()> {
        if self.staged.remove(&r.0).is_some() {
            if let Some(size) = self.reservations.remove(&r.0) {
                self.abandoned.push((r.0, size));
            }
            return Ok(());
        }
        if !self.arena.contains(r) {
            return Err(Error::InvalidRef(r));
        }
        self.freed_committed.push(r.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_respects_ceiling() {
        let arena = Arc::new(Arena::new(HEADER_RESERVED + 16));
        assert!(arena.reserve(8).is_ok());
        assert!(arena.reserve(8).is_ok());
        let err = arena.reserve(8).unwrap_err();
        assert!(matches!(err, Error::AllocationFailed { .. }));
    }

    #[test]
    fn test_free_list_reuse() {
        let arena = Arc::new(Arena::new(1 << 20));
        let a = arena.reserve(24).unwrap();
        arena.release(a, 24);
        let b = arena.reserve(24).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlay_put_and_read() {
        let arena = Arc::new(Arena::new(1 << 20));
        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![1, 2, 3]).unwrap();
        assert_eq!(&w.node(r).unwrap()[..], &[1, 2, 3]);
        // Not visible in the shared arena until published
        assert!(arena.node(r).is_err());
    }

    #[test]
    fn test_overlay_write_in_place_keeps_ref() {
        let arena = Arc::new(Arena::new(1 << 20));
        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![0u8; 16]).unwrap();
        let r2 = w.write_node(r, vec![9u8; 12]).unwrap();
        assert_eq!(r, r2);
        // Growth past the reservation relocates
        let r3 = w.write_node(r2, vec![9u8; 64]).unwrap();
        assert_ne!(r2, r3);
        assert!(w.node(r2).is_err());
    }

    #[test]
    fn test_cow_relocates_committed_node() {
        let arena = Arc::new(Arena::new(1 << 20));
        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![1u8; 8]).unwrap();
        arena.publish(w.into_commit(), 1);
        assert!(arena.contains(r));

        let mut w2 = WriteArena::new(Arc::clone(&arena));
        let r2 = w2.write_node(r, vec![2u8; 8]).unwrap();
        assert_ne!(r, r2);
        // Old version still readable from the shared arena
        assert_eq!(&arena.node(r).unwrap()[..], &[1u8; 8]);
        assert_eq!(&w2.node(r2).unwrap()[..], &[2u8; 8]);
    }

    #[test]
    fn test_deferred_reclaim_honors_watermark() {
        let arena = Arc::new(Arena::new(1 << 20));
        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![1u8; 8]).unwrap();
        arena.publish(w.into_commit(), 1);

        let mut w2 = WriteArena::new(Arc::clone(&arena));
        w2.free_node(r).unwrap();
        arena.publish(w2.into_commit(), 2);

        // A reader may still pin version 1
        arena.reclaim(2);
        assert!(arena.contains(r));
        // Once the watermark passes the freeing version, it goes
        arena.reclaim(3);
        assert!(!arena.contains(r));
    }

    #[test]
    fn test_rollback_returns_reservations() {
        let arena = Arc::new(Arena::new(HEADER_RESERVED + 16));
        let w = {
            let mut w = WriteArena::new(Arc::clone(&arena));
            w.put_node(vec![0u8; 16]).unwrap();
            w
        };
        assert!(arena.reserve(8).is_err());
        w.rollback();
        assert!(arena.reserve(16).is_ok());
    }

    #[test]
    fn test_publish_makes_nodes_visible() {
        let arena = Arc::new(Arena::new(1 << 20));
        let mut w = WriteArena::new(Arc::clone(&arena));
        let r = w.put_node(vec![5, 6]).unwrap();
        arena.publish(w.into_commit(), 1);
        assert_eq!(&arena.node(r).unwrap()[..], &[5, 6]);
        assert_eq!(arena.node_count(), 1);
    }
}
