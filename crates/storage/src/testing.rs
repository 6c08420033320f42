//! Test support: an in-memory `NodeStore` with no versioning.
//!
//! `MemStore` backs unit tests for the node layer, where the full arena's
//! copy-on-write and reclamation machinery would only get in the way.
//! Frees take effect immediately.

use mica_core::{Error, NodeStore, NodeStoreMut, Ref, Result};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Flat ref-to-bytes store for node-layer tests
#[derive(Debug, Default)]
pub struct MemStore {
    nodes: FxHashMap<u64, Arc<[u8]>>,
    next: u64,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            next: 64,
        }
    }

    /// Number of live nodes
    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }
}

impl NodeStore for MemStore {
    fn node(&self, r: Ref) -> Result<Arc<[u8]>> {
        self.nodes.get(&r.0).cloned().ok_or(Error::InvalidRef(r))
    }
}

impl NodeStoreMut for MemStore {
    fn put_node(&mut self, bytes: Vec<u8>) -> Result<Ref> {
        let at = self.next;
        self.next += (bytes.len() as u64 + 7) & !7;
        self.next = self.next.max(at + 8);
        self.nodes.insert(at, Arc::from(bytes));
        Ok(Ref(at))
    }

    fn write_node(&mut self, r: Ref, bytes: Vec<u8>) -> Result<Ref> {
        if !self.nodes.contains_key(&r.0) {
            return Err(Error::InvalidRef(r));
        }
        self.nodes.insert(r.0, Arc::from(bytes));
        Ok(r)
    }

    fn free_node(&mut self, r: Ref) -> Result<()> {
        self.nodes.remove(&r.0).map(|_| ()).ok_or(Error::InvalidRef(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_free() {
        let mut store = MemStore::new();
        let r = store.put_node(vec![1, 2, 3]).unwrap();
        assert_eq!(&store.node(r).unwrap()[..], &[1, 2, 3]);
        store.free_node(r).unwrap();
        assert!(store.node(r).is_err());
    }

    #[test]
    fn test_write_keeps_ref() {
        let mut store = MemStore::new();
        let r = store.put_node(vec![1]).unwrap();
        let r2 = store.write_node(r, vec![2, 3]).unwrap();
        assert_eq!(r, r2);
        assert_eq!(&store.node(r).unwrap()[..], &[2, 3]);
    }
}
