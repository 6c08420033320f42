//! Core trait seams
//!
//! This module defines the two abstraction points upper layers build on:
//!
//! - `NodeStore` / `NodeStoreMut`: read and copy-on-write access to encoded
//!   nodes, letting the table and query layers run identically against the
//!   committed arena and a write transaction's staged overlay.
//! - `Scheduler`: event-loop wakeup marshalling for change notifications.

use crate::error::Result;
use crate::types::Ref;
use std::sync::Arc;

/// Read access to encoded nodes.
///
/// Implementations return the node's full encoded byte image. Within one
/// committed version the bytes behind a ref never change, so handing out
/// shared `Arc` slices is safe without further locking.
pub trait NodeStore {
    /// Fetch the encoded bytes of a live node.
    ///
    /// # Errors
    /// Returns `InvalidRef` if the ref does not address a live node.
    fn node(&self, r: Ref) -> Result<Arc<[u8]>>;
}

/// Copy-on-write mutation access to nodes, available only inside a write
/// transaction.
///
/// The contract preserves the versioning invariant: committed nodes are
/// never modified in place. `write_node` on a committed ref relocates the
/// node (new ref, old ref freed at the current version); on a ref staged by
/// this same transaction it overwrites in place and keeps the ref.
pub trait NodeStoreMut: NodeStore {
    /// Allocate a fresh node holding `bytes`, returning its ref.
    ///
    /// # Errors
    /// Returns `AllocationFailed` when the configured size ceiling is hit.
    fn put_node(&mut self, bytes: Vec<u8>) -> Result<Ref>;

    /// Store new contents for the node at `r`, returning the ref the node
    /// now lives at (unchanged for staged nodes, relocated for committed
    /// ones).
    ///
    /// # Errors
    /// Returns `InvalidRef` if `r` is not live, or `AllocationFailed` on
    /// relocation when the size ceiling is hit.
    fn write_node(&mut self, r: Ref, bytes: Vec<u8>) -> Result<Ref>;

    /// Release the node at `r`. For committed nodes the release is deferred
    /// until no reader can still observe the freeing version.
    ///
    /// # Errors
    /// Returns `InvalidRef` if `r` is not live.
    fn free_node(&mut self, r: Ref) -> Result<()>;
}

/// Event-loop wakeup marshalling.
///
/// A scheduler delivers "something changed, run your callback on your own
/// thread" signals for GUI/event-loop bindings. Notifications are
/// asynchronous, at-least-once, and coalesced: several `notify` calls before
/// the callback runs may collapse into one invocation. The scheduler carries
/// no data-consistency responsibility; observers still advance their own
/// read transactions explicitly.
pub trait Scheduler: Send + Sync {
    /// Request an invocation of the registered callback on the scheduler's
    /// thread. Callable from any thread.
    fn notify(&self);

    /// Whether the calling thread is the scheduler's own thread.
    fn is_on_thread(&self) -> bool;

    /// Whether this scheduler is still able to deliver notifications.
    fn can_deliver(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both seams must stay object-safe; upper layers hold them boxed.
    fn _accepts_dyn_store(_s: &dyn NodeStore) {}
    fn _accepts_dyn_scheduler(_s: Arc<dyn Scheduler>) {}
}
