//! Commit notification delivery.
//!
//! The `Scheduler` trait (in `mica-core`) marshals "something committed,
//! wake up on your own thread" signals to event-loop bindings. This module
//! provides:
//!
//! - `LoopScheduler`: a coalescing, poll-driven scheduler for callers that
//!   own their loop. `notify` (any thread) sets a flag; `poll` (owning
//!   thread) runs the callback at most once per batch of notifications.
//! - `NotificationHub`: the fan-out registry the store drives after each
//!   commit. Dead schedulers are dropped lazily on the next broadcast.
//!
//! Delivery is at-least-once and asynchronous; the hub carries no data
//! consistency responsibility. Observers still advance their own read
//! transactions to see the new version.

use mica_core::Scheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::trace;

type Callback = Box<dyn Fn() + Send + Sync>;

/// Poll-driven scheduler bound to the thread that created it
pub struct LoopScheduler {
    owner: ThreadId,
    pending: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl LoopScheduler {
    /// Create a scheduler owned by the calling thread
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            owner: thread::current().id(),
            pending: AtomicBool::new(false),
            callback: Mutex::new(None),
        })
    }

    /// Install the callback `poll` runs after a notification
    pub fn set_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        *self.callback.lock() = Some(Box::new(cb));
    }

    /// Run the callback if any notifications arrived since the last poll.
    ///
    /// Multiple `notify` calls coalesce into one invocation. Returns
    /// whether the callback ran. Must be called from the owning thread.
    pub fn poll(&self) -> bool {
        debug_assert!(self.is_on_thread(), "poll called off the owning thread");
        if !self.pending.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(cb) = self.callback.lock().as_ref() {
            cb();
            return true;
        }
        false
    }

    /// Whether a notification is waiting (without consuming it)
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl Scheduler for LoopScheduler {
    fn notify(&self) {
        self.pending.store(true, Ordering::Release);
    }

    fn is_on_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}

/// Fan-out of commit notifications to registered schedulers
#[derive(Default)]
pub struct NotificationHub {
    schedulers: Mutex<Vec<Weak<dyn Scheduler>>>,
}

impl NotificationHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scheduler for commit notifications.
    ///
    /// The hub holds only a weak reference; dropping the scheduler
    /// unregisters it.
    pub fn register(&self, scheduler: &Arc<dyn Scheduler>) {
        self.schedulers.lock().push(Arc::downgrade(scheduler));
    }

    /// Notify every live scheduler, pruning dead ones
    pub fn broadcast(&self) {
        let mut schedulers = self.schedulers.lock();
        schedulers.retain(|weak| match weak.upgrade() {
            Some(s) if s.can_deliver() => {
                s.notify();
                true
            }
            Some(_) => true,
            None => false,
        });
        trace!(count = schedulers.len(), "commit broadcast");
    }

    /// Number of registered schedulers (diagnostics and tests)
    pub fn len(&self) -> usize {
        self.schedulers.lock().len()
    }

    /// Whether the hub has no registrations
    pub fn is_empty(&self) -> bool {
        self.schedulers.lock().is_empty()
    }
}
