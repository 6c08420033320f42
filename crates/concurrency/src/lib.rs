//! Concurrency layer for Mica: MVCC versioning, writer exclusion, and
//! commit notification plumbing.
//!
//! The protocol in one paragraph: readers pin a published version in the
//! `VersionRegistry` and run without any further locking; the single
//! writer (serialized by `WriterGate`, in-process and cross-process)
//! builds the next version copy-on-write and publishes it atomically; the
//! registry's watermark tells the arena which superseded nodes no reader
//! can still see; `NotificationHub` wakes event-loop observers after each
//! publish.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod scheduler;
pub mod transaction;
pub mod version;
pub mod writer;

pub use scheduler::{LoopScheduler, NotificationHub};
pub use transaction::TransactionStage;
pub use version::VersionRegistry;
pub use writer::WriterGate;
