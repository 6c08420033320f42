//! Changeset sync for Mica: encode, parse, and apply mutation logs.
//!
//! A write transaction records its API-level ops; this crate turns that
//! log into a self-contained binary frame another store can replay.
//! Applying the same changeset to two copies of the same base version
//! yields identical stores, because derived effects replay through the
//! same engine code paths on both sides.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod varint;
mod wire;

pub mod apply;
pub mod encode;
pub mod parse;

pub use apply::apply_changeset;
pub use encode::encode_changeset;
pub use parse::parse_changeset;

use mica_engine::ChangeOp;
use std::fmt;
use uuid::Uuid;

/// Stable identity of a syncing peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(Uuid);

impl PeerId {
    /// A fresh random identity
    pub fn random() -> Self {
        PeerId(Uuid::new_v4())
    }

    /// The raw 16-byte form carried in the frame header
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl From<Uuid> for PeerId {
    fn from(u: Uuid) -> Self {
        PeerId(u)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A parsed changeset: who produced it and what it did
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset {
    /// Producing peer
    pub peer: PeerId,
    /// Recorded ops in commit order
    pub ops: Vec<ChangeOp>,
}
