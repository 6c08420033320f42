//! Storage layer for Mica: arena, node encoding, file format, codecs.
//!
//! The layering inside this crate follows the store's dependency order:
//! the arena allocator hands out refs in a logical address space, the node
//! module encodes typed data into arena nodes, and the file module
//! persists the arena as an append-only record log behind a codec seam
//! (identity or AES-GCM page encryption).
//!
//! Nothing in this crate knows about tables, objects, or transactions;
//! those live in the layers above and reach storage exclusively through
//! `NodeStore` / `NodeStoreMut`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alloc;
pub mod codec;
pub mod file;
pub mod node;
pub mod testing;

pub use alloc::{Arena, CommitSet, WriteArena, HEADER_RESERVED};
pub use codec::{codec_for_key, AesGcmCodec, IdentityCodec, StorageCodec};
pub use file::{DurabilityMode, FileStore, OpenOutcome, FILE_HEADER_SIZE};
