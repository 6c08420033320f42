//! Node encoding: the storage engine's basic building block.
//!
//! Every typed column is ultimately encoded through these primitives:
//!
//! - `int_array`: bit-packed integer leaves with minimum-width lanes
//! - `blob_array`: variable-length payloads with the small/big upgrade
//! - `bptree`: B+tree of integer leaves for large columns
//! - `header`: the common 8-byte node header
//!
//! Keeping serialization separate from the table layer (how columns are
//! composed out of nodes) makes format evolution easier to manage.

pub mod blob_array;
pub mod bptree;
pub mod header;
pub mod int_array;

pub use blob_array::BLOB_INLINE_MAX;
pub use bptree::{INNER_CAP, LEAF_CAP};
pub use header::{NodeHeader, NodeKind, NODE_HEADER_SIZE, WIDTH_LANES};
