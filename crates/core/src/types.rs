//! Core types for the Mica object store
//!
//! This module defines the foundational identifiers:
//! - Ref: handle to a node's location in the backing arena
//! - ObjKey: stable per-row identity within a table
//! - TableKey / ColKey: schema-level identifiers
//! - VersionId: immutable snapshot identity
//! - ColumnType / LinkType / ColumnAttrs: schema descriptors
//!
//! All persistent cross-table "pointers" are these integer keys; native
//! references are never stored across table boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a node's location in the backing arena.
///
/// A Ref is a byte offset into the store's logical address space. Refs are
/// stable only within one committed version: copy-on-write relocates a node
/// to a new ref on mutation. `Ref::NULL` (offset 0) never addresses a node;
/// the first 64 bytes of the address space are reserved for the file header.
/// The default ref is `Ref::NULL`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Ref(pub u64);

impl Ref {
    /// The null ref; never addresses a live node
    pub const NULL: Ref = Ref(0);

    /// Whether this is the null ref
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Raw offset value
    #[inline]
    pub fn offset(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{:#x}", self.0)
    }
}

/// Stable per-object identity within a table.
///
/// Object keys survive storage relocation: the key stays the same while the
/// physical position of the row's data changes across commits. Keys are
/// assigned monotonically per table and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjKey(pub u64);

impl ObjKey {
    /// Raw key value
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// Identifier of a table within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey(pub u32);

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tbl:{}", self.0)
    }
}

/// Identifier of a column within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColKey(pub u32);

impl fmt::Display for ColKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Identity of an immutable, point-in-time snapshot of the whole store.
///
/// The version number is the monotonic commit counter; the reader slot is
/// the index in the version registry pinning this snapshot against
/// reclamation. Once published, a version's nodes are never mutated in
/// place and are only freed once no reader holds the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionId {
    /// Monotonic commit counter
    pub number: u64,
    /// Index of the registry slot pinning this version
    pub slot: u32,
}

impl VersionId {
    /// Create a version identity
    pub fn new(number: u64, slot: u32) -> Self {
        Self { number, slot }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@{}", self.number, self.slot)
    }
}

// Versions order by commit number alone; the slot is registry bookkeeping.
impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.number.cmp(&other.number))
    }
}

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 32-bit IEEE-754 float
    Float,
    /// 64-bit IEEE-754 double
    Double,
    /// UTF-8 string
    String,
    /// Raw byte blob
    Binary,
    /// Typed link to an object in a target table
    Link,
    /// Ordered list of 64-bit integers, stored per-row as a nested array
    IntList,
}

impl ColumnType {
    /// Type name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "Int",
            ColumnType::Bool => "Bool",
            ColumnType::Float => "Float",
            ColumnType::Double => "Double",
            ColumnType::String => "String",
            ColumnType::Binary => "Binary",
            ColumnType::Link => "Link",
            ColumnType::IntList => "IntList",
        }
    }
}

/// Link ownership semantics
///
/// - `Strong`: the target row cascades-deletes once its last strong
///   referrer is removed.
/// - `Weak`: the referring link is nullified when the target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Owning link; unreferenced targets are cascade-deleted
    Strong,
    /// Non-owning link; nullified on target deletion
    Weak,
}

/// Column attributes
///
/// `indexed` adds an auxiliary value-to-keys index. `unique` implies an
/// index and additionally rejects duplicate values with a
/// `ConstraintViolation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnAttrs {
    /// Maintain a secondary value-to-keys index
    pub indexed: bool,
    /// Reject duplicate values (implies indexed)
    pub unique: bool,
}

impl ColumnAttrs {
    /// No attributes
    pub const NONE: ColumnAttrs = ColumnAttrs {
        indexed: false,
        unique: false,
    };

    /// Indexed, non-unique
    pub const INDEXED: ColumnAttrs = ColumnAttrs {
        indexed: true,
        unique: false,
    };

    /// Indexed and unique
    pub const UNIQUE: ColumnAttrs = ColumnAttrs {
        indexed: true,
        unique: true,
    };

    /// Whether a secondary index is required
    #[inline]
    pub fn needs_index(self) -> bool {
        self.indexed || self.unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_ref() {
        assert!(Ref::NULL.is_null());
        assert!(!Ref(64).is_null());
        assert_eq!(Ref(64).offset(), 64);
        assert_eq!(Ref::default(), Ref::NULL);
    }

    #[test]
    fn test_ref_display() {
        assert_eq!(Ref(255).to_string(), "ref:0xff");
    }

    #[test]
    fn test_obj_key_ordering() {
        let mut keys = vec![ObjKey(5), ObjKey(1), ObjKey(3)];
        keys.sort();
        assert_eq!(keys, vec![ObjKey(1), ObjKey(3), ObjKey(5)]);
    }

    #[test]
    fn test_version_ordering_ignores_slot() {
        let a = VersionId::new(3, 7);
        let b = VersionId::new(4, 0);
        assert!(a < b);
        let c = VersionId::new(3, 0);
        assert_eq!(a.partial_cmp(&c), Some(std::cmp::Ordering::Equal));
    }

    #[test]
    fn test_column_attrs() {
        assert!(!ColumnAttrs::NONE.needs_index());
        assert!(ColumnAttrs::INDEXED.needs_index());
        assert!(ColumnAttrs::UNIQUE.needs_index());
        assert!(ColumnAttrs::UNIQUE.unique);
    }

    #[test]
    fn test_column_type_names() {
        assert_eq!(ColumnType::Int.name(), "Int");
        assert_eq!(ColumnType::IntList.name(), "IntList");
    }

    #[test]
    fn test_serde_round_trip() {
        let key = ObjKey(42);
        let bytes = bincode::serialize(&key).unwrap();
        let back: ObjKey = bincode::deserialize(&bytes).unwrap();
        assert_eq!(key, back);
    }
}
