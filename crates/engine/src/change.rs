//! Change log operations.
//!
//! A write transaction records one `ChangeOp` per API-level mutation.
//! Derived effects are deliberately not recorded: a cascade delete or a
//! weak-link nullification replays deterministically from the triggering
//! `EraseObject`, so logging them would double-apply on replay.
//!
//! Ops reference tables and columns by name. Names survive schema key
//! renumbering across stores, which is what lets a changeset apply to an
//! independently opened copy of the same base version.

use mica_core::{ColumnAttrs, ColumnType, LinkType, ObjKey, Value};
use serde::{Deserialize, Serialize};

/// One recorded mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// A table was created
    CreateTable {
        /// Table name
        table: String,
    },
    /// A column was added to a table
    AddColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
        /// Data type
        ty: ColumnType,
        /// Whether null is legal
        nullable: bool,
        /// Index / uniqueness attributes
        attrs: ColumnAttrs,
        /// Target table name for link columns
        link_target: Option<String>,
        /// Ownership semantics for link columns
        link_type: Option<LinkType>,
    },
    /// An object was created with the given key
    CreateObject {
        /// Table name
        table: String,
        /// Assigned object key
        key: ObjKey,
    },
    /// An object was erased (cascades and nullifications replay from this)
    EraseObject {
        /// Table name
        table: String,
        /// Erased object key
        key: ObjKey,
    },
    /// A scalar or link cell was written
    Set {
        /// Table name
        table: String,
        /// Object key
        key: ObjKey,
        /// Column name
        column: String,
        /// New value
        value: Value,
    },
    /// An element was inserted into an integer list
    ListInsert {
        /// Table name
        table: String,
        /// Object key
        key: ObjKey,
        /// List column name
        column: String,
        /// Insertion index
        ndx: usize,
        /// Inserted element
        value: i64,
    },
    /// A list element was overwritten
    ListSet {
        /// Table name
        table: String,
        /// Object key
        key: ObjKey,
        /// List column name
        column: String,
        /// Element index
        ndx: usize,
        /// New element
        value: i64,
    },
    /// A list element was removed
    ListErase {
        /// Table name
        table: String,
        /// Object key
        key: ObjKey,
        /// List column name
        column: String,
        /// Element index
        ndx: usize,
    },
}
