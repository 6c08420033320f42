//! Core types and traits for Mica
//!
//! This crate defines the foundational pieces used throughout the store:
//! - Ref: handle into the backing arena
//! - ObjKey / TableKey / ColKey: stable logical identifiers
//! - VersionId: immutable snapshot identity
//! - Value: unified cell value enum
//! - Error: the error taxonomy
//! - Traits: NodeStore / NodeStoreMut / Scheduler seams

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use traits::{NodeStore, NodeStoreMut, Scheduler};
pub use types::{ColKey, ColumnAttrs, ColumnType, LinkType, ObjKey, Ref, TableKey, VersionId};
pub use value::Value;
