//! Engine layer for Mica: tables, objects, links, and transactions.
//!
//! This crate turns the raw node storage into the object model: a group
//! of typed tables addressed by stable object keys, mutated exclusively
//! through MVCC transactions. Layering inside the crate:
//!
//! - `schema` / `table` / `group`: the data model over `NodeStore`
//! - `store` / `transaction`: the MVCC lifecycle gluing the model to the
//!   arena, file, version registry and writer gate
//! - `change`: the per-transaction mutation log replication builds on
//!
//! The query and sync layers consume this crate's public surface only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod config;
pub mod group;
pub mod schema;
pub mod store;
pub mod table;
pub mod transaction;

pub use change::ChangeOp;
pub use config::StoreConfig;
pub use schema::{ColumnSchema, LinkSpec, Schema, TableSchema};
pub use store::{CommitRecord, Store};
pub use transaction::Transaction;
