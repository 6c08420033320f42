//! Mica: an embedded, versioned object store.
//!
//! Data lives in a single file (or purely in memory) as a forest of
//! copy-on-write nodes. Readers pin immutable versions and never block;
//! a single writer stages changes in an overlay and publishes them
//! atomically. The object model is tables of typed columns with links,
//! backlinks and secondary indexes; queries materialize explicit
//! snapshots; changesets replicate commits between stores.
//!
//! This crate is a facade over the workspace layers:
//!
//! - [`core`]: value model, keys, refs, errors
//! - [`storage`]: node arena, bit-packed arrays, trees, file format
//! - [`concurrency`]: version registry, writer gate, notifications
//! - [`engine`]: schema, tables, transactions
//! - [`query`]: predicates, views, aggregation
//! - [`sync`]: changeset encode / parse / apply

#![warn(missing_docs)]

pub use mica_concurrency as concurrency;
pub use mica_core as core;
pub use mica_engine as engine;
pub use mica_query as query;
pub use mica_storage as storage;
pub use mica_sync as sync;

pub use mica_core::{ColumnAttrs, ColumnType, Error, LinkType, ObjKey, Result, Value};
pub use mica_engine::{ChangeOp, Store, StoreConfig, Transaction};
pub use mica_query::{MatchMode, Predicate, Query, TableView};
pub use mica_sync::{
    apply_changeset, encode_changeset, parse_changeset, Changeset, PeerId,
};
