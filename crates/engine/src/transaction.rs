//! Transactions: the only way in and out of a store.
//!
//! A transaction is caller-confined and moves through the stage machine
//! in `mica-concurrency`: it attaches to the current version as a reader,
//! may promote to the store's single writer, and publishes or discards
//! its copy-on-write overlay. Reads always run against the pinned
//! version; `advance_read` re-pins the latest one and never blocks.
//!
//! Every API-level mutation is recorded as a `ChangeOp` so a committed
//! transaction can be turned into a changeset for replication. Derived
//! effects (cascades, nullifications, index maintenance) are not
//! recorded; they replay from the triggering op.

use crate::change::ChangeOp;
use crate::group::Group;
use crate::schema::Schema;
use crate::store::{CommitRecord, StoreInner};
use mica_concurrency::TransactionStage;
use mica_core::{
    ColKey, ColumnAttrs, ColumnType, Error, LinkType, NodeStore, ObjKey, Ref, Result, TableKey,
    Value, VersionId,
};
use mica_storage::WriteArena;
use std::sync::Arc;
use tracing::{debug, warn};

/// A read or write transaction on one store
pub struct Transaction {
    store: Arc<StoreInner>,
    stage: TransactionStage,
    version: VersionId,
    top_ref: Ref,
    group: Group,
    write: Option<WriteArena>,
    changes: Vec<ChangeOp>,
}

impl Transaction {
    pub(crate) fn attach(store: Arc<StoreInner>) -> Result<Transaction> {
        let (version, top_ref) = store.registry.pin_current();
        let group = Group::load(store.arena.as_ref(), top_ref)?;
        Ok(Transaction {
            store,
            stage: TransactionStage::Reading,
            version,
            top_ref,
            group,
            write: None,
            changes: Vec::new(),
        })
    }

    /// Version this transaction is attached to
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> TransactionStage {
        self.stage
    }

    /// The schema of the attached version
    pub fn schema(&self) -> &Schema {
        &self.group.schema
    }

    /// Mutations recorded so far in this write transaction
    pub fn changes(&self) -> &[ChangeOp] {
        &self.changes
    }

    /// Node source for the attached version: the write overlay while
    /// writing, the shared arena otherwise
    fn nodes(&self) -> &dyn NodeStore {
        match &self.write {
            Some(w) => w,
            None => self.store.arena.as_ref(),
        }
    }

    fn overlay(&mut self) -> Result<(&mut WriteArena, &mut Group)> {
        self.stage.ensure_writing()?;
        let w = self.write.as_mut().ok_or_else(|| {
            Error::InvalidOperation("write overlay missing in writing stage".to_string())
        })?;
        Ok((w, &mut self.group))
    }

    /// Re-pin the latest published version, releasing the old pin
    fn rebind_latest(&mut self) -> Result<()> {
        let old = self.version;
        let (version, top_ref) = self.store.registry.pin_current();
        self.version = version;
        self.top_ref = top_ref;
        let watermark = self.store.registry.unpin(old)?;
        self.store.arena.reclaim(watermark);
        if version.number != old.number {
            self.group = Group::load(self.store.arena.as_ref(), top_ref)?;
        }
        Ok(())
    }

    /// Move the read position to the latest version. Never blocks and
    /// never moves backwards.
    pub fn advance_read(&mut self) -> Result<()> {
        self.stage.ensure_reading()?;
        self.rebind_latest()
    }

    /// Become the store's single writer, building on the latest version.
    ///
    /// Blocks until the writer gate is free. The read position advances
    /// to the latest version as part of promotion.
    pub fn promote_to_write(&mut self) -> Result<()> {
        self.stage.ensure_reading()?;
        self.store.gate.acquire()?;
        if let Err(e) = self.rebind_latest() {
            self.store.gate.release();
            return Err(e);
        }
        self.write = Some(WriteArena::new(Arc::clone(&self.store.arena)));
        self.stage = TransactionStage::Writing;
        debug!(version = self.version.number, "promoted to writer");
        Ok(())
    }

    /// Publish this transaction's changes as the next version.
    ///
    /// On success the transaction is back in the reading stage, attached
    /// to the version it just published. A failed write to the backing
    /// file leaves the previous version intact; the staged address ranges
    /// are lost until the store is reopened.
    pub fn commit(&mut self) -> Result<()> {
        self.stage.ensure_writing()?;
        let mut w = self.write.take().ok_or_else(|| {
            Error::InvalidOperation("write overlay missing in writing stage".to_string())
        })?;
        let top_ref = match self.group.save(&mut w) {
            Ok(r) => r,
            Err(e) => {
                w.rollback();
                return Err(self.abort_write(e));
            }
        };
        let next_version = self.store.registry.current().0 + 1;
        let commit = w.into_commit();
        if let Some(file) = &self.store.file {
            if let Err(e) = file.append_commit(
                &commit,
                next_version,
                top_ref,
                self.store.arena.logical_end(),
            ) {
                warn!(error = %e, "commit write failed; previous version intact");
                return Err(self.abort_write(e));
            }
        }
        self.store.arena.publish(commit, next_version);
        let published = self.store.registry.publish(top_ref);
        debug_assert_eq!(published, next_version);

        let old = self.version;
        let (version, new_top) = self.store.registry.pin_current();
        self.version = version;
        self.top_ref = new_top;
        let watermark = self.store.registry.unpin(old)?;
        self.store.arena.reclaim(watermark);
        self.store.gate.release();
        self.stage = TransactionStage::Reading;

        let changes = std::mem::take(&mut self.changes);
        debug!(version = next_version, ops = changes.len(), "committed");
        if self.store.config.record_history {
            self.store.history.lock().push(CommitRecord {
                version: next_version,
                changes,
            });
        }
        self.store.hub.broadcast();
        Ok(())
    }

    /// Shared failure path for commit: drop the writer role and fall back
    /// to reading the still-pinned version
    fn abort_write(&mut self, e: Error) -> Error {
        self.store.gate.release();
        self.changes.clear();
        self.stage = TransactionStage::Reading;
        match Group::load(self.store.arena.as_ref(), self.top_ref) {
            Ok(group) => {
                self.group = group;
                e
            }
            Err(load_err) => {
                self.stage = TransactionStage::Detached;
                load_err
            }
        }
    }

    /// Discard every staged change, returning to the reading stage on the
    /// version the write was built on
    pub fn rollback(&mut self) -> Result<()> {
        self.stage.ensure_writing()?;
        if let Some(w) = self.write.take() {
            w.rollback();
        }
        self.store.gate.release();
        self.changes.clear();
        self.stage = TransactionStage::Reading;
        self.group = Group::load(self.store.arena.as_ref(), self.top_ref)?;
        debug!(version = self.version.number, "rolled back");
        Ok(())
    }

    fn release(&mut self) {
        if self.stage == TransactionStage::Writing {
            if let Some(w) = self.write.take() {
                w.rollback();
            }
            self.store.gate.release();
        }
        if self.stage != TransactionStage::Detached {
            if let Ok(watermark) = self.store.registry.unpin(self.version) {
                self.store.arena.reclaim(watermark);
            }
            self.stage = TransactionStage::Detached;
        }
    }

    /// Detach from the store; the transaction accepts no further calls
    pub fn close(&mut self) {
        self.release();
    }

    // ----- schema mutations -----

    /// Create an empty table
    pub fn create_table(&mut self, name: &str) -> Result<TableKey> {
        let (w, group) = self.overlay()?;
        let key = group.create_table(w, name)?;
        self.changes.push(ChangeOp::CreateTable {
            table: name.to_string(),
        });
        Ok(key)
    }

    /// Add a non-link column
    pub fn add_column(
        &mut self,
        table: &str,
        name: &str,
        ty: ColumnType,
        nullable: bool,
        attrs: ColumnAttrs,
    ) -> Result<ColKey> {
        if ty == ColumnType::Link {
            return Err(Error::InvalidOperation(
                "link columns go through add_link_column".to_string(),
            ));
        }
        let (w, group) = self.overlay()?;
        let key = group.add_column(w, table, name, ty, nullable, attrs, None)?;
        self.changes.push(ChangeOp::AddColumn {
            table: table.to_string(),
            column: name.to_string(),
            ty,
            nullable,
            attrs,
            link_target: None,
            link_type: None,
        });
        Ok(key)
    }

    /// Add a link column into `target` (always nullable; null is "no
    /// target")
    pub fn add_link_column(
        &mut self,
        table: &str,
        name: &str,
        target: &str,
        link_type: LinkType,
    ) -> Result<ColKey> {
        let (w, group) = self.overlay()?;
        let key = group.add_column(
            w,
            table,
            name,
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some((target, link_type)),
        )?;
        self.changes.push(ChangeOp::AddColumn {
            table: table.to_string(),
            column: name.to_string(),
            ty: ColumnType::Link,
            nullable: true,
            attrs: ColumnAttrs::NONE,
            link_target: Some(target.to_string()),
            link_type: Some(link_type),
        });
        Ok(key)
    }

    // ----- object mutations -----

    /// Create an object with a fresh key
    pub fn create_object(&mut self, table: &str) -> Result<ObjKey> {
        let (w, group) = self.overlay()?;
        let key = group.create_object(w, table)?;
        self.changes.push(ChangeOp::CreateObject {
            table: table.to_string(),
            key,
        });
        Ok(key)
    }

    /// Create an object with a caller-chosen key (changeset replay)
    pub fn create_object_with_key(&mut self, table: &str, key: ObjKey) -> Result<()> {
        let (w, group) = self.overlay()?;
        group.create_object_with_key(w, table, key)?;
        self.changes.push(ChangeOp::CreateObject {
            table: table.to_string(),
            key,
        });
        Ok(())
    }

    /// Erase an object, cascading strong-owned targets and nullifying
    /// incoming links
    pub fn erase_object(&mut self, table: &str, key: ObjKey) -> Result<()> {
        let (w, group) = self.overlay()?;
        group.erase_object(w, table, key)?;
        self.changes.push(ChangeOp::EraseObject {
            table: table.to_string(),
            key,
        });
        Ok(())
    }

    /// Write one cell
    pub fn set(&mut self, table: &str, key: ObjKey, column: &str, value: Value) -> Result<()> {
        let (w, group) = self.overlay()?;
        group.set(w, table, key, column, &value)?;
        self.changes.push(ChangeOp::Set {
            table: table.to_string(),
            key,
            column: column.to_string(),
            value,
        });
        Ok(())
    }

    /// Insert into an integer-list cell
    pub fn list_insert(
        &mut self,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
        value: i64,
    ) -> Result<()> {
        let (w, group) = self.overlay()?;
        group.list_insert(w, table, key, column, ndx, value)?;
        self.changes.push(ChangeOp::ListInsert {
            table: table.to_string(),
            key,
            column: column.to_string(),
            ndx,
            value,
        });
        Ok(())
    }

    /// Overwrite an element of an integer-list cell
    pub fn list_set(
        &mut self,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
        value: i64,
    ) -> Result<()> {
        let (w, group) = self.overlay()?;
        group.list_set(w, table, key, column, ndx, value)?;
        self.changes.push(ChangeOp::ListSet {
            table: table.to_string(),
            key,
            column: column.to_string(),
            ndx,
            value,
        });
        Ok(())
    }

    /// Remove an element of an integer-list cell
    pub fn list_erase(
        &mut self,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
    ) -> Result<()> {
        let (w, group) = self.overlay()?;
        group.list_erase(w, table, key, column, ndx)?;
        self.changes.push(ChangeOp::ListErase {
            table: table.to_string(),
            key,
            column: column.to_string(),
            ndx,
        });
        Ok(())
    }

    // ----- reads -----

    /// Read one cell
    pub fn get(&self, table: &str, key: ObjKey, column: &str) -> Result<Value> {
        self.stage.ensure_attached()?;
        self.group.get(self.nodes(), table, key, column)
    }

    /// Whether `key` is live in `table`
    pub fn has_object(&self, table: &str, key: ObjKey) -> Result<bool> {
        self.stage.ensure_attached()?;
        self.group.has_object(self.nodes(), table, key)
    }

    /// Live object count of `table`
    pub fn object_count(&self, table: &str) -> Result<usize> {
        self.stage.ensure_attached()?;
        self.group.object_count(self.nodes(), table)
    }

    /// Every live key of `table`, ascending
    pub fn object_keys(&self, table: &str) -> Result<Vec<ObjKey>> {
        self.stage.ensure_attached()?;
        self.group.object_keys(self.nodes(), table)
    }

    /// Elements of an integer-list cell
    pub fn list_values(&self, table: &str, key: ObjKey, column: &str) -> Result<Vec<i64>> {
        self.stage.ensure_attached()?;
        self.group.list_values(self.nodes(), table, key, column)
    }

    /// Length of an integer-list cell
    pub fn list_len(&self, table: &str, key: ObjKey, column: &str) -> Result<usize> {
        self.stage.ensure_attached()?;
        self.group.list_len(self.nodes(), table, key, column)
    }

    /// One element of an integer-list cell
    pub fn list_get(&self, table: &str, key: ObjKey, column: &str, ndx: usize) -> Result<i64> {
        self.stage.ensure_attached()?;
        self.group.list_get(self.nodes(), table, key, column, ndx)
    }

    /// Keys referring to (`table`, `key`) through the named origin column
    pub fn backlink_keys(
        &self,
        table: &str,
        key: ObjKey,
        origin_table: &str,
        origin_column: &str,
    ) -> Result<Vec<ObjKey>> {
        self.stage.ensure_attached()?;
        self.group
            .backlink_keys(self.nodes(), table, key, origin_table, origin_column)
    }

    /// Index-accelerated equality lookup on an indexed column
    pub fn indexed_keys(&self, table: &str, column: &str, value: &Value) -> Result<Vec<ObjKey>> {
        self.stage.ensure_attached()?;
        self.group.indexed_keys(self.nodes(), table, column, value)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.release();
    }
}
