//! The group: root object tying the schema to per-table data.
//!
//! Persistent layout hanging off the store's top ref:
//!
//! ```text
//! group root (int array) = [schema_ref, table_0_ref, table_1_ref, ...]
//! schema node            = blob leaf, element 0 = bincode(Schema)
//! table_i node           = int array, see `TableData`
//! ```
//!
//! The group is decoded once when a transaction attaches and mutated in
//! memory; `save` re-encodes every piece through the write overlay, so
//! the copy-on-write machinery relocates what changed and the commit gets
//! a fresh top ref.
//!
//! This module also owns the cross-table link semantics: setting a link
//! keeps the target's backlink list in step, erasing an object nullifies
//! incoming links, and removing the last strong referrer cascades into
//! the target.

use crate::schema::{ColumnSchema, LinkSpec, Schema, TableSchema};
use crate::table::TableData;
use mica_core::{
    ColKey, ColumnAttrs, ColumnType, Error, LinkType, NodeStore, NodeStoreMut, ObjKey, Ref,
    Result, TableKey, Value,
};
use mica_storage::node::{blob_array, int_array};
use tracing::debug;

/// Decoded group state for one transaction
#[derive(Debug, Clone, Default)]
pub struct Group {
    /// The schema this version was written under
    pub schema: Schema,
    /// Per-table data, aligned with `schema.tables`
    pub tables: Vec<TableData>,
    root: Ref,
    schema_ref: Ref,
    table_refs: Vec<Ref>,
}

impl Group {
    /// Decode the group at `top_ref` (NULL yields the empty group)
    pub fn load(store: &dyn NodeStore, top_ref: Ref) -> Result<Group> {
        if top_ref.is_null() {
            return Ok(Group::default());
        }
        let root_values = int_array::decode(&store.node(top_ref)?)?;
        if root_values.is_empty() {
            return Err(Error::Corruption("empty group root array".to_string()));
        }
        let schema_ref = Ref(root_values[0] as u64);
        let schema_node = store.node(schema_ref)?;
        let schema_bytes = blob_array::get(store, &schema_node, 0)?;
        let schema: Schema = bincode::deserialize(&schema_bytes)?;

        let table_refs: Vec<Ref> = root_values[1..].iter().map(|v| Ref(*v as u64)).collect();
        if table_refs.len() != schema.tables.len() {
            return Err(Error::Corruption(format!(
                "group root lists {} tables, schema has {}",
                table_refs.len(),
                schema.tables.len()
            )));
        }
        let mut tables = Vec::with_capacity(table_refs.len());
        for (r, ts) in table_refs.iter().zip(&schema.tables) {
            let values = int_array::decode(&store.node(*r)?)?;
            tables.push(TableData::decode(&values, ts.columns.len())?);
        }
        Ok(Group {
            schema,
            tables,
            root: top_ref,
            schema_ref,
            table_refs,
        })
    }

    /// Write the group back through the overlay, returning the new root
    pub fn save(&mut self, store: &mut dyn NodeStoreMut) -> Result<Ref> {
        let schema_bytes =
            bincode::serialize(&self.schema).map_err(|e| Error::Serialization(e.to_string()))?;
        self.schema_ref = if self.schema_ref.is_null() {
            let image = blob_array::encode_empty();
            let image = blob_array::insert(store, &image, 0, &schema_bytes)?;
            store.put_node(image)?
        } else {
            let node = store.node(self.schema_ref)?;
            let image = blob_array::set(store, &node, 0, &schema_bytes)?;
            store.write_node(self.schema_ref, image)?
        };

        self.table_refs.resize(self.tables.len(), Ref::NULL);
        for (i, data) in self.tables.iter().enumerate() {
            let image = int_array::encode(&data.encode());
            self.table_refs[i] = if self.table_refs[i].is_null() {
                store.put_node(image)?
            } else {
                store.write_node(self.table_refs[i], image)?
            };
        }

        let mut root_values = Vec::with_capacity(1 + self.table_refs.len());
        root_values.push(self.schema_ref.0 as i64);
        root_values.extend(self.table_refs.iter().map(|r| r.0 as i64));
        let image = int_array::encode(&root_values);
        self.root = if self.root.is_null() {
            store.put_node(image)?
        } else {
            store.write_node(self.root, image)?
        };
        Ok(self.root)
    }

    /// Resolve a (table, column) name pair to positions
    fn resolve(&self, table: &str, column: &str) -> Result<(usize, usize)> {
        let tp = self.schema.table_pos(table)?;
        let cp = self.schema.tables[tp].col_pos(column)?;
        Ok((tp, cp))
    }

    /// Backlink slot indexes of strong incoming columns for `table_pos`
    fn strong_slots(&self, table_pos: usize) -> Vec<usize> {
        self.schema
            .backlink_sources(table_pos)
            .iter()
            .enumerate()
            .filter(|(_, s)| s.link_type == LinkType::Strong)
            .map(|(i, _)| i)
            .collect()
    }

    /// Create an empty table, returning its key
    pub fn create_table(&mut self, store: &mut dyn NodeStoreMut, name: &str) -> Result<TableKey> {
        if self.schema.table_pos(name).is_ok() {
            return Err(Error::InvalidOperation(format!(
                "table '{name}' already exists"
            )));
        }
        let key = TableKey(self.schema.next_table_key);
        self.schema.next_table_key += 1;
        self.schema.tables.push(TableSchema {
            key,
            name: name.to_string(),
            columns: Vec::new(),
            next_col_key: 0,
        });
        self.tables.push(TableData::create(store)?);
        debug!(table = name, key = key.0, "table created");
        Ok(key)
    }

    /// Add a column; `link` must be present exactly for `ty == Link`
    pub fn add_column(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        name: &str,
        ty: ColumnType,
        nullable: bool,
        attrs: ColumnAttrs,
        link: Option<(&str, LinkType)>,
    ) -> Result<ColKey> {
        if (ty == ColumnType::Link) != link.is_some() {
            return Err(Error::InvalidOperation(
                "link target given iff the column type is Link".to_string(),
            ));
        }
        let table_pos = self.schema.table_pos(table)?;
        if self.schema.tables[table_pos].col_pos(name).is_ok() {
            return Err(Error::InvalidOperation(format!(
                "column '{name}' already exists on table '{table}'"
            )));
        }
        let link_spec = match link {
            Some((target, link_type)) => Some(LinkSpec {
                target: self.schema.table(target)?.key,
                link_type,
            }),
            None => None,
        };
        let key = ColKey(self.schema.tables[table_pos].next_col_key);
        let col = ColumnSchema {
            key,
            name: name.to_string(),
            ty,
            nullable,
            attrs,
            link: link_spec,
        };

        let rows = self.tables[table_pos].len(store)?;
        self.tables[table_pos].add_column(store, &col, rows)?;
        let col_pos = self.schema.tables[table_pos].columns.len();
        self.schema.tables[table_pos].columns.push(col);
        self.schema.tables[table_pos].next_col_key += 1;

        if let Some(spec) = link_spec {
            // The target table (possibly this one) gains a backlink slot
            let target_pos = self.schema.table_pos_by_key(spec.target)?;
            let slot = self.schema.backlink_slot(target_pos, table_pos, col_pos)?;
            let target_rows = self.tables[target_pos].len(store)?;
            self.tables[target_pos].add_backlink_slot(store, slot, target_rows)?;
        }
        debug!(table, column = name, key = key.0, "column added");
        Ok(key)
    }

    /// Create an object with a fresh key
    pub fn create_object(&mut self, store: &mut dyn NodeStoreMut, table: &str) -> Result<ObjKey> {
        let table_pos = self.schema.table_pos(table)?;
        let key = ObjKey(self.tables[table_pos].next_key);
        let schema = self.schema.tables[table_pos].clone();
        self.tables[table_pos].insert_row(store, &schema, key)?;
        Ok(key)
    }

    /// Create an object with a caller-chosen key (changeset replay)
    pub fn create_object_with_key(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        key: ObjKey,
    ) -> Result<()> {
        let table_pos = self.schema.table_pos(table)?;
        let schema = self.schema.tables[table_pos].clone();
        self.tables[table_pos].insert_row(store, &schema, key)?;
        Ok(())
    }

    /// Whether `key` is live in `table`
    pub fn has_object(&self, store: &dyn NodeStore, table: &str, key: ObjKey) -> Result<bool> {
        let table_pos = self.schema.table_pos(table)?;
        Ok(self.tables[table_pos].find_row(store, key)?.is_some())
    }

    /// Live object count of `table`
    pub fn object_count(&self, store: &dyn NodeStore, table: &str) -> Result<usize> {
        self.tables[self.schema.table_pos(table)?].len(store)
    }

    /// Every live key of `table`, ascending
    pub fn object_keys(&self, store: &dyn NodeStore, table: &str) -> Result<Vec<ObjKey>> {
        self.tables[self.schema.table_pos(table)?].keys(store)
    }

    /// Read one cell
    pub fn get(
        &self,
        store: &dyn NodeStore,
        table: &str,
        key: ObjKey,
        column: &str,
    ) -> Result<Value> {
        let (tp, cp) = self.resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].get_cell(store, &self.schema.tables[tp].columns[cp], cp, row)
    }

    /// Write one cell, maintaining link/backlink symmetry
    pub fn set(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        key: ObjKey,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        let (tp, cp) = self.resolve(table, column)?;
        self.set_pos(store, tp, key, cp, value)
    }

    fn set_pos(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table_pos: usize,
        key: ObjKey,
        col_pos: usize,
        value: &Value,
    ) -> Result<()> {
        let col = self.schema.tables[table_pos].columns[col_pos].clone();
        let row = self.tables[table_pos].row_of(store, key)?;
        let Some(spec) = col.link else {
            return self.tables[table_pos].set_cell(store, &col, col_pos, row, value);
        };

        let new_target = match value {
            Value::Null => None,
            Value::Link(k) => Some(*k),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Link",
                    actual: other.type_name(),
                })
            }
        };
        let target_pos = self.schema.table_pos_by_key(spec.target)?;
        let old_target = self.tables[table_pos]
            .get_cell(store, &col, col_pos, row)?
            .as_link();
        if old_target == new_target {
            return Ok(());
        }
        // Validate the new target before touching anything
        if let Some(k) = new_target {
            self.tables[target_pos].row_of(store, k)?;
        }
        let slot = self.schema.backlink_slot(target_pos, table_pos, col_pos)?;
        if let Some(old_k) = old_target {
            let old_row = self.tables[target_pos].row_of(store, old_k)?;
            self.tables[target_pos].backlink_remove(store, slot, old_row, key)?;
        }
        if let Some(new_k) = new_target {
            let new_row = self.tables[target_pos].row_of(store, new_k)?;
            self.tables[target_pos].backlink_add(store, slot, new_row, key)?;
        }
        self.tables[table_pos].set_cell(store, &col, col_pos, row, value)?;

        // Unlinking the last strong referrer cascades into the old target
        if let Some(old_k) = old_target {
            if spec.link_type == LinkType::Strong {
                let old_row = self.tables[target_pos].row_of(store, old_k)?;
                let strong = self.strong_slots(target_pos);
                if self.tables[target_pos].backlink_count(store, &strong, old_row)? == 0 {
                    self.erase_object_pos(store, target_pos, old_k)?;
                }
            }
        }
        Ok(())
    }

    /// Erase an object: incoming links are nullified, strong-owned targets
    /// left without a referrer are cascade-erased
    pub fn erase_object(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        key: ObjKey,
    ) -> Result<()> {
        let table_pos = self.schema.table_pos(table)?;
        self.erase_object_pos(store, table_pos, key)
    }

    fn erase_object_pos(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table_pos: usize,
        key: ObjKey,
    ) -> Result<()> {
        let row = self.tables[table_pos].row_of(store, key)?;
        let columns = self.schema.tables[table_pos].columns.clone();

        // Detach forward links, collecting strong targets orphaned by it
        let mut cascade: Vec<(usize, ObjKey)> = Vec::new();
        for (ci, col) in columns.iter().enumerate() {
            let Some(spec) = col.link else { continue };
            let cell = self.tables[table_pos].get_cell(store, col, ci, row)?;
            let Some(target_key) = cell.as_link() else {
                continue;
            };
            let target_pos = self.schema.table_pos_by_key(spec.target)?;
            let slot = self.schema.backlink_slot(target_pos, table_pos, ci)?;
            let target_row = self.tables[target_pos].row_of(store, target_key)?;
            self.tables[target_pos].backlink_remove(store, slot, target_row, key)?;
            if spec.link_type == LinkType::Strong {
                let strong = self.strong_slots(target_pos);
                if self.tables[target_pos].backlink_count(store, &strong, target_row)? == 0 {
                    cascade.push((target_pos, target_key));
                }
            }
        }

        // Nullify incoming links (weak and strong alike on a direct erase)
        let sources = self.schema.backlink_sources(table_pos);
        for (slot_idx, src) in sources.iter().enumerate() {
            let referrers = self.tables[table_pos].backlink_keys(store, slot_idx, row)?;
            for referrer in referrers {
                if referrer == key && src.table_pos == table_pos {
                    // Self-link; the row is going away with the object
                    continue;
                }
                let col = self.schema.tables[src.table_pos].columns[src.col_pos].clone();
                let r_row = self.tables[src.table_pos].row_of(store, referrer)?;
                self.tables[src.table_pos].set_cell(
                    store,
                    &col,
                    src.col_pos,
                    r_row,
                    &Value::Null,
                )?;
            }
        }

        let schema = self.schema.tables[table_pos].clone();
        // The row may have moved if a nullified referrer lived in this table
        let row = self.tables[table_pos].row_of(store, key)?;
        self.tables[table_pos].erase_row(store, &schema, row)?;
        debug!(table = %schema.name, key = key.0, "object erased");

        for (tp, tk) in cascade {
            // A cascade target may already be gone (erased via another path)
            if self.tables[tp].find_row(store, tk)?.is_some() {
                self.erase_object_pos(store, tp, tk)?;
            }
        }
        Ok(())
    }

    /// Keys referring to (`table`, `key`) through the named origin column
    pub fn backlink_keys(
        &self,
        store: &dyn NodeStore,
        table: &str,
        key: ObjKey,
        origin_table: &str,
        origin_column: &str,
    ) -> Result<Vec<ObjKey>> {
        let table_pos = self.schema.table_pos(table)?;
        let (otp, ocp) = self.resolve(origin_table, origin_column)?;
        let slot = self.schema.backlink_slot(table_pos, otp, ocp)?;
        let row = self.tables[table_pos].row_of(store, key)?;
        self.tables[table_pos].backlink_keys(store, slot, row)
    }

    /// Index-accelerated equality lookup on an indexed column
    pub fn indexed_keys(
        &self,
        store: &dyn NodeStore,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Vec<ObjKey>> {
        let (tp, cp) = self.resolve(table, column)?;
        let col = &self.schema.tables[tp].columns[cp];
        if !col.attrs.needs_index() {
            return Err(Error::InvalidOperation(format!(
                "column '{column}' is not indexed"
            )));
        }
        self.tables[tp].indexed_keys(store, col, cp, value)
    }

    /// Elements of a list cell
    pub fn list_values(
        &self,
        store: &dyn NodeStore,
        table: &str,
        key: ObjKey,
        column: &str,
    ) -> Result<Vec<i64>> {
        let (tp, cp) = self.list_resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].list_values(store, cp, row)
    }

    /// Length of a list cell
    pub fn list_len(
        &self,
        store: &dyn NodeStore,
        table: &str,
        key: ObjKey,
        column: &str,
    ) -> Result<usize> {
        let (tp, cp) = self.list_resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].list_len(store, cp, row)
    }

    /// One element of a list cell
    pub fn list_get(
        &self,
        store: &dyn NodeStore,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
    ) -> Result<i64> {
        let (tp, cp) = self.list_resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].list_get(store, cp, row, ndx)
    }

    /// Insert into a list cell
    pub fn list_insert(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
        v: i64,
    ) -> Result<()> {
        let (tp, cp) = self.list_resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].list_insert(store, cp, row, ndx, v)
    }

    /// Overwrite a list element
    pub fn list_set(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
        v: i64,
    ) -> Result<()> {
        let (tp, cp) = self.list_resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].list_set(store, cp, row, ndx, v)
    }

    /// Remove a list element
    pub fn list_erase(
        &mut self,
        store: &mut dyn NodeStoreMut,
        table: &str,
        key: ObjKey,
        column: &str,
        ndx: usize,
    ) -> Result<()> {
        let (tp, cp) = self.list_resolve(table, column)?;
        let row = self.tables[tp].row_of(store, key)?;
        self.tables[tp].list_erase(store, cp, row, ndx)
    }

    fn list_resolve(&self, table: &str, column: &str) -> Result<(usize, usize)> {
        let (tp, cp) = self.resolve(table, column)?;
        let col = &self.schema.tables[tp].columns[cp];
        if col.ty != ColumnType::IntList {
            return Err(Error::TypeMismatch {
                expected: "IntList",
                actual: col.ty.name(),
            });
        }
        Ok((tp, cp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_storage::testing::MemStore;

    fn demo_group(store: &mut MemStore) -> Group {
        let mut g = Group::default();
        g.create_table(store, "person").unwrap();
        g.add_column(
            store,
            "person",
            "name",
            ColumnType::String,
            false,
            ColumnAttrs::NONE,
            None,
        )
        .unwrap();
        g
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = MemStore::new();
        let mut g = demo_group(&mut store);
        let alice = g.create_object(&mut store, "person").unwrap();
        g.set(
            &mut store,
            "person",
            alice,
            "name",
            &Value::String("alice".into()),
        )
        .unwrap();

        let root = g.save(&mut store).unwrap();
        let loaded = Group::load(&store, root).unwrap();
        assert_eq!(loaded.schema, g.schema);
        assert_eq!(
            loaded.get(&store, "person", alice, "name").unwrap(),
            Value::String("alice".into())
        );
    }

    #[test]
    fn test_load_null_root_is_empty() {
        let store = MemStore::new();
        let g = Group::load(&store, Ref::NULL).unwrap();
        assert!(g.schema.tables.is_empty());
    }

    #[test]
    fn test_duplicate_table_and_column_rejected() {
        let mut store = MemStore::new();
        let mut g = demo_group(&mut store);
        assert!(g.create_table(&mut store, "person").is_err());
        assert!(g
            .add_column(
                &mut store,
                "person",
                "name",
                ColumnType::Int,
                false,
                ColumnAttrs::NONE,
                None
            )
            .is_err());
    }

    #[test]
    fn test_weak_link_nullified_on_target_erase() {
        let mut store = MemStore::new();
        let mut g = demo_group(&mut store);
        g.create_table(&mut store, "dog").unwrap();
        g.add_column(
            &mut store,
            "dog",
            "owner",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("person", LinkType::Weak)),
        )
        .unwrap();

        let alice = g.create_object(&mut store, "person").unwrap();
        let rex = g.create_object(&mut store, "dog").unwrap();
        g.set(&mut store, "dog", rex, "owner", &Value::Link(alice))
            .unwrap();
        assert_eq!(
            g.backlink_keys(&store, "person", alice, "dog", "owner")
                .unwrap(),
            vec![rex]
        );

        g.erase_object(&mut store, "person", alice).unwrap();
        assert!(!g.has_object(&store, "person", alice).unwrap());
        // The dog survives, its owner link nullified
        assert_eq!(
            g.get(&store, "dog", rex, "owner").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_strong_link_cascades_on_referrer_erase() {
        let mut store = MemStore::new();
        let mut g = Group::default();
        g.create_table(&mut store, "order").unwrap();
        g.create_table(&mut store, "item").unwrap();
        g.add_column(
            &mut store,
            "order",
            "item",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("item", LinkType::Strong)),
        )
        .unwrap();

        let order = g.create_object(&mut store, "order").unwrap();
        let item = g.create_object(&mut store, "item").unwrap();
        g.set(&mut store, "order", order, "item", &Value::Link(item))
            .unwrap();

        g.erase_object(&mut store, "order", order).unwrap();
        // Last strong referrer gone: the item goes too
        assert!(!g.has_object(&store, "item", item).unwrap());
    }

    #[test]
    fn test_strong_target_survives_while_referenced() {
        let mut store = MemStore::new();
        let mut g = Group::default();
        g.create_table(&mut store, "order").unwrap();
        g.create_table(&mut store, "item").unwrap();
        g.add_column(
            &mut store,
            "order",
            "item",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("item", LinkType::Strong)),
        )
        .unwrap();

        let a = g.create_object(&mut store, "order").unwrap();
        let b = g.create_object(&mut store, "order").unwrap();
        let item = g.create_object(&mut store, "item").unwrap();
        g.set(&mut store, "order", a, "item", &Value::Link(item))
            .unwrap();
        g.set(&mut store, "order", b, "item", &Value::Link(item))
            .unwrap();

        g.erase_object(&mut store, "order", a).unwrap();
        assert!(g.has_object(&store, "item", item).unwrap());
        g.erase_object(&mut store, "order", b).unwrap();
        assert!(!g.has_object(&store, "item", item).unwrap());
    }

    #[test]
    fn test_relinking_strong_orphan_cascades() {
        let mut store = MemStore::new();
        let mut g = Group::default();
        g.create_table(&mut store, "order").unwrap();
        g.create_table(&mut store, "item").unwrap();
        g.add_column(
            &mut store,
            "order",
            "item",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("item", LinkType::Strong)),
        )
        .unwrap();

        let order = g.create_object(&mut store, "order").unwrap();
        let first = g.create_object(&mut store, "item").unwrap();
        let second = g.create_object(&mut store, "item").unwrap();
        g.set(&mut store, "order", order, "item", &Value::Link(first))
            .unwrap();
        g.set(&mut store, "order", order, "item", &Value::Link(second))
            .unwrap();
        // Relinking orphaned the first item
        assert!(!g.has_object(&store, "item", first).unwrap());
        assert!(g.has_object(&store, "item", second).unwrap());
    }

    #[test]
    fn test_forced_erase_nullifies_strong_referrers() {
        let mut store = MemStore::new();
        let mut g = Group::default();
        g.create_table(&mut store, "order").unwrap();
        g.create_table(&mut store, "item").unwrap();
        g.add_column(
            &mut store,
            "order",
            "item",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("item", LinkType::Strong)),
        )
        .unwrap();

        let order = g.create_object(&mut store, "order").unwrap();
        let item = g.create_object(&mut store, "item").unwrap();
        g.set(&mut store, "order", order, "item", &Value::Link(item))
            .unwrap();

        // Erasing the target directly nullifies even strong referrers
        g.erase_object(&mut store, "item", item).unwrap();
        assert!(g.has_object(&store, "order", order).unwrap());
        assert_eq!(
            g.get(&store, "order", order, "item").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_link_to_missing_target_rejected() {
        let mut store = MemStore::new();
        let mut g = demo_group(&mut store);
        g.create_table(&mut store, "dog").unwrap();
        g.add_column(
            &mut store,
            "dog",
            "owner",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("person", LinkType::Weak)),
        )
        .unwrap();
        let rex = g.create_object(&mut store, "dog").unwrap();
        let err = g
            .set(&mut store, "dog", rex, "owner", &Value::Link(ObjKey(99)))
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }

    #[test]
    fn test_self_referential_table() {
        let mut store = MemStore::new();
        let mut g = demo_group(&mut store);
        g.add_column(
            &mut store,
            "person",
            "parent",
            ColumnType::Link,
            true,
            ColumnAttrs::NONE,
            Some(("person", LinkType::Weak)),
        )
        .unwrap();
        let child = g.create_object(&mut store, "person").unwrap();
        let parent = g.create_object(&mut store, "person").unwrap();
        g.set(&mut store, "person", child, "parent", &Value::Link(parent))
            .unwrap();
        assert_eq!(
            g.backlink_keys(&store, "person", parent, "person", "parent")
                .unwrap(),
            vec![child]
        );
        g.erase_object(&mut store, "person", parent).unwrap();
        assert_eq!(
            g.get(&store, "person", child, "parent").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_create_object_with_key_replay() {
        let mut store = MemStore::new();
        let mut g = demo_group(&mut store);
        g.create_object_with_key(&mut store, "person", ObjKey(7))
            .unwrap();
        assert!(g.has_object(&store, "person", ObjKey(7)).unwrap());
        // Fresh keys continue past the replayed one
        let next = g.create_object(&mut store, "person").unwrap();
        assert_eq!(next, ObjKey(8));
        // Replaying an existing key fails
        assert!(g
            .create_object_with_key(&mut store, "person", ObjKey(7))
            .is_err());
    }
}
