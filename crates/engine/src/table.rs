//! Table data: per-column subtrees addressed by object keys.
//!
//! A table's persistent state is one small metadata array:
//!
//! ```text
//! [next_key, key_root, {value, aux, idx_vals, idx_keys} per column, backlink roots...]
//! ```
//!
//! `key_root` is a sorted integer tree of live object keys; a row's logical
//! index is its position there. Every column subtree is aligned with that
//! order, so row insert/erase touches each column at the same index.
//!
//! Column storage by type:
//!
//! - Int, Bool, Float, Double, Link: integer tree. Bools store 0/1, floats
//!   store their IEEE-754 bit patterns, links store `target_key + 1` with 0
//!   as the null sentinel.
//! - String, Binary: one blob leaf per column (small/big upgrade inside).
//! - IntList: integer tree of per-row refs to nested integer trees, 0 for
//!   a list that was never written.
//!
//! Nullable scalar columns carry a null-mask tree in the `aux` slot (1 =
//! null); the value slot of a null cell is 0 / empty. An indexed column
//! keeps two aligned trees: `idx_vals` sorted by index slot, `idx_keys`
//! the owning object keys. String and binary values index by 64-bit hash,
//! so lookups re-verify candidates against the stored value.
//!
//! Backlink slots mirror `Schema::backlink_sources` order: one tree per
//! incoming link column, each row holding 0 or a ref to the list of
//! referrer keys.

use crate::schema::{ColumnSchema, TableSchema};
use mica_core::{ColumnType, Error, NodeStore, NodeStoreMut, ObjKey, Ref, Result, Value};
use mica_storage::node::{blob_array, bptree};
use std::hash::Hasher;

/// Storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnClass {
    IntTree,
    Blob,
    List,
}

fn class_of(ty: ColumnType) -> ColumnClass {
    match ty {
        ColumnType::String | ColumnType::Binary => ColumnClass::Blob,
        ColumnType::IntList => ColumnClass::List,
        _ => ColumnClass::IntTree,
    }
}

/// Deterministic 64-bit hash for blob index slots
fn blob_hash(bytes: &[u8]) -> i64 {
    let mut h = rustc_hash::FxHasher::default();
    h.write(bytes);
    h.finish() as i64
}

/// Raw stored slot for a scalar value in an integer-tree column
fn slot_for_scalar(col: &ColumnSchema, value: &Value) -> Result<i64> {
    Ok(match value {
        Value::Null => 0,
        Value::Int(v) => *v,
        Value::Bool(b) => i64::from(*b),
        Value::Float(f) => i64::from(f.to_bits()),
        Value::Double(d) => d.to_bits() as i64,
        Value::Link(k) => (k.0 + 1) as i64,
        Value::String(_) | Value::Binary(_) => {
            return Err(Error::TypeMismatch {
                expected: col.ty.name(),
                actual: value.type_name(),
            })
        }
    })
}

fn scalar_from_slot(ty: ColumnType, slot: i64) -> Result<Value> {
    Ok(match ty {
        ColumnType::Int => Value::Int(slot),
        ColumnType::Bool => Value::Bool(slot != 0),
        ColumnType::Float => Value::Float(f32::from_bits(slot as u32)),
        ColumnType::Double => Value::Double(f64::from_bits(slot as u64)),
        ColumnType::Link => {
            if slot == 0 {
                Value::Null
            } else {
                Value::Link(ObjKey(slot as u64 - 1))
            }
        }
        other => {
            return Err(Error::Corruption(format!(
                "scalar slot decode for non-scalar column type {}",
                other.name()
            )))
        }
    })
}

/// Index slot for a value, or None for null (nulls are not indexed)
fn index_slot(col: &ColumnSchema, value: &Value) -> Result<Option<i64>> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(blob_hash(s.as_bytes())),
        Value::Binary(b) => Some(blob_hash(b)),
        _ => Some(slot_for_scalar(col, value)?),
    })
}

/// First position in a sorted integer tree not less than `v`
fn tree_lower_bound(store: &dyn NodeStore, root: Ref, v: i64) -> Result<usize> {
    let n = bptree::total_len(store, root)?;
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if bptree::get(store, root, mid)? < v {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// First position in a sorted integer tree greater than `v`
fn tree_upper_bound(store: &dyn NodeStore, root: Ref, v: i64) -> Result<usize> {
    let n = bptree::total_len(store, root)?;
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if bptree::get(store, root, mid)? <= v {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// Subtree roots of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRefs {
    /// Value storage (integer tree or blob leaf)
    pub value: Ref,
    /// Null-mask tree, or NULL when the column has no mask
    pub aux: Ref,
    /// Sorted index slots, or NULL when not indexed
    pub idx_vals: Ref,
    /// Object keys aligned with `idx_vals`
    pub idx_keys: Ref,
}

/// Decoded per-table state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableData {
    /// Next object key to assign; keys are never reused
    pub next_key: u64,
    /// Sorted integer tree of live object keys
    pub key_root: Ref,
    /// Column subtree roots, aligned with the schema's column order
    pub cols: Vec<ColumnRefs>,
    /// Backlink trees, aligned with `Schema::backlink_sources` order
    pub backlinks: Vec<Ref>,
}

impl TableData {
    /// Fresh empty table
    pub fn create(store: &mut dyn NodeStoreMut) -> Result<TableData> {
        Ok(TableData {
            next_key: 0,
            key_root: bptree::create(store)?,
            cols: Vec::new(),
            backlinks: Vec::new(),
        })
    }

    /// Flatten into the metadata array image
    pub fn encode(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(2 + 4 * self.cols.len() + self.backlinks.len());
        out.push(self.next_key as i64);
        out.push(self.key_root.0 as i64);
        for c in &self.cols {
            out.push(c.value.0 as i64);
            out.push(c.aux.0 as i64);
            out.push(c.idx_vals.0 as i64);
            out.push(c.idx_keys.0 as i64);
        }
        for b in &self.backlinks {
            out.push(b.0 as i64);
        }
        out
    }

    /// Rebuild from the metadata array image; the column count comes from
    /// the schema, the rest of the array is backlink slots.
    pub fn decode(values: &[i64], n_cols: usize) -> Result<TableData> {
        if values.len() < 2 + 4 * n_cols {
            return Err(Error::Corruption(format!(
                "table metadata array too short: {} entries for {} columns",
                values.len(),
                n_cols
            )));
        }
        let mut cols = Vec::with_capacity(n_cols);
        for i in 0..n_cols {
            let at = 2 + 4 * i;
            cols.push(ColumnRefs {
                value: Ref(values[at] as u64),
                aux: Ref(values[at + 1] as u64),
                idx_vals: Ref(values[at + 2] as u64),
                idx_keys: Ref(values[at + 3] as u64),
            });
        }
        let backlinks = values[2 + 4 * n_cols..]
            .iter()
            .map(|v| Ref(*v as u64))
            .collect();
        Ok(TableData {
            next_key: values[0] as u64,
            key_root: Ref(values[1] as u64),
            cols,
            backlinks,
        })
    }

    /// Number of live rows
    pub fn len(&self, store: &dyn NodeStore) -> Result<usize> {
        bptree::total_len(store, self.key_root)
    }

    /// Whether the table has no rows
    pub fn is_empty(&self, store: &dyn NodeStore) -> Result<bool> {
        Ok(self.len(store)? == 0)
    }

    /// Every live object key, ascending
    pub fn keys(&self, store: &dyn NodeStore) -> Result<Vec<ObjKey>> {
        Ok(bptree::to_vec(store, self.key_root)?
            .into_iter()
            .map(|v| ObjKey(v as u64))
            .collect())
    }

    /// Row index of `key`, or None if not present
    pub fn find_row(&self, store: &dyn NodeStore, key: ObjKey) -> Result<Option<usize>> {
        let row = tree_lower_bound(store, self.key_root, key.0 as i64)?;
        if row < self.len(store)? && bptree::get(store, self.key_root, row)? as u64 == key.0 {
            Ok(Some(row))
        } else {
            Ok(None)
        }
    }

    /// Row index of `key`
    pub fn row_of(&self, store: &dyn NodeStore, key: ObjKey) -> Result<usize> {
        self.find_row(store, key)?.ok_or(Error::ObjectNotFound(key))
    }

    /// Object key at `row`
    pub fn key_at(&self, store: &dyn NodeStore, row: usize) -> Result<ObjKey> {
        Ok(ObjKey(bptree::get(store, self.key_root, row)? as u64))
    }

    /// Add storage for a newly declared column, padded with defaults for
    /// every existing row (null for nullable columns, zero/empty
    /// otherwise).
    pub fn add_column(
        &mut self,
        store: &mut dyn NodeStoreMut,
        col: &ColumnSchema,
        rows: usize,
    ) -> Result<()> {
        let value = match class_of(col.ty) {
            ColumnClass::Blob => {
                let mut image = blob_array::encode_empty();
                for i in 0..rows {
                    image = blob_array::insert(store, &image, i, b"")?;
                }
                store.put_node(image)?
            }
            ColumnClass::IntTree | ColumnClass::List => {
                let mut root = bptree::create(store)?;
                for _ in 0..rows {
                    root = bptree::push(store, root, 0)?;
                }
                root
            }
        };
        let aux = if col.has_null_mask() {
            let mut root = bptree::create(store)?;
            for _ in 0..rows {
                root = bptree::push(store, root, 1)?;
            }
            root
        } else {
            Ref::NULL
        };
        let mut refs = ColumnRefs {
            value,
            aux,
            idx_vals: Ref::NULL,
            idx_keys: Ref::NULL,
        };
        if col.attrs.needs_index() {
            refs.idx_vals = bptree::create(store)?;
            refs.idx_keys = bptree::create(store)?;
            if !col.nullable && col.ty != ColumnType::Link && col.ty != ColumnType::IntList {
                // Existing rows take the column's default value; index it
                let default = match class_of(col.ty) {
                    ColumnClass::Blob => blob_hash(b""),
                    _ => 0,
                };
                for row in 0..rows {
                    let key = self.key_at(store, row)?;
                    index_insert(store, &mut refs, default, key.0)?;
                }
            }
        }
        self.cols.push(refs);
        Ok(())
    }

    /// Insert a backlink slot at `slot_idx` (a new incoming link column
    /// was declared somewhere in the group)
    pub fn add_backlink_slot(
        &mut self,
        store: &mut dyn NodeStoreMut,
        slot_idx: usize,
        rows: usize,
    ) -> Result<()> {
        let mut root = bptree::create(store)?;
        for _ in 0..rows {
            root = bptree::push(store, root, 0)?;
        }
        self.backlinks.insert(slot_idx, root);
        Ok(())
    }

    /// Insert a fresh row for `key`, defaulting every column.
    ///
    /// Returns the row index. Keys usually arrive monotonically (appends),
    /// but replayed changesets may interleave, so the position is found by
    /// binary search.
    pub fn insert_row(
        &mut self,
        store: &mut dyn NodeStoreMut,
        schema: &TableSchema,
        key: ObjKey,
    ) -> Result<usize> {
        if self.find_row(store, key)?.is_some() {
            return Err(Error::InvalidOperation(format!(
                "object key {key} already exists in table {}",
                schema.name
            )));
        }
        let row = tree_lower_bound(store, self.key_root, key.0 as i64)?;
        self.key_root = bptree::insert(store, self.key_root, row, key.0 as i64)?;
        for (i, col) in schema.columns.iter().enumerate() {
            let refs = &mut self.cols[i];
            match class_of(col.ty) {
                ColumnClass::Blob => {
                    let node = store.node(refs.value)?;
                    let image = blob_array::insert(store, &node, row, b"")?;
                    refs.value = store.write_node(refs.value, image)?;
                }
                ColumnClass::IntTree | ColumnClass::List => {
                    refs.value = bptree::insert(store, refs.value, row, 0)?;
                }
            }
            if col.has_null_mask() {
                // Fresh nullable cells start out null
                refs.aux = bptree::insert(store, refs.aux, row, 1)?;
            } else if col.attrs.needs_index()
                && col.ty != ColumnType::Link
                && col.ty != ColumnType::IntList
            {
                let default = match class_of(col.ty) {
                    ColumnClass::Blob => blob_hash(b""),
                    _ => 0,
                };
                index_insert(store, refs, default, key.0)?;
            }
        }
        for bl in &mut self.backlinks {
            *bl = bptree::insert(store, *bl, row, 0)?;
        }
        self.next_key = self.next_key.max(key.0 + 1);
        Ok(row)
    }

    /// Remove the row at `row`, freeing everything it owns.
    ///
    /// Link and backlink semantics (cascade, nullify) are the caller's
    /// responsibility and must be settled before this runs.
    pub fn erase_row(
        &mut self,
        store: &mut dyn NodeStoreMut,
        schema: &TableSchema,
        row: usize,
    ) -> Result<()> {
        for (i, col) in schema.columns.iter().enumerate() {
            if col.attrs.needs_index() {
                let old = self.get_cell(store, col, i, row)?;
                if let Some(slot) = index_slot(col, &old)? {
                    let key = self.key_at(store, row)?;
                    index_remove(store, &mut self.cols[i], slot, key.0)?;
                }
            }
            let refs = &mut self.cols[i];
            match class_of(col.ty) {
                ColumnClass::Blob => {
                    let node = store.node(refs.value)?;
                    let image = blob_array::erase(store, &node, row)?;
                    refs.value = store.write_node(refs.value, image)?;
                }
                ColumnClass::List => {
                    let nested = Ref(bptree::get(store, refs.value, row)? as u64);
                    if !nested.is_null() {
                        bptree::destroy(store, nested)?;
                    }
                    refs.value = bptree::erase(store, refs.value, row)?;
                }
                ColumnClass::IntTree => {
                    refs.value = bptree::erase(store, refs.value, row)?;
                }
            }
            if !refs.aux.is_null() {
                refs.aux = bptree::erase(store, refs.aux, row)?;
            }
        }
        for bl in &mut self.backlinks {
            let nested = Ref(bptree::get(store, *bl, row)? as u64);
            if !nested.is_null() {
                bptree::destroy(store, nested)?;
            }
            *bl = bptree::erase(store, *bl, row)?;
        }
        self.key_root = bptree::erase(store, self.key_root, row)?;
        Ok(())
    }

    /// Read the cell at (`col`, `row`)
    pub fn get_cell(
        &self,
        store: &dyn NodeStore,
        col: &ColumnSchema,
        pos: usize,
        row: usize,
    ) -> Result<Value> {
        let refs = &self.cols[pos];
        if !refs.aux.is_null() && bptree::get(store, refs.aux, row)? != 0 {
            return Ok(Value::Null);
        }
        match class_of(col.ty) {
            ColumnClass::Blob => {
                let node = store.node(refs.value)?;
                let bytes = blob_array::get(store, &node, row)?;
                if col.ty == ColumnType::String {
                    let s = String::from_utf8(bytes).map_err(|_| {
                        Error::Corruption(format!("non-UTF-8 data in string column {}", col.name))
                    })?;
                    Ok(Value::String(s))
                } else {
                    Ok(Value::Binary(bytes))
                }
            }
            ColumnClass::IntTree => {
                scalar_from_slot(col.ty, bptree::get(store, refs.value, row)?)
            }
            ColumnClass::List => Err(Error::TypeMismatch {
                expected: "scalar column",
                actual: "IntList",
            }),
        }
    }

    /// Write the cell at (`col`, `row`).
    ///
    /// Maintains the null mask and the secondary index, and enforces the
    /// unique constraint. Link backlink bookkeeping is the caller's job.
    pub fn set_cell(
        &mut self,
        store: &mut dyn NodeStoreMut,
        col: &ColumnSchema,
        pos: usize,
        row: usize,
        value: &Value,
    ) -> Result<()> {
        if !value.fits(col.ty, col.nullable) {
            return Err(Error::TypeMismatch {
                expected: col.ty.name(),
                actual: value.type_name(),
            });
        }
        let key = self.key_at(store, row)?;
        if col.attrs.unique {
            if let Some(slot) = index_slot(col, value)? {
                for candidate in index_lookup(store, &self.cols[pos], slot)? {
                    if candidate == key.0 {
                        continue;
                    }
                    let other_row = self.row_of(store, ObjKey(candidate))?;
                    if self.get_cell(store, col, pos, other_row)? == *value {
                        return Err(Error::ConstraintViolation {
                            column: col.name.clone(),
                            reason: format!("value already present on {}", ObjKey(candidate)),
                        });
                    }
                }
            }
        }
        if col.attrs.needs_index() {
            let old = self.get_cell(store, col, pos, row)?;
            if let Some(slot) = index_slot(col, &old)? {
                index_remove(store, &mut self.cols[pos], slot, key.0)?;
            }
            if let Some(slot) = index_slot(col, value)? {
                index_insert(store, &mut self.cols[pos], slot, key.0)?;
            }
        }
        let refs = &mut self.cols[pos];
        match class_of(col.ty) {
            ColumnClass::Blob => {
                let bytes: &[u8] = match value {
                    Value::String(s) => s.as_bytes(),
                    Value::Binary(b) => b,
                    Value::Null => b"",
                    _ => unreachable!("fits() admits only blob values here"),
                };
                let node = store.node(refs.value)?;
                let image = blob_array::set(store, &node, row, bytes)?;
                refs.value = store.write_node(refs.value, image)?;
            }
            ColumnClass::IntTree => {
                let slot = slot_for_scalar(col, value)?;
                refs.value = bptree::set(store, refs.value, row, slot)?;
            }
            ColumnClass::List => {
                return Err(Error::TypeMismatch {
                    expected: "scalar column",
                    actual: "IntList",
                })
            }
        }
        if !refs.aux.is_null() {
            refs.aux = bptree::set(store, refs.aux, row, i64::from(value.is_null()))?;
        }
        Ok(())
    }

    /// Object keys whose indexed column currently equals `value`.
    ///
    /// Hash-indexed (string/binary) and float candidates are re-verified
    /// against the stored value; `-0.0` finds `0.0` and vice versa.
    pub fn indexed_keys(
        &self,
        store: &dyn NodeStore,
        col: &ColumnSchema,
        pos: usize,
        value: &Value,
    ) -> Result<Vec<ObjKey>> {
        let mut slots = Vec::new();
        if let Some(slot) = index_slot(col, value)? {
            slots.push(slot);
        }
        match value {
            Value::Float(f) if *f == 0.0 => {
                let other = i64::from((-*f).to_bits());
                if !slots.contains(&other) {
                    slots.push(other);
                }
            }
            Value::Double(d) if *d == 0.0 => {
                let other = (-*d).to_bits() as i64;
                if !slots.contains(&other) {
                    slots.push(other);
                }
            }
            _ => {}
        }
        let mut out = Vec::new();
        for slot in slots {
            for candidate in index_lookup(store, &self.cols[pos], slot)? {
                let row = self.row_of(store, ObjKey(candidate))?;
                if self.get_cell(store, col, pos, row)? == *value {
                    out.push(ObjKey(candidate));
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Elements of the list cell at (`pos`, `row`)
    pub fn list_values(
        &self,
        store: &dyn NodeStore,
        pos: usize,
        row: usize,
    ) -> Result<Vec<i64>> {
        let nested = Ref(bptree::get(store, self.cols[pos].value, row)? as u64);
        if nested.is_null() {
            return Ok(Vec::new());
        }
        bptree::to_vec(store, nested)
    }

    /// Length of the list cell
    pub fn list_len(&self, store: &dyn NodeStore, pos: usize, row: usize) -> Result<usize> {
        let nested = Ref(bptree::get(store, self.cols[pos].value, row)? as u64);
        if nested.is_null() {
            return Ok(0);
        }
        bptree::total_len(store, nested)
    }

    /// One element of the list cell
    pub fn list_get(
        &self,
        store: &dyn NodeStore,
        pos: usize,
        row: usize,
        ndx: usize,
    ) -> Result<i64> {
        let nested = Ref(bptree::get(store, self.cols[pos].value, row)? as u64);
        if nested.is_null() {
            return Err(Error::InvalidOperation(format!(
                "index {ndx} out of bounds for empty list"
            )));
        }
        bptree::get(store, nested, ndx)
    }

    /// Insert into the list cell, materializing the nested tree on first
    /// write
    pub fn list_insert(
        &mut self,
        store: &mut dyn NodeStoreMut,
        pos: usize,
        row: usize,
        ndx: usize,
        v: i64,
    ) -> Result<()> {
        let refs = &mut self.cols[pos];
        let old = Ref(bptree::get(store, refs.value, row)? as u64);
        let root = if old.is_null() {
            bptree::create(store)?
        } else {
            old
        };
        let new_root = bptree::insert(store, root, ndx, v)?;
        if new_root != old {
            refs.value = bptree::set(store, refs.value, row, new_root.0 as i64)?;
        }
        Ok(())
    }

    /// Overwrite one list element
    pub fn list_set(
        &mut self,
        store: &mut dyn NodeStoreMut,
        pos: usize,
        row: usize,
        ndx: usize,
        v: i64,
    ) -> Result<()> {
        let refs = &mut self.cols[pos];
        let old = Ref(bptree::get(store, refs.value, row)? as u64);
        if old.is_null() {
            return Err(Error::InvalidOperation(format!(
                "index {ndx} out of bounds for empty list"
            )));
        }
        let new_root = bptree::set(store, old, ndx, v)?;
        if new_root != old {
            refs.value = bptree::set(store, refs.value, row, new_root.0 as i64)?;
        }
        Ok(())
    }

    /// Remove one list element
    pub fn list_erase(
        &mut self,
        store: &mut dyn NodeStoreMut,
        pos: usize,
        row: usize,
        ndx: usize,
    ) -> Result<()> {
        let refs = &mut self.cols[pos];
        let old = Ref(bptree::get(store, refs.value, row)? as u64);
        if old.is_null() {
            return Err(Error::InvalidOperation(format!(
                "index {ndx} out of bounds for empty list"
            )));
        }
        let new_root = bptree::erase(store, old, ndx)?;
        if new_root != old {
            refs.value = bptree::set(store, refs.value, row, new_root.0 as i64)?;
        }
        Ok(())
    }

    /// Referrer keys recorded in backlink slot `slot_idx` for `row`
    pub fn backlink_keys(
        &self,
        store: &dyn NodeStore,
        slot_idx: usize,
        row: usize,
    ) -> Result<Vec<ObjKey>> {
        let nested = Ref(bptree::get(store, self.backlinks[slot_idx], row)? as u64);
        if nested.is_null() {
            return Ok(Vec::new());
        }
        Ok(bptree::to_vec(store, nested)?
            .into_iter()
            .map(|v| ObjKey(v as u64))
            .collect())
    }

    /// Record `origin_key` as a referrer of `row` via backlink slot
    /// `slot_idx`
    pub fn backlink_add(
        &mut self,
        store: &mut dyn NodeStoreMut,
        slot_idx: usize,
        row: usize,
        origin_key: ObjKey,
    ) -> Result<()> {
        let bl = self.backlinks[slot_idx];
        let old = Ref(bptree::get(store, bl, row)? as u64);
        let root = if old.is_null() {
            bptree::create(store)?
        } else {
            old
        };
        let new_root = bptree::push(store, root, origin_key.0 as i64)?;
        if new_root != old {
            self.backlinks[slot_idx] = bptree::set(store, bl, row, new_root.0 as i64)?;
        }
        Ok(())
    }

    /// Drop `origin_key` from `row`'s referrer list, returning how many
    /// referrers remain in that slot
    pub fn backlink_remove(
        &mut self,
        store: &mut dyn NodeStoreMut,
        slot_idx: usize,
        row: usize,
        origin_key: ObjKey,
    ) -> Result<usize> {
        let bl = self.backlinks[slot_idx];
        let nested = Ref(bptree::get(store, bl, row)? as u64);
        if nested.is_null() {
            return Err(Error::Corruption(format!(
                "backlink entry for {origin_key} missing"
            )));
        }
        let found = bptree::find_first(store, nested, origin_key.0 as i64)?.ok_or_else(|| {
            Error::Corruption(format!("backlink entry for {origin_key} missing"))
        })?;
        let new_root = bptree::erase(store, nested, found)?;
        let remaining = bptree::total_len(store, new_root)?;
        if remaining == 0 {
            bptree::destroy(store, new_root)?;
            self.backlinks[slot_idx] = bptree::set(store, bl, row, 0)?;
        } else if new_root != nested {
            self.backlinks[slot_idx] = bptree::set(store, bl, row, new_root.0 as i64)?;
        }
        Ok(remaining)
    }

    /// Total referrers of `row` across the given backlink slots
    pub fn backlink_count(
        &self,
        store: &dyn NodeStore,
        slots: &[usize],
        row: usize,
    ) -> Result<usize> {
        let mut total = 0;
        for slot_idx in slots {
            let nested = Ref(bptree::get(store, self.backlinks[*slot_idx], row)? as u64);
            if !nested.is_null() {
                total += bptree::total_len(store, nested)?;
            }
        }
        Ok(total)
    }
}

fn index_insert(
    store: &mut dyn NodeStoreMut,
    refs: &mut ColumnRefs,
    slot: i64,
    key: u64,
) -> Result<()> {
    let pos = tree_upper_bound(store, refs.idx_vals, slot)?;
    refs.idx_vals = bptree::insert(store, refs.idx_vals, pos, slot)?;
    refs.idx_keys = bptree::insert(store, refs.idx_keys, pos, key as i64)?;
    Ok(())
}

fn index_remove(
    store: &mut dyn NodeStoreMut,
    refs: &mut ColumnRefs,
    slot: i64,
    key: u64,
) -> Result<()> {
    let mut pos = tree_lower_bound(store, refs.idx_vals, slot)?;
    let n = bptree::total_len(store, refs.idx_vals)?;
    while pos < n && bptree::get(store, refs.idx_vals, pos)? == slot {
        if bptree::get(store, refs.idx_keys, pos)? as u64 == key {
            refs.idx_vals = bptree::erase(store, refs.idx_vals, pos)?;
            refs.idx_keys = bptree::erase(store, refs.idx_keys, pos)?;
            return Ok(());
        }
        pos += 1;
    }
    Err(Error::Corruption(format!(
        "index entry for key {key} missing"
    )))
}

fn index_lookup(store: &dyn NodeStore, refs: &ColumnRefs, slot: i64) -> Result<Vec<u64>> {
    let mut pos = tree_lower_bound(store, refs.idx_vals, slot)?;
    let n = bptree::total_len(store, refs.idx_vals)?;
    let mut out = Vec::new();
    while pos < n && bptree::get(store, refs.idx_vals, pos)? == slot {
        out.push(bptree::get(store, refs.idx_keys, pos)? as u64);
        pos += 1;
    }
    Ok(out)
}
