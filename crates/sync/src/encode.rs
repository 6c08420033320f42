//! Changeset encoding.
//!
//! The encoder walks a transaction's recorded ops and emits a compact
//! instruction stream. Table selection is stateful: an op addressing a
//! different table than the previous one is preceded by `SelectTable`,
//! and consecutive list edits on the same cell share one `SelectList`.
//! `CreateTable` selects the new table as a side effect, which keeps
//! the common create-then-populate pattern free of redundant selects.

use crate::varint::push_u64;
use crate::wire;
use crate::PeerId;
use mica_core::{ColumnType, ObjKey};
use mica_engine::ChangeOp;
use tracing::debug;

struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    fn new() -> Self {
        StringTable {
            strings: Vec::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u64 {
        match self.strings.iter().position(|x| x == s) {
            Some(p) => p as u64,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u64
            }
        }
    }
}

/// Encode a peer's recorded ops into a self-contained changeset frame
pub fn encode_changeset(peer: PeerId, ops: &[ChangeOp]) -> Vec<u8> {
    let mut strings = StringTable::new();
    let mut body = Vec::new();
    let mut current_table: Option<&str> = None;
    let mut selected_list: Option<(&str, ObjKey)> = None;

    for op in ops {
        let table = op_table(op);
        if current_table != Some(table) {
            if !matches!(op, ChangeOp::CreateTable { .. }) {
                body.push(wire::OP_SELECT_TABLE);
                push_u64(&mut body, strings.intern(table));
            }
            current_table = Some(table);
            selected_list = None;
        }
        match op {
            ChangeOp::CreateTable { table } => {
                body.push(wire::OP_CREATE_TABLE);
                push_u64(&mut body, strings.intern(table));
            }
            ChangeOp::AddColumn {
                column,
                ty,
                nullable,
                attrs,
                link_target,
                link_type,
                ..
            } => {
                body.push(wire::OP_ADD_COLUMN);
                push_u64(&mut body, strings.intern(column));
                body.push(wire::type_tag(*ty));
                let mut flags = 0u8;
                if attrs.indexed {
                    flags |= wire::FLAG_INDEXED;
                }
                if attrs.unique {
                    flags |= wire::FLAG_UNIQUE;
                }
                if *nullable {
                    flags |= wire::FLAG_NULLABLE;
                }
                body.push(flags);
                if *ty == ColumnType::Link {
                    // Link columns always carry a target recorded by the engine
                    let target = link_target.as_deref().unwrap_or_default();
                    push_u64(&mut body, strings.intern(target));
                    body.push(wire::link_type_tag(
                        link_type.unwrap_or(mica_core::LinkType::Weak),
                    ));
                }
            }
            ChangeOp::CreateObject { key, .. } => {
                body.push(wire::OP_CREATE_OBJECT);
                push_u64(&mut body, key.0);
            }
            ChangeOp::EraseObject { key, .. } => {
                body.push(wire::OP_ERASE_OBJECT);
                push_u64(&mut body, key.0);
            }
            ChangeOp::Set {
                key, column, value, ..
            } => {
                body.push(wire::OP_SET);
                push_u64(&mut body, strings.intern(column));
                push_u64(&mut body, key.0);
                wire::push_value(&mut body, value);
            }
            ChangeOp::ListInsert {
                key,
                column,
                ndx,
                value,
                ..
            } => {
                select_list(&mut body, &mut strings, &mut selected_list, column, *key);
                body.push(wire::OP_LIST_INSERT);
                push_u64(&mut body, *ndx as u64);
                crate::varint::push_i64(&mut body, *value);
            }
            ChangeOp::ListSet {
                key,
                column,
                ndx,
                value,
                ..
            } => {
                select_list(&mut body, &mut strings, &mut selected_list, column, *key);
                body.push(wire::OP_LIST_SET);
                push_u64(&mut body, *ndx as u64);
                crate::varint::push_i64(&mut body, *value);
            }
            ChangeOp::ListErase {
                key, column, ndx, ..
            } => {
                select_list(&mut body, &mut strings, &mut selected_list, column, *key);
                body.push(wire::OP_LIST_ERASE);
                push_u64(&mut body, *ndx as u64);
            }
        }
    }

    let mut frame = Vec::with_capacity(32 + body.len());
    frame.extend_from_slice(&wire::MAGIC);
    frame.push(wire::FORMAT);
    frame.extend_from_slice(peer.as_bytes());
    push_u64(&mut frame, strings.strings.len() as u64);
    for s in &strings.strings {
        push_u64(&mut frame, s.len() as u64);
        frame.extend_from_slice(s.as_bytes());
    }
    frame.extend_from_slice(&body);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    debug!(ops = ops.len(), bytes = frame.len(), "encoded changeset");
    frame
}

fn op_table(op: &ChangeOp) -> &str {
    match op {
        ChangeOp::CreateTable { table }
        | ChangeOp::AddColumn { table, .. }
        | ChangeOp::CreateObject { table, .. }
        | ChangeOp::EraseObject { table, .. }
        | ChangeOp::Set { table, .. }
        | ChangeOp::ListInsert { table, .. }
        | ChangeOp::ListSet { table, .. }
        | ChangeOp::ListErase { table, .. } => table,
    }
}

fn select_list<'a>(
    body: &mut Vec<u8>,
    strings: &mut StringTable,
    selected: &mut Option<(&'a str, ObjKey)>,
    column: &'a str,
    key: ObjKey,
) {
    if *selected != Some((column, key)) {
        body.push(wire::OP_SELECT_LIST);
        push_u64(body, strings.intern(column));
        push_u64(body, key.0);
        *selected = Some((column, key));
    }
}
