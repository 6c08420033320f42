//! Changeset parsing.
//!
//! The parser is strict: bad magic, an unsupported format byte, a crc
//! mismatch, a truncated field, an out-of-range string id, or an
//! instruction arriving before its required `SelectTable` all fail with
//! `BadChangesetFormat`. Nothing about the receiving store is consulted
//! here; resolution against actual tables happens in `apply`.

use crate::varint::{take_i64, take_u64};
use crate::wire;
use crate::{Changeset, PeerId};
use mica_core::{ColumnAttrs, ColumnType, Error, ObjKey, Result};
use mica_engine::ChangeOp;
use uuid::Uuid;

/// Parse and validate a changeset frame
pub fn parse_changeset(buf: &[u8]) -> Result<Changeset> {
    // magic + format + uuid + crc is the minimum possible frame
    if buf.len() < 4 + 1 + 16 + 4 {
        return Err(Error::BadChangesetFormat("frame too short".to_string()));
    }
    let (payload, crc_raw) = buf.split_at(buf.len() - 4);
    let stored = u32::from_le_bytes(crc_raw.try_into().unwrap());
    let actual = crc32fast::hash(payload);
    if stored != actual {
        return Err(Error::BadChangesetFormat(format!(
            "crc mismatch: stored {stored:#010x}, computed {actual:#010x}"
        )));
    }

    let mut pos = 0;
    if wire::take_bytes(payload, &mut pos, 4)? != wire::MAGIC {
        return Err(Error::BadChangesetFormat("bad magic".to_string()));
    }
    let format = wire::take_byte(payload, &mut pos)?;
    if format != wire::FORMAT {
        return Err(Error::BadChangesetFormat(format!(
            "unsupported format {format}"
        )));
    }
    let peer_raw: [u8; 16] = wire::take_bytes(payload, &mut pos, 16)?.try_into().unwrap();
    let peer = PeerId::from(Uuid::from_bytes(peer_raw));

    let n_strings = wire::take_len(payload, &mut pos)?;
    let mut strings = Vec::with_capacity(n_strings);
    for _ in 0..n_strings {
        let len = wire::take_len(payload, &mut pos)?;
        let raw = wire::take_bytes(payload, &mut pos, len)?;
        let s = std::str::from_utf8(raw)
            .map_err(|_| Error::BadChangesetFormat("non-utf8 interned string".to_string()))?;
        strings.push(s.to_string());
    }

    let mut ops = Vec::new();
    let mut current_table: Option<String> = None;
    let mut selected_list: Option<(String, ObjKey)> = None;
    while pos < payload.len() {
        let opcode = wire::take_byte(payload, &mut pos)?;
        match opcode {
            wire::OP_SELECT_TABLE => {
                current_table = Some(take_string(payload, &mut pos, &strings)?);
                selected_list = None;
            }
            wire::OP_CREATE_TABLE => {
                let table = take_string(payload, &mut pos, &strings)?;
                current_table = Some(table.clone());
                selected_list = None;
                ops.push(ChangeOp::CreateTable { table });
            }
            wire::OP_ADD_COLUMN => {
                let table = require_table(&current_table)?;
                let column = take_string(payload, &mut pos, &strings)?;
                let ty = wire::type_from_tag(wire::take_byte(payload, &mut pos)?)?;
                let flags = wire::take_byte(payload, &mut pos)?;
                let attrs = ColumnAttrs {
                    indexed: flags & wire::FLAG_INDEXED != 0,
                    unique: flags & wire::FLAG_UNIQUE != 0,
                };
                let nullable = flags & wire::FLAG_NULLABLE != 0;
                let (link_target, link_type) = if ty == ColumnType::Link {
                    let target = take_string(payload, &mut pos, &strings)?;
                    let lt = wire::link_type_from_tag(wire::take_byte(payload, &mut pos)?)?;
                    (Some(target), Some(lt))
                } else {
                    (None, None)
                };
                ops.push(ChangeOp::AddColumn {
                    table,
                    column,
                    ty,
                    nullable,
                    attrs,
                    link_target,
                    link_type,
                });
            }
            wire::OP_CREATE_OBJECT => {
                let table = require_table(&current_table)?;
                let key = ObjKey(take_u64(payload, &mut pos)?);
                ops.push(ChangeOp::CreateObject { table, key });
            }
            wire::OP_ERASE_OBJECT => {
                let table = require_table(&current_table)?;
                let key = ObjKey(take_u64(payload, &mut pos)?);
                ops.push(ChangeOp::EraseObject { table, key });
            }
            wire::OP_SET => {
                let table = require_table(&current_table)?;
                let column = take_string(payload, &mut pos, &strings)?;
                let key = ObjKey(take_u64(payload, &mut pos)?);
                let value = wire::take_value(payload, &mut pos)?;
                ops.push(ChangeOp::Set {
                    table,
                    key,
                    column,
                    value,
                });
            }
            wire::OP_SELECT_LIST => {
                require_table(&current_table)?;
                let column = take_string(payload, &mut pos, &strings)?;
                let key = ObjKey(take_u64(payload, &mut pos)?);
                selected_list = Some((column, key));
            }
            wire::OP_LIST_INSERT => {
                let (table, column, key) = require_list(&current_table, &selected_list)?;
                let ndx = take_u64(payload, &mut pos)? as usize;
                let value = take_i64(payload, &mut pos)?;
                ops.push(ChangeOp::ListInsert {
                    table,
                    key,
                    column,
                    ndx,
                    value,
                });
            }
            wire::OP_LIST_SET => {
                let (table, column, key) = require_list(&current_table, &selected_list)?;
                let ndx = take_u64(payload, &mut pos)? as usize;
                let value = take_i64(payload, &mut pos)?;
                ops.push(ChangeOp::ListSet {
                    table,
                    key,
                    column,
                    ndx,
                    value,
                });
            }
            wire::OP_LIST_ERASE => {
                let (table, column, key) = require_list(&current_table, &selected_list)?;
                let ndx = take_u64(payload, &mut pos)? as usize;
                ops.push(ChangeOp::ListErase {
                    table,
                    key,
                    column,
                    ndx,
                });
            }
            _ => {
                return Err(Error::BadChangesetFormat(format!(
                    "unknown opcode {opcode:#04x}"
                )))
            }
        }
    }

    Ok(Changeset { peer, ops })
}

fn take_string(buf: &[u8], pos: &mut usize, strings: &[String]) -> Result<String> {
    let id = take_u64(buf, pos)?;
    strings
        .get(id as usize)
        .cloned()
        .ok_or_else(|| Error::BadChangesetFormat(format!("string id {id} out of range")))
}

fn require_table(current: &Option<String>) -> Result<String> {
    current
        .clone()
        .ok_or_else(|| Error::BadChangesetFormat("instruction before SelectTable".to_string()))
}

fn require_list(
    current: &Option<String>,
    selected: &Option<(String, ObjKey)>,
) -> Result<(String, String, ObjKey)> {
    let table = require_table(current)?;
    let (column, key) = selected
        .clone()
        .ok_or_else(|| Error::BadChangesetFormat("list edit before SelectList".to_string()))?;
    Ok((table, column, key))
}
