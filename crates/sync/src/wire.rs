//! Shared wire-format constants and primitive field codecs.
//!
//! Frame layout:
//!
//! ```text
//! magic "MCHG" | format u8 | peer uuid 16B | string table | instructions | crc32 LE
//! ```
//!
//! The string table interns table and column names; values travel
//! inline. The trailing crc32 covers every preceding byte.

use crate::varint::{push_i64, push_u64, take_i64, take_u64};
use mica_core::{ColumnType, Error, LinkType, ObjKey, Result, Value};

pub const MAGIC: [u8; 4] = *b"MCHG";
pub const FORMAT: u8 = 1;

pub const OP_SELECT_TABLE: u8 = 0x01;
pub const OP_CREATE_TABLE: u8 = 0x02;
pub const OP_ADD_COLUMN: u8 = 0x03;
pub const OP_CREATE_OBJECT: u8 = 0x04;
pub const OP_ERASE_OBJECT: u8 = 0x05;
pub const OP_SET: u8 = 0x06;
pub const OP_SELECT_LIST: u8 = 0x07;
pub const OP_LIST_INSERT: u8 = 0x08;
pub const OP_LIST_SET: u8 = 0x09;
pub const OP_LIST_ERASE: u8 = 0x0a;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_BINARY: u8 = 6;
const TAG_LINK: u8 = 7;

pub const FLAG_INDEXED: u8 = 0x01;
pub const FLAG_UNIQUE: u8 = 0x02;
pub const FLAG_NULLABLE: u8 = 0x04;

pub fn type_tag(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::Int => 0,
        ColumnType::Bool => 1,
        ColumnType::Float => 2,
        ColumnType::Double => 3,
        ColumnType::String => 4,
        ColumnType::Binary => 5,
        ColumnType::Link => 6,
        ColumnType::IntList => 7,
    }
}

pub fn type_from_tag(tag: u8) -> Result<ColumnType> {
    Ok(match tag {
        0 => ColumnType::Int,
        1 => ColumnType::Bool,
        2 => ColumnType::Float,
        3 => ColumnType::Double,
        4 => ColumnType::String,
        5 => ColumnType::Binary,
        6 => ColumnType::Link,
        7 => ColumnType::IntList,
        _ => {
            return Err(Error::BadChangesetFormat(format!(
                "unknown column type tag {tag}"
            )))
        }
    })
}

pub fn link_type_tag(lt: LinkType) -> u8 {
    match lt {
        LinkType::Strong => 0,
        LinkType::Weak => 1,
    }
}

pub fn link_type_from_tag(tag: u8) -> Result<LinkType> {
    match tag {
        0 => Ok(LinkType::Strong),
        1 => Ok(LinkType::Weak),
        _ => Err(Error::BadChangesetFormat(format!(
            "unknown link type tag {tag}"
        ))),
    }
}

pub fn push_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(v) => {
            out.push(TAG_INT);
            push_i64(out, *v);
        }
        Value::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Double(v) => {
            out.push(TAG_DOUBLE);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            push_u64(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Binary(b) => {
            out.push(TAG_BINARY);
            push_u64(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Link(k) => {
            out.push(TAG_LINK);
            push_u64(out, k.0);
        }
    }
}

pub fn take_value(buf: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = take_byte(buf, pos)?;
    Ok(match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => match take_byte(buf, pos)? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            b => {
                return Err(Error::BadChangesetFormat(format!(
                    "bad bool payload {b}"
                )))
            }
        },
        TAG_INT => Value::Int(take_i64(buf, pos)?),
        TAG_FLOAT => {
            let raw: [u8; 4] = take_bytes(buf, pos, 4)?.try_into().unwrap();
            Value::Float(f32::from_le_bytes(raw))
        }
        TAG_DOUBLE => {
            let raw: [u8; 8] = take_bytes(buf, pos, 8)?.try_into().unwrap();
            Value::Double(f64::from_le_bytes(raw))
        }
        TAG_STRING => {
            let len = take_len(buf, pos)?;
            let raw = take_bytes(buf, pos, len)?;
            let s = std::str::from_utf8(raw)
                .map_err(|_| Error::BadChangesetFormat("non-utf8 string value".to_string()))?;
            Value::String(s.to_string())
        }
        TAG_BINARY => {
            let len = take_len(buf, pos)?;
            Value::Binary(take_bytes(buf, pos, len)?.to_vec())
        }
        TAG_LINK => Value::Link(ObjKey(take_u64(buf, pos)?)),
        _ => {
            return Err(Error::BadChangesetFormat(format!(
                "unknown value tag {tag}"
            )))
        }
    })
}

pub fn take_byte(buf: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *buf
        .get(*pos)
        .ok_or_else(|| Error::BadChangesetFormat("truncated changeset".to_string()))?;
    *pos += 1;
    Ok(b)
}

pub fn take_bytes<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(n)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| Error::BadChangesetFormat("truncated changeset".to_string()))?;
    let raw = &buf[*pos..end];
    *pos = end;
    Ok(raw)
}

/// A length field; bounded by the remaining buffer so a corrupt length
/// cannot drive a huge allocation
pub fn take_len(buf: &[u8], pos: &mut usize) -> Result<usize> {
    let len = take_u64(buf, pos)?;
    if len > (buf.len() - *pos) as u64 {
        return Err(Error::BadChangesetFormat(format!(
            "length {len} exceeds remaining input"
        )));
    }
    Ok(len as usize)
}
