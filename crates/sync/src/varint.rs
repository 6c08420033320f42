//! LEB128 varints for the changeset wire format.
//!
//! Unsigned values use plain LEB128. Signed values are zigzag-mapped
//! first so small negative numbers stay short. A u64 never takes more
//! than 10 bytes; decoders reject longer runs as corrupt rather than
//! silently wrapping.

use mica_core::{Error, Result};

const MAX_VARINT_BYTES: usize = 10;

/// Append an unsigned varint
pub fn push_u64(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Append a zigzag-encoded signed varint
pub fn push_i64(out: &mut Vec<u8>, v: i64) {
    push_u64(out, zigzag(v));
}

/// Decode an unsigned varint at `*pos`, advancing it
pub fn take_u64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for n in 0..MAX_VARINT_BYTES {
        let byte = *buf
            .get(*pos + n)
            .ok_or_else(|| Error::BadChangesetFormat("truncated varint".to_string()))?;
        if n == MAX_VARINT_BYTES - 1 && byte > 0x01 {
            return Err(Error::BadChangesetFormat("varint overflows u64".to_string()));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            *pos += n + 1;
            return Ok(value);
        }
        shift += 7;
    }
    Err(Error::BadChangesetFormat("varint run too long".to_string()))
}

/// Decode a zigzag-encoded signed varint at `*pos`, advancing it
pub fn take_i64(buf: &[u8], pos: &mut usize) -> Result<i64> {
    Ok(unzigzag(take_u64(buf, pos)?))
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
