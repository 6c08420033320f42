//! Bit-packed integer leaves.
//!
//! An integer leaf stores its elements at the minimum width lane covering
//! the value range: 0, 1, 2, 4, 8, 16, 32 or 64 bits per element.
//!
//! ## Payload Format
//!
//! | Lane    | Encoding                                                  |
//! |---------|-----------------------------------------------------------|
//! | 0 bits  | no payload; every element is zero                         |
//! | 1/2/4   | packed LSB-first within each byte, element i at bit i*w   |
//! | 8/16/32 | truncated two's complement, little-endian, sign-extended  |
//! | 64 bits | full i64, little-endian                                   |
//!
//! Negative values force at least the 8-bit lane. Writing a value that
//! exceeds the current lane upgrades the whole leaf: the payload is decoded,
//! re-encoded at the wider lane, and reallocated by the caller. Lane
//! upgrades never happen in place.
//!
//! Lookup cost: `find_first` is O(n); `lower_bound`/`upper_bound` assume the
//! leaf is sorted in natural order and run O(log n).

use super::header::{lane_for_bits, NodeHeader, NodeKind, NODE_HEADER_SIZE, WIDTH_LANES};
use byteorder::{ByteOrder, LittleEndian};
use mica_core::{Error, Result};

/// Bits required to store `v` in a lane
pub fn width_for(v: i64) -> u8 {
    if v == 0 {
        0
    } else if v == 1 {
        1
    } else if (0..4).contains(&v) {
        2
    } else if (0..16).contains(&v) {
        4
    } else if (-128..128).contains(&v) {
        8
    } else if (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&v) {
        16
    } else if (i64::from(i32::MIN)..=i64::from(i32::MAX)).contains(&v) {
        32
    } else {
        64
    }
}

fn payload_bytes(len: usize, width_bits: u8) -> usize {
    (len * width_bits as usize + 7) / 8
}

fn check_kind(hdr: &NodeHeader) -> Result<()> {
    if hdr.kind != NodeKind::IntLeaf {
        return Err(Error::Corruption(format!(
            "expected integer leaf, found {:?}",
            hdr.kind
        )));
    }
    Ok(())
}

fn check_index(hdr: &NodeHeader, ndx: usize) -> Result<()> {
    if ndx >= hdr.len as usize {
        return Err(Error::InvalidOperation(format!(
            "index {ndx} out of bounds for leaf of {} elements",
            hdr.len
        )));
    }
    Ok(())
}

/// Encode a fresh integer leaf from `values`
pub fn encode(values: &[i64]) -> Vec<u8> {
    let bits = values.iter().map(|v| width_for(*v)).max().unwrap_or(0);
    encode_with_lane(values, lane_for_bits(bits))
}

fn encode_with_lane(values: &[i64], width_code: u8) -> Vec<u8> {
    let width_bits = WIDTH_LANES[width_code as usize];
    let mut buf = vec![0u8; NODE_HEADER_SIZE + payload_bytes(values.len(), width_bits)];
    NodeHeader::new(NodeKind::IntLeaf, width_code, 0, values.len() as u32).write(&mut buf);
    for (i, v) in values.iter().enumerate() {
        write_element(&mut buf[NODE_HEADER_SIZE..], width_bits, i, *v);
    }
    buf
}

fn write_element(payload: &mut [u8], width_bits: u8, ndx: usize, v: i64) {
    match width_bits {
        0 => {}
        1 | 2 | 4 => {
            let w = width_bits as usize;
            let bit = ndx * w;
            let mask = (1u8 << w) - 1;
            let shift = (bit % 8) as u8;
            let byte = &mut payload[bit / 8];
            *byte = (*byte & !(mask << shift)) | (((v as u8) & mask) << shift);
        }
        8 => payload[ndx] = v as i8 as u8,
        16 => LittleEndian::write_i16(&mut payload[ndx * 2..], v as i16),
        32 => LittleEndian::write_i32(&mut payload[ndx * 4..], v as i32),
        _ => LittleEndian::write_i64(&mut payload[ndx * 8..], v),
    }
}

fn read_element(payload: &[u8], width_bits: u8, ndx: usize) -> i64 {
    match width_bits {
        0 => 0,
        1 | 2 | 4 => {
            let w = width_bits as usize;
            let bit = ndx * w;
            let mask = (1u8 << w) - 1;
            i64::from((payload[bit / 8] >> (bit % 8)) & mask)
        }
        8 => i64::from(payload[ndx] as i8),
        16 => i64::from(LittleEndian::read_i16(&payload[ndx * 2..])),
        32 => i64::from(LittleEndian::read_i32(&payload[ndx * 4..])),
        _ => LittleEndian::read_i64(&payload[ndx * 8..]),
    }
}

/// Element count of the leaf
pub fn len(buf: &[u8]) -> Result<usize> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    Ok(hdr.len as usize)
}

/// Read the element at `ndx`
pub fn get(buf: &[u8], ndx: usize) -> Result<i64> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    check_index(&hdr, ndx)?;
    Ok(read_element(&buf[NODE_HEADER_SIZE..], hdr.width_bits(), ndx))
}

/// Decode every element
pub fn decode(buf: &[u8]) -> Result<Vec<i64>> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    let payload = &buf[NODE_HEADER_SIZE..];
    let width = hdr.width_bits();
    Ok((0..hdr.len as usize)
        .map(|i| read_element(payload, width, i))
        .collect())
}

/// Write `v` at `ndx`, returning the new leaf image.
///
/// Stays at the current lane (bit surgery in place on the copy) when `v`
/// fits; otherwise upgrades the whole leaf to the lane covering `v`.
pub fn set(buf: &[u8], ndx: usize, v: i64) -> Result<Vec<u8>> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    check_index(&hdr, ndx)?;
    if width_for(v) <= hdr.width_bits() {
        let mut out = buf.to_vec();
        write_element(&mut out[NODE_HEADER_SIZE..], hdr.width_bits(), ndx, v);
        return Ok(out);
    }
    // Lane upgrade: rebuild at the wider width
    let mut values = decode(buf)?;
    values[ndx] = v;
    Ok(encode_with_lane(
        &values,
        lane_for_bits(width_for(v)).max(hdr.width_code),
    ))
}

/// Insert `v` before `ndx`, returning the new leaf image
pub fn insert(buf: &[u8], ndx: usize, v: i64) -> Result<Vec<u8>> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    if ndx > hdr.len as usize {
        return Err(Error::InvalidOperation(format!(
            "insert index {ndx} out of bounds for leaf of {} elements",
            hdr.len
        )));
    }
    let mut values = decode(buf)?;
    values.insert(ndx, v);
    Ok(encode_with_lane(
        &values,
        lane_for_bits(width_for(v)).max(hdr.width_code),
    ))
}

/// Remove the element at `ndx`, returning the new leaf image.
///
/// The lane is kept as-is; leaves only get narrower when rebuilt wholesale.
pub fn erase(buf: &[u8], ndx: usize) -> Result<Vec<u8>> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    check_index(&hdr, ndx)?;
    let mut values = decode(buf)?;
    values.remove(ndx);
    Ok(encode_with_lane(&values, hdr.width_code))
}

/// Append `v`, returning the new leaf image
pub fn push(buf: &[u8], v: i64) -> Result<Vec<u8>> {
    let n = len(buf)?;
    insert(buf, n, v)
}

/// Index of the first element equal to `v` (linear scan)
pub fn find_first(buf: &[u8], v: i64) -> Result<Option<usize>> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    let payload = &buf[NODE_HEADER_SIZE..];
    let width = hdr.width_bits();
    // Values wider than the lane cannot be present
    if width_for(v) > width {
        return Ok(None);
    }
    Ok((0..hdr.len as usize).find(|i| read_element(payload, width, *i) == v))
}

/// First index whose element is >= `v`; assumes the leaf is sorted
pub fn lower_bound(buf: &[u8], v: i64) -> Result<usize> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    let payload = &buf[NODE_HEADER_SIZE..];
    let width = hdr.width_bits();
    let (mut lo, mut hi) = (0usize, hdr.len as usize);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if read_element(payload, width, mid) < v {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// First index whose element is > `v`; assumes the leaf is sorted
pub fn upper_bound(buf: &[u8], v: i64) -> Result<usize> {
    let hdr = NodeHeader::read(buf)?;
    check_kind(&hdr)?;
    let payload = &buf[NODE_HEADER_SIZE..];
    let width = hdr.width_bits();
    let (mut lo, mut hi) = (0usize, hdr.len as usize);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if read_element(payload, width, mid) <= v {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}
