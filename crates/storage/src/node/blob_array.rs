//! Variable-length payload leaves (strings and binaries).
//!
//! Blob leaves have two representations:
//!
//! - **Small**: every element inlined in one node.
//!   `[header][(n+1) x u32 le cumulative end offsets][data bytes]`
//! - **Big**: one chunk node per element, the leaf holding only refs.
//!   `[header, FLAG_BIG_BLOB][(n) x u64 le chunk refs]`
//!
//! A small leaf upgrades to big the first time an element exceeds
//! `BLOB_INLINE_MAX` bytes. The upgrade is one-directional: the flag stays
//! set for the leaf's remaining lifetime even if every oversized element is
//! later removed.

use super::header::{NodeHeader, NodeKind, FLAG_BIG_BLOB, NODE_HEADER_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use mica_core::{Error, NodeStore, NodeStoreMut, Ref, Result};

/// Elements above this size force the big (chunked) representation
pub const BLOB_INLINE_MAX: usize = 64;

/// Encode an empty small blob leaf
pub fn encode_empty() -> Vec<u8> {
    let mut buf = vec![0u8; NODE_HEADER_SIZE + 4];
    NodeHeader::new(NodeKind::SmallBlob, 0, 0, 0).write(&mut buf);
    // Single cumulative offset: 0
    buf
}

fn read_header(buf: &[u8]) -> Result<NodeHeader> {
    let hdr = NodeHeader::read(buf)?;
    match hdr.kind {
        NodeKind::SmallBlob | NodeKind::BigBlob => Ok(hdr),
        other => Err(Error::Corruption(format!(
            "expected blob leaf, found {other:?}"
        ))),
    }
}

/// Element count of the leaf
pub fn len(buf: &[u8]) -> Result<usize> {
    Ok(read_header(buf)?.len as usize)
}

/// Whether the leaf has upgraded to the chunked representation
pub fn is_big(buf: &[u8]) -> Result<bool> {
    let hdr = read_header(buf)?;
    Ok(hdr.kind == NodeKind::BigBlob)
}

fn small_elements(buf: &[u8]) -> Result<Vec<&[u8]>> {
    let hdr = read_header(buf)?;
    let n = hdr.len as usize;
    let data_start = NODE_HEADER_SIZE + 4 * (n + 1);
    if data_start > buf.len() {
        return Err(Error::Corruption(format!(
            "blob leaf claims {n} elements in {} bytes",
            buf.len()
        )));
    }
    let offsets = &buf[NODE_HEADER_SIZE..data_start];
    let data = &buf[data_start..];
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let start = LittleEndian::read_u32(&offsets[i * 4..]) as usize;
        let end = LittleEndian::read_u32(&offsets[(i + 1) * 4..]) as usize;
        if start > end || end > data.len() {
            return Err(Error::Corruption(format!(
                "blob offsets out of range: {start}..{end} of {}",
                data.len()
            )));
        }
        out.push(&data[start..end]);
    }
    Ok(out)
}

fn big_refs(buf: &[u8]) -> Result<Vec<Ref>> {
    let hdr = read_header(buf)?;
    let n = hdr.len as usize;
    if NODE_HEADER_SIZE + 8 * n > buf.len() {
        return Err(Error::Corruption(format!(
            "blob leaf claims {n} chunk refs in {} bytes",
            buf.len()
        )));
    }
    let payload = &buf[NODE_HEADER_SIZE..];
    Ok((0..n)
        .map(|i| Ref(LittleEndian::read_u64(&payload[i * 8..])))
        .collect())
}

fn encode_small(elements: &[Vec<u8>]) -> Vec<u8> {
    let data_len: usize = elements.iter().map(Vec::len).sum();
    let mut buf =
        Vec::with_capacity(NODE_HEADER_SIZE + 4 * (elements.len() + 1) + data_len);
    buf.resize(NODE_HEADER_SIZE, 0);
    NodeHeader::new(NodeKind::SmallBlob, 0, 0, elements.len() as u32).write(&mut buf);
    let mut end = 0u32;
    let mut offs = vec![0u8; 4 * (elements.len() + 1)];
    for (i, e) in elements.iter().enumerate() {
        end += e.len() as u32;
        LittleEndian::write_u32(&mut offs[(i + 1) * 4..], end);
    }
    buf.extend_from_slice(&offs);
    for e in elements {
        buf.extend_from_slice(e);
    }
    buf
}

fn encode_big(refs: &[Ref]) -> Vec<u8> {
    let mut buf = vec![0u8; NODE_HEADER_SIZE + 8 * refs.len()];
    NodeHeader::new(NodeKind::BigBlob, 0, FLAG_BIG_BLOB, refs.len() as u32).write(&mut buf);
    for (i, r) in refs.iter().enumerate() {
        LittleEndian::write_u64(&mut buf[NODE_HEADER_SIZE + i * 8..], r.0);
    }
    buf
}

fn encode_chunk(bytes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NODE_HEADER_SIZE + bytes.len());
    buf.resize(NODE_HEADER_SIZE, 0);
    NodeHeader::new(NodeKind::Chunk, 0, 0, bytes.len() as u32).write(&mut buf);
    buf.extend_from_slice(bytes);
    buf
}

fn read_chunk(store: &dyn NodeStore, r: Ref) -> Result<Vec<u8>> {
    let node = store.node(r)?;
    let hdr = NodeHeader::read(&node)?;
    if hdr.kind != NodeKind::Chunk {
        return Err(Error::Corruption(format!(
            "blob chunk ref resolved to {:?}",
            hdr.kind
        )));
    }
    let end = NODE_HEADER_SIZE + hdr.len as usize;
    if end > node.len() {
        return Err(Error::Corruption(format!(
            "blob chunk claims {} bytes in {}-byte node",
            hdr.len,
            node.len()
        )));
    }
    Ok(node[NODE_HEADER_SIZE..end].to_vec())
}

/// Read the element at `ndx`
pub fn get(store: &dyn NodeStore, buf: &[u8], ndx: usize) -> Result<Vec<u8>> {
    let hdr = read_header(buf)?;
    if ndx >= hdr.len as usize {
        return Err(Error::InvalidOperation(format!(
            "index {ndx} out of bounds for blob leaf of {} elements",
            hdr.len
        )));
    }
    if hdr.kind == NodeKind::SmallBlob {
        Ok(small_elements(buf)?[ndx].to_vec())
    } else {
        read_chunk(store, big_refs(buf)?[ndx])
    }
}

/// Insert `value` before `ndx`, returning the new leaf image.
///
/// Upgrades the leaf to the big representation when `value` exceeds
/// `BLOB_INLINE_MAX` bytes.
pub fn insert(
    store: &mut dyn NodeStoreMut,
    buf: &[u8],
    ndx: usize,
    value: &[u8],
) -> Result<Vec<u8>> {
    let hdr = read_header(buf)?;
    let n = hdr.len as usize;
    if ndx > n {
        return Err(Error::InvalidOperation(format!(
            "insert index {ndx} out of bounds for blob leaf of {n} elements"
        )));
    }
    if hdr.kind == NodeKind::SmallBlob && value.len() <= BLOB_INLINE_MAX {
        let mut elements: Vec<Vec<u8>> =
            small_elements(buf)?.into_iter().map(<[u8]>::to_vec).collect();
        elements.insert(ndx, value.to_vec());
        return Ok(encode_small(&elements));
    }
    // Big path, upgrading first if needed
    let mut refs = upgrade_to_big(store, buf, &hdr)?;
    let chunk = store.put_node(encode_chunk(value))?;
    refs.insert(ndx, chunk);
    Ok(encode_big(&refs))
}

/// Replace the element at `ndx`, returning the new leaf image
pub fn set(
    store: &mut dyn NodeStoreMut,
    buf: &[u8],
    ndx: usize,
    value: &[u8],
) -> Result<Vec<u8>> {
    let hdr = read_header(buf)?;
    if ndx >= hdr.len as usize {
        return Err(Error::InvalidOperation(format!(
            "index {ndx} out of bounds for blob leaf of {} elements",
            hdr.len
        )));
    }
    if hdr.kind == NodeKind::SmallBlob && value.len() <= BLOB_INLINE_MAX {
        let mut elements: Vec<Vec<u8>> =
            small_elements(buf)?.into_iter().map(<[u8]>::to_vec).collect();
        elements[ndx] = value.to_vec();
        return Ok(encode_small(&elements));
    }
    let mut refs = upgrade_to_big(store, buf, &hdr)?;
    store.free_node(refs[ndx])?;
    refs[ndx] = store.put_node(encode_chunk(value))?;
    Ok(encode_big(&refs))
}

/// Remove the element at `ndx`, returning the new leaf image.
///
/// A big leaf stays big even when the erased element was the last oversized
/// one; the upgrade never reverses.
pub fn erase(store: &mut dyn NodeStoreMut, buf: &[u8], ndx: usize) -> Result<Vec<u8>> {
    let hdr = read_header(buf)?;
    if ndx >= hdr.len as usize {
        return Err(Error::InvalidOperation(format!(
            "index {ndx} out of bounds for blob leaf of {} elements",
            hdr.len
        )));
    }
    if hdr.kind == NodeKind::SmallBlob {
        let mut elements: Vec<Vec<u8>> =
            small_elements(buf)?.into_iter().map(<[u8]>::to_vec).collect();
        elements.remove(ndx);
        return Ok(encode_small(&elements));
    }
    let mut refs = big_refs(buf)?;
    store.free_node(refs.remove(ndx))?;
    Ok(encode_big(&refs))
}

/// Index of the first element equal to `value` (linear scan)
pub fn find_first(store: &dyn NodeStore, buf: &[u8], value: &[u8]) -> Result<Option<usize>> {
    let hdr = read_header(buf)?;
    if hdr.kind == NodeKind::SmallBlob {
        Ok(small_elements(buf)?.iter().position(|e| *e == value))
    } else {
        for (i, r) in big_refs(buf)?.into_iter().enumerate() {
            if read_chunk(store, r)? == value {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

/// Free every chunk owned by the leaf (the leaf node itself is freed by
/// the caller through the column machinery)
pub fn destroy(store: &mut dyn NodeStoreMut, buf: &[u8]) -> Result<()> {
    let hdr = read_header(buf)?;
    if hdr.kind == NodeKind::BigBlob {
        for r in big_refs(buf)? {
            store.free_node(r)?;
        }
    }
    Ok(())
}

fn upgrade_to_big(
    store: &mut dyn NodeStoreMut,
    buf: &[u8],
    hdr: &NodeHeader,
) -> Result<Vec<Ref>> {
    if hdr.kind == NodeKind::BigBlob {
        return big_refs(buf);
    }
    let mut refs = Vec::with_capacity(hdr.len as usize);
    for e in small_elements(buf)? {
        refs.push(store.put_node(encode_chunk(e))?);
    }
    Ok(refs)
}
