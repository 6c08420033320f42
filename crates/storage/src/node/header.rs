//! Node header format.
//!
//! Every encoded node starts with an 8-byte header:
//!
//! ```text
//! [kind: u8][width_code: u8][flags: u8][reserved: u8][len: u32 le]
//! ```
//!
//! - **kind**: node kind tag (see `NodeKind`)
//! - **width_code**: index into the width lane table (int leaves and inner
//!   nodes; zero for blob nodes)
//! - **flags**: bit 0 on blob leaves marks the sticky big-representation
//!   upgrade
//! - **len**: logical element count (byte length for chunk nodes)

use byteorder::{ByteOrder, LittleEndian};
use mica_core::{Error, Result};

/// Size of the node header in bytes
pub const NODE_HEADER_SIZE: usize = 8;

/// Width lanes for bit-packed integer storage, in bits per element
pub const WIDTH_LANES: [u8; 8] = [0, 1, 2, 4, 8, 16, 32, 64];

/// Flag bit marking a blob leaf that has upgraded to the big representation
pub const FLAG_BIG_BLOB: u8 = 0b0000_0001;

/// Node kind tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Bit-packed integer leaf
    IntLeaf,
    /// Inline variable-length payloads (every element <= 64 bytes)
    SmallBlob,
    /// Chunked variable-length payloads (ref per element)
    BigBlob,
    /// B+tree inner node: child refs plus cumulative counts
    Inner,
    /// Raw byte chunk referenced by a BigBlob element
    Chunk,
}

impl NodeKind {
    fn tag(self) -> u8 {
        match self {
            NodeKind::IntLeaf => 1,
            NodeKind::SmallBlob => 2,
            NodeKind::BigBlob => 3,
            NodeKind::Inner => 4,
            NodeKind::Chunk => 5,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(NodeKind::IntLeaf),
            2 => Ok(NodeKind::SmallBlob),
            3 => Ok(NodeKind::BigBlob),
            4 => Ok(NodeKind::Inner),
            5 => Ok(NodeKind::Chunk),
            other => Err(Error::Corruption(format!("unknown node kind tag {other}"))),
        }
    }
}

/// Decoded node header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    /// Node kind
    pub kind: NodeKind,
    /// Width lane index (meaningful for IntLeaf)
    pub width_code: u8,
    /// Flag bits
    pub flags: u8,
    /// Logical element count
    pub len: u32,
}

impl NodeHeader {
    /// Build a header
    pub fn new(kind: NodeKind, width_code: u8, flags: u8, len: u32) -> Self {
        Self {
            kind,
            width_code,
            flags,
            len,
        }
    }

    /// Bits per element for the width lane
    #[inline]
    pub fn width_bits(&self) -> u8 {
        WIDTH_LANES[self.width_code as usize]
    }

    /// Write the header into the first 8 bytes of `buf`
    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = self.kind.tag();
        buf[1] = self.width_code;
        buf[2] = self.flags;
        buf[3] = 0;
        LittleEndian::write_u32(&mut buf[4..8], self.len);
    }

    /// Parse the header from the first 8 bytes of `buf`
    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "node shorter than header: {} bytes",
                buf.len()
            )));
        }
        let kind = NodeKind::from_tag(buf[0])?;
        let width_code = buf[1];
        if width_code as usize >= WIDTH_LANES.len() {
            return Err(Error::Corruption(format!(
                "invalid width code {width_code}"
            )));
        }
        Ok(Self {
            kind,
            width_code,
            flags: buf[2],
            len: LittleEndian::read_u32(&buf[4..8]),
        })
    }
}

/// Smallest lane code whose width covers `bits`
pub fn lane_for_bits(bits: u8) -> u8 {
    WIDTH_LANES
        .iter()
        .position(|w| *w >= bits)
        .unwrap_or(WIDTH_LANES.len() - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let hdr = NodeHeader::new(NodeKind::IntLeaf, 4, 0, 123);
        let mut buf = [0u8; NODE_HEADER_SIZE];
        hdr.write(&mut buf);
        let back = NodeHeader::read(&buf).unwrap();
        assert_eq!(back, hdr);
        assert_eq!(back.width_bits(), 8);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let buf = [99u8, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(NodeHeader::read(&buf), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_invalid_width_code_rejected() {
        let buf = [1u8, 8, 0, 0, 0, 0, 0, 0];
        assert!(matches!(NodeHeader::read(&buf), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(NodeHeader::read(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_lane_for_bits() {
        assert_eq!(lane_for_bits(0), 0);
        assert_eq!(lane_for_bits(1), 1);
        assert_eq!(lane_for_bits(3), 3); // rounds up to the 4-bit lane
        assert_eq!(lane_for_bits(9), 5); // rounds up to the 16-bit lane
        assert_eq!(lane_for_bits(64), 7);
    }
}
