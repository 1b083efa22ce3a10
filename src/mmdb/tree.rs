//! MMDB Search Tree Traversal
//!
//! Implements binary search tree traversal for IP address lookups.
//! The tree uses a compact binary representation where each node contains
//! two records (left and right) that point to either:
//! - Another node (continue traversal)
//! - A data section offset (found)
//! - A "not found" marker

use super::format::MmdbHeader;
use super::types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::address::{AddressFamily, BitSequence};

/// Number of leading zero bits that map IPv4 space into an IPv6 tree (`::/96`)
pub const IPV4_SUBTREE_DEPTH: u32 = 96;

/// Result of an IP lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupResult {
    /// Offset into the data section (relative to data section start)
    pub data_offset: usize,
    /// Network prefix length, in bits of the looked-up address family
    pub prefix_len: u8,
}

/// A decoded tree record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Continue at this node
    Node(u32),
    /// No entry for this prefix
    Empty,
    /// Data at this offset into the data section
    Data(usize),
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    /// The search tree bytes (exactly `header.tree_size` long)
    tree: &'a [u8],
    /// Parsed header information
    header: &'a MmdbHeader,
}

impl<'a> SearchTree<'a> {
    /// Create a search tree over a complete database image
    pub fn new(data: &'a [u8], header: &'a MmdbHeader) -> Result<Self, MmdbError> {
        let tree = data.get(..header.tree_size).ok_or_else(|| {
            MmdbError::InvalidFormat(format!(
                "file is shorter than the search tree ({} bytes)",
                header.tree_size
            ))
        })?;
        Ok(Self { tree, header })
    }

    /// Record reached from node 0 by 96 left branches.
    ///
    /// IPv4 lookups in an IPv6 tree start here. For IPv4 trees the start is
    /// node 0. If the walk meets an empty or data record early, that record is
    /// the start for every IPv4 address.
    pub fn ipv4_start(&self) -> Result<Record, MmdbError> {
        if self.header.ip_version == IpVersion::V4 {
            return Ok(Record::Node(0));
        }
        let mut record = Record::Node(0);
        for _ in 0..IPV4_SUBTREE_DEPTH {
            match record {
                Record::Node(node) => record = self.classify(self.read_record(node, false)?)?,
                _ => break,
            }
        }
        Ok(record)
    }

    /// Look up an address.
    ///
    /// `ipv4_start` is the result of [`SearchTree::ipv4_start`], computed once per
    /// database. An IPv6 address has no space in an IPv4 tree and is not found.
    pub fn lookup(
        &self,
        address: &BitSequence,
        ipv4_start: Record,
    ) -> Result<Option<LookupResult>, MmdbError> {
        let mut record = match (address.family(), self.header.ip_version) {
            (AddressFamily::V4, IpVersion::V6) => ipv4_start,
            (AddressFamily::V6, IpVersion::V4) => return Ok(None),
            _ => Record::Node(0),
        };

        let width = address.width();
        let mut depth = 0u32;
        while depth < width {
            match record {
                Record::Node(node) => {
                    record = self.classify(self.read_record(node, address.bit(depth))?)?;
                    depth += 1;
                }
                Record::Empty => return Ok(None),
                Record::Data(offset) => return Ok(Some(self.found(offset, depth))),
            }
        }

        match record {
            Record::Data(offset) => Ok(Some(self.found(offset, depth))),
            _ => Ok(None),
        }
    }

    fn found(&self, data_offset: usize, depth: u32) -> LookupResult {
        LookupResult {
            data_offset,
            prefix_len: depth as u8,
        }
    }

    /// Classify a raw record value
    ///
    /// Per the MMDB format:
    /// - Record value < node_count is a node index
    /// - Record value == node_count means "no entry"
    /// - Otherwise data_offset = (record_value - node_count) - 16
    pub fn classify(&self, record: u32) -> Result<Record, MmdbError> {
        let node_count = self.header.node_count;
        if record < node_count {
            return Ok(Record::Node(record));
        }
        if record == node_count {
            return Ok(Record::Empty);
        }

        let offset = ((record - node_count) as usize)
            .checked_sub(DATA_SECTION_SEPARATOR_SIZE)
            .ok_or_else(|| {
                MmdbError::InvalidFormat(format!(
                    "Record {} points into the data section separator (node_count = {})",
                    record, node_count
                ))
            })?;

        let data_len = self.header.data_section_end - self.header.data_section_start;
        if offset >= data_len {
            return Err(MmdbError::InvalidFormat(format!(
                "Record {} points past the end of the data section ({} bytes)",
                record, data_len
            )));
        }
        Ok(Record::Data(offset))
    }

    /// Read a record from a node
    ///
    /// Each node contains two records. `right` selects which:
    /// - false = left record (for IP bit 0)
    /// - true = right record (for IP bit 1)
    fn read_record(&self, node: u32, right: bool) -> Result<u32, MmdbError> {
        if node >= self.header.node_count {
            return Err(MmdbError::InvalidFormat(format!(
                "Node index {} exceeds node count {}",
                node, self.header.node_count
            )));
        }

        let node_bytes = self.header.record_size.node_bytes();
        let start = node as usize * node_bytes;
        let bytes = self.tree.get(start..start + node_bytes).ok_or_else(|| {
            MmdbError::InvalidFormat(format!(
                "Node offset {} exceeds tree size {}",
                start, self.header.tree_size
            ))
        })?;

        Ok(match self.header.record_size {
            RecordSize::Bits24 => read_24bit_record(bytes, right),
            RecordSize::Bits28 => read_28bit_record(bytes, right),
            RecordSize::Bits32 => read_32bit_record(bytes, right),
        })
    }
}

/// 3 bytes per record, 6 bytes per node
fn read_24bit_record(node: &[u8], right: bool) -> u32 {
    let r = if right { &node[3..6] } else { &node[0..3] };
    ((r[0] as u32) << 16) | ((r[1] as u32) << 8) | (r[2] as u32)
}

/// 3.5 bytes per record, 7 bytes per node
///
/// Layout: [Left 24 bits][Middle 8 bits][Right 24 bits]
/// Middle byte contains 4 high bits of left + 4 high bits of right
fn read_28bit_record(node: &[u8], right: bool) -> u32 {
    if right {
        let high_bits = (node[3] & 0x0F) as u32;
        (high_bits << 24) | ((node[4] as u32) << 16) | ((node[5] as u32) << 8) | (node[6] as u32)
    } else {
        let high_bits = ((node[3] >> 4) & 0x0F) as u32;
        (high_bits << 24) | ((node[0] as u32) << 16) | ((node[1] as u32) << 8) | (node[2] as u32)
    }
}

/// 4 bytes per record, 8 bytes per node
fn read_32bit_record(node: &[u8], right: bool) -> u32 {
    let r = if right { &node[4..8] } else { &node[0..4] };
    u32::from_be_bytes([r[0], r[1], r[2], r[3]])
}
