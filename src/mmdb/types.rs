//! MMDB-specific Type Definitions

use std::fmt;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Size of the all-zero separator between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// MMDB-specific error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmdbError {
    /// Invalid file format
    InvalidFormat(String),
    /// Metadata not found
    MetadataNotFound,
    /// Invalid metadata structure
    InvalidMetadata(String),
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::InvalidFormat(msg) => write!(f, "Invalid MMDB format: {}", msg),
            MmdbError::MetadataNotFound => write!(f, "MMDB metadata marker not found"),
            MmdbError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
        }
    }
}

impl std::error::Error for MmdbError {}

/// IP version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 (may include IPv4-mapped addresses)
    V6,
}

impl IpVersion {
    /// Create from the metadata `ip_version` field
    pub fn from_number(n: u64) -> Result<Self, MmdbError> {
        match n {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(MmdbError::InvalidMetadata(format!(
                "Invalid IP version: {}",
                n
            ))),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "4"),
            IpVersion::V6 => write!(f, "6"),
        }
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Record width in bits
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Create from bit size
    pub fn from_bits(bits: u16) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::InvalidFormat(format!(
                "Invalid record size: {} bits",
                bits
            ))),
        }
    }
}
