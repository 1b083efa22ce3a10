//! MMDB Binary Format Parsing
//!
//! Locates the metadata block at the end of the file, decodes it, and derives the
//! layout of the search tree and data section:
//!
//! ```text
//! [search tree: node_count * node_bytes][16 zero bytes][data section][marker][metadata]
//! ```

use std::collections::BTreeMap;

use memchr::memmem;

use super::types::{
    IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER,
};
use crate::data_section::{DataDecoder, DataValue};

/// The marker must appear within this many bytes of the end of the file
const METADATA_SEARCH_SIZE: usize = 128 * 1024;

/// Layout information needed for lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmdbHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Offset of the first data section byte
    pub data_section_start: usize,
    /// Offset one past the last data section byte (the metadata marker)
    pub data_section_end: usize,
}

impl MmdbHeader {
    /// Derive the file layout from decoded metadata.
    ///
    /// `marker_offset` is where the metadata marker starts.
    pub fn from_metadata(metadata: &Metadata, marker_offset: usize) -> Result<Self, MmdbError> {
        if metadata.node_count == 0 {
            return Err(MmdbError::InvalidMetadata(
                "node_count must be positive".to_string(),
            ));
        }

        let tree_size = (metadata.node_count as usize)
            .checked_mul(metadata.record_size.node_bytes())
            .ok_or_else(|| MmdbError::InvalidFormat("search tree size overflows".to_string()))?;
        let data_section_start = tree_size + DATA_SECTION_SEPARATOR_SIZE;

        if data_section_start > marker_offset {
            return Err(MmdbError::InvalidFormat(format!(
                "search tree ({} nodes, {} bytes) extends past the metadata marker at {}",
                metadata.node_count, tree_size, marker_offset
            )));
        }

        Ok(MmdbHeader {
            node_count: metadata.node_count,
            record_size: metadata.record_size,
            ip_version: metadata.ip_version,
            tree_size,
            data_section_start,
            data_section_end: marker_offset,
        })
    }

    /// Parse the metadata of a complete file and derive its layout
    pub fn from_file(data: &[u8]) -> Result<(Self, Metadata), MmdbError> {
        let marker_offset = find_metadata_marker(data)?;
        let metadata = Metadata::decode(&data[marker_offset + METADATA_MARKER.len()..])?;
        let header = Self::from_metadata(&metadata, marker_offset)?;
        Ok((header, metadata))
    }
}

/// Decoded database metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size
    pub record_size: RecordSize,
    /// IP version of the tree
    pub ip_version: IpVersion,
    /// Database type, e.g. `GeoLite2-City`
    pub database_type: String,
    /// Locale codes the database carries names for
    pub languages: Vec<String>,
    /// Descriptions keyed by language
    pub description: BTreeMap<String, String>,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Format major version (always 2)
    pub binary_format_major_version: u16,
    /// Format minor version
    pub binary_format_minor_version: u16,
}

impl Metadata {
    /// Decode the metadata block that follows the marker
    pub fn decode(block: &[u8]) -> Result<Self, MmdbError> {
        let value = DataDecoder::new(block)
            .decode(0)
            .map_err(|e| MmdbError::InvalidMetadata(format!("Failed to decode metadata: {}", e)))?;
        Self::from_value(&value)
    }

    /// Build from an already decoded metadata map
    pub fn from_value(value: &DataValue) -> Result<Self, MmdbError> {
        let map = match value {
            DataValue::Map(map) => map,
            _ => {
                return Err(MmdbError::InvalidMetadata(
                    "Metadata is not a map".to_string(),
                ))
            }
        };

        let node_count = extract_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count).map_err(|_| {
            MmdbError::InvalidMetadata(format!("node_count {} does not fit in 32 bits", node_count))
        })?;
        let record_size = RecordSize::from_bits(extract_u16(map, "record_size")?)?;
        let ip_version = IpVersion::from_number(extract_uint(map, "ip_version")?)?;

        let binary_format_major_version = match map.get("binary_format_major_version") {
            Some(_) => extract_u16(map, "binary_format_major_version")?,
            None => 2,
        };
        if binary_format_major_version != 2 {
            return Err(MmdbError::InvalidMetadata(format!(
                "Unsupported binary format major version {}",
                binary_format_major_version
            )));
        }
        let binary_format_minor_version = match map.get("binary_format_minor_version") {
            Some(_) => extract_u16(map, "binary_format_minor_version")?,
            None => 0,
        };

        let database_type = match map.get("database_type") {
            Some(DataValue::String(s)) => s.clone(),
            Some(_) => {
                return Err(MmdbError::InvalidMetadata(
                    "Field 'database_type' is not a string".to_string(),
                ))
            }
            None => String::new(),
        };

        let build_epoch = match map.get("build_epoch") {
            Some(_) => extract_uint(map, "build_epoch")?,
            None => 0,
        };

        let languages = match map.get("languages") {
            Some(DataValue::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    DataValue::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let description = match map.get("description") {
            Some(DataValue::Map(entries)) => entries
                .iter()
                .filter_map(|(lang, text)| match text {
                    DataValue::String(s) => Some((lang.clone(), s.clone())),
                    _ => None,
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Ok(Metadata {
            node_count,
            record_size,
            ip_version,
            database_type,
            languages,
            description,
            build_epoch,
            binary_format_major_version,
            binary_format_minor_version,
        })
    }
}

/// Find the metadata marker in an MMDB file
///
/// The marker "\xAB\xCD\xEFMaxMind.com" appears somewhere in the last 128KB
/// of the file. The metadata comes AFTER the marker. When the marker occurs more
/// than once, the last occurrence wins.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, MmdbError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_SIZE);
    memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(MmdbError::MetadataNotFound)
}

fn extract_uint(
    map: &std::collections::HashMap<String, DataValue>,
    key: &str,
) -> Result<u64, MmdbError> {
    match map.get(key) {
        Some(DataValue::Uint16(n)) => Ok(*n as u64),
        Some(DataValue::Uint32(n)) => Ok(*n as u64),
        Some(DataValue::Uint64(n)) => Ok(*n),
        Some(_) => Err(MmdbError::InvalidMetadata(format!(
            "Field '{}' is not an unsigned integer",
            key
        ))),
        None => Err(MmdbError::InvalidMetadata(format!(
            "Required field '{}' not found",
            key
        ))),
    }
}

fn extract_u16(
    map: &std::collections::HashMap<String, DataValue>,
    key: &str,
) -> Result<u16, MmdbError> {
    let n = extract_uint(map, key)?;
    u16::try_from(n).map_err(|_| {
        MmdbError::InvalidMetadata(format!("Field '{}' out of range: {}", key, n))
    })
}
