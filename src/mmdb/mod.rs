//! MaxMind DB (MMDB) Reader
//!
//! This module provides functionality for reading MaxMind DB files,
//! which are used for GeoIP lookups and other IP-based data lookups.
//!
//! The MMDB format uses a binary search tree for efficient IP address
//! lookups. Data is stored in the MMDB data section format, decoded by
//! `crate::data_section::DataDecoder`.
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific types and constants
//! - **format**: Metadata location and decoding, file layout
//! - **tree**: Search tree traversal for IP lookups

pub mod format;
pub mod tree;
pub mod types;

// Re-export key types
pub use format::{find_metadata_marker, Metadata, MmdbHeader};
pub use tree::{LookupResult, Record, SearchTree, IPV4_SUBTREE_DEPTH};
pub use types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
