//! Database handle
//!
//! A [`Database`] owns one MMDB image (memory-mapped or in memory), its parsed
//! layout, and the precomputed IPv4 start record. It is immutable after open and
//! can be shared across threads.
//!
//! # Examples
//!
//! ```no_run
//! use geoql::resolver::parse_path;
//! use geoql::Database;
//!
//! let db = Database::open("GeoLite2-City.mmdb")?;
//! if let Some(entry) = db.lookup_str("1.1.1.1")? {
//!     let country = entry.get(&parse_path("country.names.en"))?;
//!     println!("{:?} (/{})", country, entry.prefix_len());
//! }
//! # Ok::<(), geoql::GeoError>(())
//! ```

use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use memmap2::Mmap;

use crate::address::{self, BitSequence};
use crate::data_section::{DataDecoder, DataValue, DecodeError, ValueRef};
use crate::error::{GeoError, Result};
use crate::mmdb::{find_metadata_marker, Metadata, MmdbHeader, Record, SearchTree, METADATA_MARKER};
use crate::resolver::{self, FieldPath};

/// Storage for database data - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// A read-only MMDB database
pub struct Database {
    data: DatabaseStorage,
    header: MmdbHeader,
    metadata: Metadata,
    ipv4_start: Record,
    /// Set once, on the first corruption seen through this handle
    poisoned: OnceLock<String>,
    source: String,
}

impl Database {
    /// Open a database file using memory mapping
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| GeoError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        // SAFETY: the mapping is read-only and database files are replaced, not
        // rewritten in place, by the tools that publish them.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| GeoError::Io(format!("Failed to mmap {}: {}", path.display(), e)))?;

        Self::from_storage(DatabaseStorage::Mmap(mmap), path.display().to_string())
    }

    /// Create database from raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(DatabaseStorage::Owned(data), "<memory>".to_string())
    }

    fn from_storage(storage: DatabaseStorage, source: String) -> Result<Self> {
        let data = storage.as_slice();
        let marker = find_metadata_marker(data)?;
        let metadata = Metadata::decode(&data[marker + METADATA_MARKER.len()..])?;
        let header = MmdbHeader::from_metadata(&metadata, marker)?;
        let ipv4_start = SearchTree::new(data, &header)?.ipv4_start()?;

        tracing::info!(
            source = %source,
            node_count = header.node_count,
            record_size = header.record_size.bits(),
            ip_version = %header.ip_version,
            database_type = %metadata.database_type,
            "opened MMDB database"
        );

        Ok(Self {
            data: storage,
            header,
            metadata,
            ipv4_start,
            poisoned: OnceLock::new(),
            source,
        })
    }

    /// File layout
    pub fn header(&self) -> &MmdbHeader {
        &self.header
    }

    /// Decoded metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Path the database was opened from, or `<memory>`
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Reason this handle stopped serving lookups, if it did
    pub fn poison_reason(&self) -> Option<&str> {
        self.poisoned.get().map(String::as_str)
    }

    /// Look up an address.
    ///
    /// `Ok(None)` means the database has no entry covering the address.
    pub fn lookup(&self, address: &BitSequence) -> Result<Option<Entry<'_>>> {
        self.check_poisoned()?;

        let data = self.data.as_slice();
        let found = SearchTree::new(data, &self.header)
            .and_then(|tree| tree.lookup(address, self.ipv4_start))
            .map_err(|e| self.poison(e.to_string()))?;

        tracing::trace!(
            source = %self.source,
            address = %address,
            found = found.is_some(),
            "tree lookup"
        );

        Ok(found.map(|result| Entry {
            db: self,
            address: *address,
            offset: result.data_offset,
            prefix_len: result.prefix_len,
        }))
    }

    /// Parse `text` as a literal address and look it up
    pub fn lookup_str(&self, text: &str) -> Result<Option<Entry<'_>>> {
        let address = address::parse_any(text)?;
        self.lookup(&address)
    }

    fn decoder(&self) -> DataDecoder<'_> {
        let data = self.data.as_slice();
        DataDecoder::new(&data[self.header.data_section_start..self.header.data_section_end])
    }

    fn check_poisoned(&self) -> Result<()> {
        match self.poisoned.get() {
            Some(reason) => Err(GeoError::CorruptDatabase(reason.clone())),
            None => Ok(()),
        }
    }

    /// Record a corruption and return the error every later call will see
    fn poison(&self, reason: String) -> GeoError {
        let mut first = false;
        let reason = self.poisoned.get_or_init(|| {
            first = true;
            reason
        });
        if first {
            tracing::error!(source = %self.source, reason = %reason, "database handle poisoned");
        }
        GeoError::CorruptDatabase(reason.clone())
    }

    fn decode_failure(&self, err: DecodeError) -> GeoError {
        match err {
            DecodeError::Corrupt { .. } => self.poison(err.to_string()),
            DecodeError::UnsupportedType { .. } => GeoError::CorruptDatabase(err.to_string()),
        }
    }
}

/// A database entry found for an address
#[derive(Clone, Copy)]
pub struct Entry<'db> {
    db: &'db Database,
    address: BitSequence,
    offset: usize,
    prefix_len: u8,
}

impl<'db> Entry<'db> {
    /// Prefix length of the matched network, in bits of the address family
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Matched network address (the looked-up address masked to `prefix_len`)
    pub fn network(&self) -> BitSequence {
        address::mask(self.address, self.prefix_len as u32).unwrap_or(self.address)
    }

    /// Offset of the record within the data section
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Resolve a field path inside the record
    pub fn get(&self, path: &FieldPath<'_>) -> Result<Option<ValueRef<'db>>> {
        self.db.check_poisoned()?;
        resolver::resolve(&self.db.decoder(), self.offset, path)
            .map_err(|e| self.db.decode_failure(e))
    }

    /// Resolve a field path and decode whatever it names, containers included
    pub fn get_decoded(&self, path: &FieldPath<'_>) -> Result<Option<DataValue>> {
        let decoder = self.db.decoder();
        match self.get(path)? {
            Some(value) => decoder
                .materialize(value)
                .map(Some)
                .map_err(|e| self.db.decode_failure(e)),
            None => Ok(None),
        }
    }

    /// Decode the whole record
    pub fn decode(&self) -> Result<DataValue> {
        self.db.check_poisoned()?;
        self.db
            .decoder()
            .decode(self.offset)
            .map_err(|e| self.db.decode_failure(e))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("source", &self.source)
            .field("header", &self.header)
            .field("poisoned", &self.poisoned.get())
            .finish()
    }
}

impl std::fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("source", &self.db.source)
            .field("network", &format!("{}/{}", self.network(), self.prefix_len))
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_mmdb() {
        let err = Database::from_bytes(b"definitely not a database".to_vec()).unwrap_err();
        assert!(matches!(err, GeoError::CorruptDatabase(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Database::open("/nonexistent/GeoLite2-City.mmdb").unwrap_err();
        match err {
            GeoError::Io(msg) => assert!(msg.contains("Failed to open")),
            other => panic!("expected I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_names_source() {
        let err = Database::open("/nonexistent/GeoLite2-ASN.mmdb");
        assert!(err.is_err());
        let rendered = format!("{:?}", err);
        assert!(rendered.contains("Failed to open"));
    }
}
