//! geoql - IP Geolocation Lookups over MaxMind DB Files
//!
//! geoql answers questions like "which country, city and autonomous system does
//! this address belong to?" from a pair of MaxMind DB (MMDB) files, and offers
//! prefix masking for IPv4 and IPv6 addresses. The function surface mirrors a
//! set of SQL scalar functions: each call returns one text value, NULL, or an
//! error.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geoql::{ipmask, Engine, EngineConfig, GeoFunction};
//!
//! // Opens GeoLite2-ASN.mmdb and GeoLite2-City.mmdb from GEOQL_DB_DIR (or ".")
//! let engine = Engine::open(&EngineConfig::from_env()?);
//!
//! if let Some(country) = engine.call(GeoFunction::Country, Some("1.1.1.1"))? {
//!     println!("country: {}", country);
//! }
//! if let Some(line) = engine.geoip(Some("1.1.1.1"))? {
//!     // org | asn | continent | country | subdivision | city | postal | time zone
//!     println!("{}", line);
//! }
//!
//! assert_eq!(ipmask(Some("192.168.1.200"), Some(24))?.as_deref(), Some("192.168.1.0"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! text address ──► address::parse_any ──► BitSequence
//!                                            │
//!                       mmdb::SearchTree ◄───┘   (binary trie, mmap'd)
//!                              │ data offset
//!                              ▼
//!                 data_section::DataDecoder      (lazy ValueRef)
//!                              │
//!                 resolver::resolve(path)        (country.names.en, ...)
//!                              │
//!                 formatter::render_field / format_aggregate
//! ```
//!
//! Databases are memory-mapped once and never modified, so a [`Database`] or
//! [`Engine`] can be shared freely between threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
/// Address parsing, masking and formatting
pub mod address;
/// Engine configuration (defaults, JSON file, environment)
pub mod config;
/// MMDB data section decoding
pub mod data_section;
/// Memory-mapped database handle
pub mod database;
/// Lookup functions and engine state
pub mod engine;
/// Error types for geoql operations
pub mod error;
pub mod file_reader;
/// Field and aggregate rendering
pub mod formatter;
/// MMDB format implementation
pub mod mmdb;
pub mod resolver;

// Re-exports for Rust consumers

pub use crate::address::{AddressFamily, BitSequence};
pub use crate::config::{ConfigError, EngineConfig};
pub use crate::data_section::{DataType, DataValue, ValueRef};
pub use crate::database::{Database, Entry};
pub use crate::engine::{
    ip6mask, ipmask, DatabaseRole, Databases, Engine, EngineState, GeoFunction,
};
pub use crate::error::{GeoError, Result};
pub use crate::formatter::{FieldError, GeoMissPolicy};
pub use crate::mmdb::Metadata;

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();
        assert_send_sync::<Engine>();
    }
}
