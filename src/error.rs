/// Error types for the geoql library
use std::fmt;

use crate::data_section::DecodeError;
use crate::formatter::FieldError;
use crate::mmdb::MmdbError;

/// Result type alias for geoql operations
pub type Result<T> = std::result::Result<T, GeoError>;

/// Main error type for lookup and masking calls
///
/// Every call on the function surface yields one formatted value, one NULL,
/// or exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// Text that is not a literal IPv4/IPv6 address
    InvalidAddress {
        /// The offending input, verbatim
        input: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Mask length outside `[0, max]`
    InvalidPrefixLength {
        /// Requested length as passed by the caller
        len: i64,
        /// Bit width of the address family
        max: u32,
    },

    /// The engine has no usable databases
    NotInitialized,

    /// Structurally invalid trie or data section
    CorruptDatabase(String),

    /// Single-field lookup rejected the resolved value
    Field(FieldError),

    /// I/O errors while opening or mapping a database
    Io(String),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::InvalidAddress { input, reason } => {
                write!(f, "Malformed IP address '{}': {}", input, reason)
            }
            GeoError::InvalidPrefixLength { len, max } => {
                write!(f, "Wrong mask length: {} (expected 0..={})", len, max)
            }
            GeoError::NotInitialized => write!(f, "geoql is not initialized"),
            GeoError::CorruptDatabase(msg) => write!(f, "Corrupt database: {}", msg),
            GeoError::Field(err) => write!(f, "{}", err),
            GeoError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for GeoError {}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::Io(err.to_string())
    }
}

impl From<FieldError> for GeoError {
    fn from(err: FieldError) -> Self {
        GeoError::Field(err)
    }
}

impl From<DecodeError> for GeoError {
    fn from(err: DecodeError) -> Self {
        GeoError::CorruptDatabase(err.to_string())
    }
}

impl From<MmdbError> for GeoError {
    fn from(err: MmdbError) -> Self {
        GeoError::CorruptDatabase(err.to_string())
    }
}
