//! Engine configuration.
//!
//! Settings come from, lowest precedence first: built-in defaults, an optional
//! JSON file, environment variables, then whatever the caller sets explicitly
//! (the CLI applies its flags last).
//!
//! # Environment Variables
//!
//! - `GEOQL_DB_DIR`: Directory holding the database files (default: `.`)
//! - `GEOQL_ASN_DB`: ASN database file name or path (default: `GeoLite2-ASN.mmdb`)
//! - `GEOQL_CITY_DB`: City database file name or path (default: `GeoLite2-City.mmdb`)
//! - `GEOQL_GEO_MISS`: `omit` or `pad_null`, aggregate behavior on a City miss
//!
//! # Invariants
//!
//! - A relative `asn_file`/`city_file` is resolved against `base_dir`; an
//!   absolute one is used as is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::formatter::GeoMissPolicy;

/// Environment variable for the database directory.
pub const ENV_DB_DIR: &str = "GEOQL_DB_DIR";
/// Environment variable for the ASN database file.
pub const ENV_ASN_DB: &str = "GEOQL_ASN_DB";
/// Environment variable for the City database file.
pub const ENV_CITY_DB: &str = "GEOQL_CITY_DB";
/// Environment variable for the aggregate geo-miss policy.
pub const ENV_GEO_MISS: &str = "GEOQL_GEO_MISS";

/// Where the databases live and how the aggregate line treats a City miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the database files.
    pub base_dir: PathBuf,
    /// ASN database file, relative to `base_dir` unless absolute.
    pub asn_file: PathBuf,
    /// City database file, relative to `base_dir` unless absolute.
    pub city_file: PathBuf,
    /// Aggregate behavior when the City database has no entry.
    pub geo_miss: GeoMissPolicy,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration file could not be read.
    Read {
        /// File path
        path: String,
        /// I/O error text
        message: String,
    },
    /// A configuration file is not valid JSON for [`EngineConfig`].
    Parse {
        /// File path
        path: String,
        /// Parser error text
        message: String,
    },
    /// A setting has an invalid value.
    InvalidValue {
        /// Variable or setting name
        name: String,
        /// What is wrong with it
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read config {path}: {message}"),
            Self::Parse { path, message } => write!(f, "invalid config {path}: {message}"),
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(Self::DEFAULT_BASE_DIR),
            asn_file: PathBuf::from(Self::DEFAULT_ASN_FILE),
            city_file: PathBuf::from(Self::DEFAULT_CITY_FILE),
            geo_miss: GeoMissPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Default database directory.
    pub const DEFAULT_BASE_DIR: &'static str = ".";
    /// Default ASN database file name.
    pub const DEFAULT_ASN_FILE: &'static str = "GeoLite2-ASN.mmdb";
    /// Default City database file name.
    pub const DEFAULT_CITY_FILE: &'static str = "GeoLite2-City.mmdb";

    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load a JSON file; fields it leaves out keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Override settings from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Override settings from any variable source.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = non_empty(ENV_DB_DIR, lookup(ENV_DB_DIR))? {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(file) = non_empty(ENV_ASN_DB, lookup(ENV_ASN_DB))? {
            self.asn_file = PathBuf::from(file);
        }
        if let Some(file) = non_empty(ENV_CITY_DB, lookup(ENV_CITY_DB))? {
            self.city_file = PathBuf::from(file);
        }
        if let Some(policy) = non_empty(ENV_GEO_MISS, lookup(ENV_GEO_MISS))? {
            self.geo_miss = policy
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    name: ENV_GEO_MISS.to_string(),
                    message,
                })?;
        }
        Ok(())
    }

    /// Full path of the ASN database.
    pub fn asn_path(&self) -> PathBuf {
        self.base_dir.join(&self.asn_file)
    }

    /// Full path of the City database.
    pub fn city_path(&self) -> PathBuf {
        self.base_dir.join(&self.city_file)
    }
}

fn non_empty(name: &str, value: Option<String>) -> Result<Option<String>, ConfigError> {
    match value {
        Some(v) if v.is_empty() => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: "must not be empty".to_string(),
        }),
        other => Ok(other),
    }
}
