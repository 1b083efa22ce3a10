//! The callable function surface
//!
//! An [`Engine`] holds the two databases (ASN and City) behind an explicit
//! [`EngineState`] and evaluates the lookup functions against them. Every call
//! yields one value, one NULL (`Ok(None)`), or one error.
//!
//! ```no_run
//! use geoql::{Engine, EngineConfig, GeoFunction};
//!
//! let engine = Engine::open(&EngineConfig::from_env()?);
//! let country = engine.call(GeoFunction::Country, Some("1.1.1.1"))?;
//! let line = engine.geoip(Some("1.1.1.1"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::address::{self, AddressFamily};
use crate::config::EngineConfig;
use crate::database::Database;
use crate::error::{GeoError, Result};
use crate::formatter::{self, AsnFields, GeoFields, GeoMissPolicy};
use crate::resolver::Selector;

/// Which database a function reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseRole {
    /// `GeoLite2-ASN`
    Asn,
    /// `GeoLite2-City`
    City,
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseRole::Asn => write!(f, "ASN"),
            DatabaseRole::City => write!(f, "City"),
        }
    }
}

const COUNTRY: &[Selector<'static>] = &[
    Selector::Key("country"),
    Selector::Key("names"),
    Selector::Key("en"),
];
const COUNTRY_CODE: &[Selector<'static>] = &[Selector::Key("country"), Selector::Key("iso_code")];
const CONTINENT: &[Selector<'static>] = &[
    Selector::Key("continent"),
    Selector::Key("names"),
    Selector::Key("en"),
];
const CITY: &[Selector<'static>] = &[Selector::Key("city"), Selector::Key("names"), Selector::Key("en")];
const STATE: &[Selector<'static>] = &[
    Selector::Key("subdivisions"),
    Selector::Index(0),
    Selector::Key("names"),
    Selector::Key("en"),
];
const TIMEZONE: &[Selector<'static>] = &[Selector::Key("location"), Selector::Key("time_zone")];
const ZIPCODE: &[Selector<'static>] = &[Selector::Key("postal"), Selector::Key("code")];
const ASN_OWNER: &[Selector<'static>] = &[Selector::Key("autonomous_system_organization")];
const ASN_NUMBER: &[Selector<'static>] = &[Selector::Key("autonomous_system_number")];

/// Single-field lookup functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoFunction {
    /// English country name
    Country,
    /// English continent name
    Continent,
    /// English city name
    City,
    /// English name of the first subdivision
    State,
    /// IANA time zone
    Timezone,
    /// Postal code
    Zipcode,
    /// Autonomous system organization
    AsnOwner,
    /// Autonomous system number
    AsnNumber,
    /// ISO 3166-1 country code
    CountryCode,
}

impl GeoFunction {
    /// Every function, in table order
    pub const ALL: [GeoFunction; 9] = [
        GeoFunction::Country,
        GeoFunction::Continent,
        GeoFunction::City,
        GeoFunction::State,
        GeoFunction::Timezone,
        GeoFunction::Zipcode,
        GeoFunction::AsnOwner,
        GeoFunction::AsnNumber,
        GeoFunction::CountryCode,
    ];

    /// Function name without the `geoip_` prefix
    pub fn name(self) -> &'static str {
        match self {
            GeoFunction::Country => "country",
            GeoFunction::Continent => "continent",
            GeoFunction::City => "city",
            GeoFunction::State => "state",
            GeoFunction::Timezone => "timezone",
            GeoFunction::Zipcode => "zipcode",
            GeoFunction::AsnOwner => "asn_owner",
            GeoFunction::AsnNumber => "asn_number",
            GeoFunction::CountryCode => "country_code",
        }
    }

    /// Database the function reads
    pub fn source(self) -> DatabaseRole {
        match self {
            GeoFunction::AsnOwner | GeoFunction::AsnNumber => DatabaseRole::Asn,
            _ => DatabaseRole::City,
        }
    }

    /// Field path within the record
    pub fn path(self) -> &'static [Selector<'static>] {
        match self {
            GeoFunction::Country => COUNTRY,
            GeoFunction::Continent => CONTINENT,
            GeoFunction::City => CITY,
            GeoFunction::State => STATE,
            GeoFunction::Timezone => TIMEZONE,
            GeoFunction::Zipcode => ZIPCODE,
            GeoFunction::AsnOwner => ASN_OWNER,
            GeoFunction::AsnNumber => ASN_NUMBER,
            GeoFunction::CountryCode => COUNTRY_CODE,
        }
    }
}

impl fmt::Display for GeoFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GeoFunction {
    type Err = String;

    /// Accepts `country` as well as `geoip_country`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let name = lower.strip_prefix("geoip_").unwrap_or(&lower);
        GeoFunction::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| format!("unknown function '{}'", s))
    }
}

/// The two opened databases
pub struct Databases {
    /// ASN database
    pub asn: Database,
    /// City database
    pub city: Database,
}

impl Databases {
    /// Database for a role
    pub fn get(&self, role: DatabaseRole) -> &Database {
        match role {
            DatabaseRole::Asn => &self.asn,
            DatabaseRole::City => &self.city,
        }
    }
}

/// Whether lookups can be served
pub enum EngineState {
    /// Nothing opened yet
    Uninitialized,
    /// Both databases opened
    Ready(Databases),
    /// Opening failed; the reason is kept for diagnostics
    Failed(String),
}

/// Evaluates the lookup functions
pub struct Engine {
    state: EngineState,
    geo_miss: GeoMissPolicy,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with no databases; every lookup fails with `NotInitialized`
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            geo_miss: GeoMissPolicy::default(),
        }
    }

    /// Open both databases named by `config`.
    ///
    /// Never fails: if either database cannot be opened the engine is left in
    /// [`EngineState::Failed`] and every lookup reports `NotInitialized`.
    pub fn open(config: &EngineConfig) -> Self {
        let asn = open_role(DatabaseRole::Asn, &config.asn_path());
        let city = open_role(DatabaseRole::City, &config.city_path());

        let state = match (asn, city) {
            (Ok(asn), Ok(city)) => EngineState::Ready(Databases { asn, city }),
            (asn, city) => {
                let reasons: Vec<String> = [asn.err(), city.err()].into_iter().flatten().collect();
                EngineState::Failed(reasons.join("; "))
            }
        };

        Self {
            state,
            geo_miss: config.geo_miss,
        }
    }

    /// Engine over already opened databases
    pub fn from_databases(asn: Database, city: Database) -> Self {
        Self {
            state: EngineState::Ready(Databases { asn, city }),
            geo_miss: GeoMissPolicy::default(),
        }
    }

    /// Set the aggregate behavior on a City miss
    pub fn with_geo_miss(mut self, policy: GeoMissPolicy) -> Self {
        self.geo_miss = policy;
        self
    }

    /// Current state
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// True when both databases are open
    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready(_))
    }

    /// Aggregate policy in effect
    pub fn geo_miss(&self) -> GeoMissPolicy {
        self.geo_miss
    }

    /// Opened databases, or `NotInitialized`
    pub fn databases(&self) -> Result<&Databases> {
        match &self.state {
            EngineState::Ready(dbs) => Ok(dbs),
            EngineState::Uninitialized | EngineState::Failed(_) => Err(GeoError::NotInitialized),
        }
    }

    /// Evaluate a single-field function.
    ///
    /// `None` input yields `Ok(None)`; so does an address the database does not
    /// cover. A covered address whose field is missing or of another type is an
    /// error.
    pub fn call(&self, function: GeoFunction, address: Option<&str>) -> Result<Option<String>> {
        let dbs = self.databases()?;
        let text = match address {
            Some(text) => text,
            None => return Ok(None),
        };
        let bits = address::parse_any(text)?;

        let entry = match dbs.get(function.source()).lookup(&bits)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let value = entry.get(function.path())?;
        Ok(Some(formatter::render_field(value.as_ref())?))
    }

    /// Evaluate the aggregate `geoip` line.
    ///
    /// An ASN miss renders `NULL | NULL | `; a City miss follows the configured
    /// [`GeoMissPolicy`].
    pub fn geoip(&self, address: Option<&str>) -> Result<Option<String>> {
        let dbs = self.databases()?;
        let text = match address {
            Some(text) => text,
            None => return Ok(None),
        };
        let bits = address::parse_any(text)?;

        let asn_entry = dbs.asn.lookup(&bits)?;
        let city_entry = dbs.city.lookup(&bits)?;

        let asn = match asn_entry {
            Some(entry) => Some(AsnFields {
                organization: entry.get(ASN_OWNER)?,
                number: entry.get(ASN_NUMBER)?,
            }),
            None => None,
        };
        let geo = match city_entry {
            Some(entry) => Some(GeoFields {
                continent: entry.get(CONTINENT)?,
                country: entry.get(COUNTRY)?,
                subdivision: entry.get(STATE)?,
                city: entry.get(CITY)?,
                postal_code: entry.get(ZIPCODE)?,
                time_zone: entry.get(TIMEZONE)?,
            }),
            None => None,
        };

        Ok(formatter::format_aggregate(
            asn.as_ref(),
            geo.as_ref(),
            self.geo_miss,
        ))
    }
}

fn open_role(role: DatabaseRole, path: &Path) -> std::result::Result<Database, String> {
    Database::open(path).map_err(|e| {
        tracing::error!(database = %role, path = %path.display(), "Error: {} on GeoLite2 {} MMDB", e, role);
        format!("{} database: {}", role, e)
    })
}

/// Mask an IPv4 address to `len` bits.
///
/// `None` for either argument yields `Ok(None)`. The length is checked before
/// the address.
pub fn ipmask(address: Option<&str>, len: Option<i64>) -> Result<Option<String>> {
    mask_text(address, len, AddressFamily::V4)
}

/// Mask an IPv6 address to `len` bits
pub fn ip6mask(address: Option<&str>, len: Option<i64>) -> Result<Option<String>> {
    mask_text(address, len, AddressFamily::V6)
}

fn mask_text(address: Option<&str>, len: Option<i64>, family: AddressFamily) -> Result<Option<String>> {
    let (text, len) = match (address, len) {
        (Some(text), Some(len)) => (text, len),
        _ => return Ok(None),
    };
    let max = family.width();
    let prefix_len = u32::try_from(len)
        .ok()
        .filter(|p| *p <= max)
        .ok_or(GeoError::InvalidPrefixLength { len, max })?;

    let bits = address::parse(text, family)?;
    let masked = address::mask(bits, prefix_len)?;
    Ok(Some(address::format(masked)))
}
