//! Rendering resolved fields as text
//!
//! Two call styles render the same values differently:
//!
//! - single-field calls ([`render_field`]) reject anything that is not a string,
//!   raw bytes or an unsigned 32-bit integer with a [`FieldError`];
//! - the aggregate line ([`format_aggregate`]) renders every such value, and every
//!   absent one, as `NULL`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data_section::{DataType, ValueRef};

/// NULL sentinel used by the aggregate line
pub const NULL_TEXT: &str = "NULL";

/// Separator between aggregate fields
pub const SEPARATOR: &str = " | ";

/// Why a single-field call produced no text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// The path did not resolve to a value
    NoData,
    /// The value is not a string, bytes or an unsigned 32-bit integer
    UnexpectedType(DataType),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::NoData => write!(f, "No data to retrieve"),
            FieldError::UnexpectedType(t) => write!(f, "Data type is: {}", t),
        }
    }
}

impl std::error::Error for FieldError {}

fn render_text(value: &ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::String(s) => Some((*s).to_string()),
        // bytes print as text, stopping at the first NUL
        ValueRef::Bytes(b) => {
            let end = memchr::memchr(0, b).unwrap_or(b.len());
            Some(String::from_utf8_lossy(&b[..end]).into_owned())
        }
        ValueRef::Uint32(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Aggregate policy: strings and bytes verbatim, `u32` in decimal, anything else `NULL`
pub fn render_leaf(value: Option<&ValueRef<'_>>) -> String {
    value
        .and_then(render_text)
        .unwrap_or_else(|| NULL_TEXT.to_string())
}

/// Single-field policy: strings and bytes verbatim, `u32` in decimal, otherwise an error
pub fn render_field(value: Option<&ValueRef<'_>>) -> Result<String, FieldError> {
    let value = value.ok_or(FieldError::NoData)?;
    render_text(value).ok_or(FieldError::UnexpectedType(value.data_type()))
}

/// Fields read from the ASN database for the aggregate line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsnFields<'a> {
    /// `autonomous_system_organization`
    pub organization: Option<ValueRef<'a>>,
    /// `autonomous_system_number`
    pub number: Option<ValueRef<'a>>,
}

/// Fields read from the City database for the aggregate line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoFields<'a> {
    /// `continent.names.en`
    pub continent: Option<ValueRef<'a>>,
    /// `country.names.en`
    pub country: Option<ValueRef<'a>>,
    /// `subdivisions.0.names.en`
    pub subdivision: Option<ValueRef<'a>>,
    /// `city.names.en`
    pub city: Option<ValueRef<'a>>,
    /// `postal.code`
    pub postal_code: Option<ValueRef<'a>>,
    /// `location.time_zone`
    pub time_zone: Option<ValueRef<'a>>,
}

/// What the aggregate line does when the City database has no entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoMissPolicy {
    /// Produce no line at all
    #[default]
    Omit,
    /// Pad the six geo fields with `NULL`
    PadNull,
}

impl FromStr for GeoMissPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "omit" => Ok(GeoMissPolicy::Omit),
            "pad_null" | "pad-null" | "pad" => Ok(GeoMissPolicy::PadNull),
            other => Err(format!(
                "unknown geo miss policy '{}' (expected omit or pad_null)",
                other
            )),
        }
    }
}

impl fmt::Display for GeoMissPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoMissPolicy::Omit => write!(f, "omit"),
            GeoMissPolicy::PadNull => write!(f, "pad_null"),
        }
    }
}

/// Build the aggregate line.
///
/// `None` for `asn` or `geo` means that database had no entry for the address.
/// An ASN miss becomes `NULL | NULL | `; a geo miss follows `policy`.
pub fn format_aggregate(
    asn: Option<&AsnFields<'_>>,
    geo: Option<&GeoFields<'_>>,
    policy: GeoMissPolicy,
) -> Option<String> {
    let mut line = match asn {
        Some(asn) => {
            let mut head = render_leaf(asn.organization.as_ref());
            head.push_str(SEPARATOR);
            head.push_str(&render_leaf(asn.number.as_ref()));
            head.push_str(SEPARATOR);
            head
        }
        None => format!("{0}{1}{0}{1}", NULL_TEXT, SEPARATOR),
    };

    let tail = match geo {
        Some(geo) => [
            &geo.continent,
            &geo.country,
            &geo.subdivision,
            &geo.city,
            &geo.postal_code,
            &geo.time_zone,
        ]
        .iter()
        .map(|field| render_leaf(field.as_ref()))
        .collect::<Vec<_>>()
        .join(SEPARATOR),
        None => match policy {
            GeoMissPolicy::Omit => return None,
            GeoMissPolicy::PadNull => vec![NULL_TEXT; 6].join(SEPARATOR),
        },
    };

    line.push_str(&tail);
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_section::Container;

    #[test]
    fn test_render_leaf() {
        assert_eq!(render_leaf(Some(&ValueRef::String("Paris"))), "Paris");
        assert_eq!(render_leaf(Some(&ValueRef::Uint32(13335))), "13335");
        assert_eq!(render_leaf(None), "NULL");
        assert_eq!(render_leaf(Some(&ValueRef::Bytes(b"2000"))), "2000");
        for value in [
            ValueRef::Bool(true),
            ValueRef::Double(1.0),
            ValueRef::Uint16(7),
            ValueRef::Map(Container { len: 0, first: 0 }),
        ] {
            assert_eq!(render_leaf(Some(&value)), "NULL");
        }
    }

    #[test]
    fn test_render_field() {
        assert_eq!(render_field(Some(&ValueRef::String("AU"))), Ok("AU".to_string()));
        assert_eq!(render_field(Some(&ValueRef::Uint32(0))), Ok("0".to_string()));
        assert_eq!(render_field(None), Err(FieldError::NoData));
        assert_eq!(render_field(Some(&ValueRef::Bytes(b"75001"))), Ok("75001".to_string()));
        assert_eq!(render_field(Some(&ValueRef::Bytes(b"AB\0CD"))), Ok("AB".to_string()));
        assert_eq!(render_field(Some(&ValueRef::Bytes(b""))), Ok(String::new()));

        let err = render_field(Some(&ValueRef::Double(-33.8))).unwrap_err();
        assert_eq!(err, FieldError::UnexpectedType(DataType::Double));
        assert_eq!(err.to_string(), "Data type is: double");

        let err = render_field(Some(&ValueRef::Array(Container { len: 1, first: 0 }))).unwrap_err();
        assert_eq!(err.to_string(), "Data type is: array");
    }

    fn geo() -> GeoFields<'static> {
        GeoFields {
            continent: Some(ValueRef::String("Oceania")),
            country: Some(ValueRef::String("Australia")),
            subdivision: None,
            city: Some(ValueRef::String("Sydney")),
            postal_code: Some(ValueRef::String("2000")),
            time_zone: Some(ValueRef::String("Australia/Sydney")),
        }
    }

    #[test]
    fn test_aggregate_full() {
        let asn = AsnFields {
            organization: Some(ValueRef::String("Cloudflare, Inc.")),
            number: Some(ValueRef::Uint32(13335)),
        };
        assert_eq!(
            format_aggregate(Some(&asn), Some(&geo()), GeoMissPolicy::Omit).unwrap(),
            "Cloudflare, Inc. | 13335 | Oceania | Australia | NULL | Sydney | 2000 | Australia/Sydney"
        );
    }

    #[test]
    fn test_aggregate_asn_miss() {
        assert_eq!(
            format_aggregate(None, Some(&geo()), GeoMissPolicy::Omit).unwrap(),
            "NULL | NULL | Oceania | Australia | NULL | Sydney | 2000 | Australia/Sydney"
        );
    }

    #[test]
    fn test_aggregate_geo_miss() {
        let asn = AsnFields {
            organization: Some(ValueRef::String("Example")),
            number: Some(ValueRef::Uint32(64500)),
        };
        assert_eq!(format_aggregate(Some(&asn), None, GeoMissPolicy::Omit), None);
        assert_eq!(
            format_aggregate(Some(&asn), None, GeoMissPolicy::PadNull).unwrap(),
            "Example | 64500 | NULL | NULL | NULL | NULL | NULL | NULL"
        );
        assert_eq!(
            format_aggregate(None, None, GeoMissPolicy::PadNull).unwrap(),
            vec!["NULL"; 8].join(" | ")
        );
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("omit".parse::<GeoMissPolicy>(), Ok(GeoMissPolicy::Omit));
        assert_eq!("PAD_NULL".parse::<GeoMissPolicy>(), Ok(GeoMissPolicy::PadNull));
        assert!("sometimes".parse::<GeoMissPolicy>().is_err());
    }
}
