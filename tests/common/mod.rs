//! Test fixture writer: builds small MaxMind DB images in memory
//!
//! Networks must be inserted broadest first; a more specific network splits the
//! data record it lands in.

#![allow(dead_code)]

use geoql::DataValue;
use std::collections::HashMap;
use std::net::IpAddr;

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Encoded data section, offsets relative to its first byte
#[derive(Default)]
pub struct DataWriter {
    buffer: Vec<u8>,
}

impl DataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, returning its offset
    pub fn push(&mut self, value: &DataValue) -> usize {
        let offset = self.buffer.len();
        encode(value, &mut self.buffer);
        offset
    }

    /// Append a pointer to `target`, returning the pointer's own offset
    pub fn push_pointer(&mut self, target: usize) -> usize {
        let offset = self.buffer.len();
        encode_pointer(target as u32, &mut self.buffer);
        offset
    }

    /// Append raw bytes, returning their offset
    pub fn push_raw(&mut self, bytes: &[u8]) -> usize {
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        offset
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Encode a value in MMDB data-section format
pub fn encode(value: &DataValue, out: &mut Vec<u8>) {
    match value {
        DataValue::String(s) => {
            control(2, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Double(d) => {
            control(3, 8, out);
            out.extend_from_slice(&d.to_be_bytes());
        }
        DataValue::Bytes(b) => {
            control(4, b.len(), out);
            out.extend_from_slice(b);
        }
        DataValue::Uint16(n) => uint(5, *n as u128, out),
        DataValue::Uint32(n) => uint(6, *n as u128, out),
        DataValue::Map(m) => {
            control(7, m.len(), out);
            let mut pairs: Vec<_> = m.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            for (key, value) in pairs {
                encode(&DataValue::String(key.clone()), out);
                encode(value, out);
            }
        }
        DataValue::Int32(n) => {
            control(8, 4, out);
            out.extend_from_slice(&n.to_be_bytes());
        }
        DataValue::Uint64(n) => uint(9, *n as u128, out),
        DataValue::Uint128(n) => uint(10, *n, out),
        DataValue::Array(items) => {
            control(11, items.len(), out);
            for item in items {
                encode(item, out);
            }
        }
        DataValue::Bool(b) => control(14, *b as usize, out),
        DataValue::Float(f) => {
            control(15, 4, out);
            out.extend_from_slice(&f.to_be_bytes());
        }
    }
}

/// Minimal big-endian payload
fn uint(type_id: u8, n: u128, out: &mut Vec<u8>) {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    control(type_id, bytes.len() - skip, out);
    out.extend_from_slice(&bytes[skip..]);
}

/// Control byte, extended type byte and size bytes
pub fn control(type_id: u8, size: usize, out: &mut Vec<u8>) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_id <= 7 {
        out.push((type_id << 5) | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra);
}

pub fn encode_pointer(target: u32, out: &mut Vec<u8>) {
    if target < 0x800 {
        out.push(0x20 | ((target >> 8) & 0x07) as u8);
        out.push(target as u8);
    } else if target < 0x80800 {
        let v = target - 0x800;
        out.push(0x28 | ((v >> 16) & 0x07) as u8);
        out.extend_from_slice(&v.to_be_bytes()[2..]);
    } else if target < 0x8080800 {
        let v = target - 0x80800;
        out.push(0x30 | ((v >> 24) & 0x07) as u8);
        out.extend_from_slice(&v.to_be_bytes()[1..]);
    } else {
        out.push(0x38);
        out.extend_from_slice(&target.to_be_bytes());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Empty,
    Node(usize),
    Data(usize),
}

/// Builds the search tree, data section and metadata of one database
pub struct MmdbWriter {
    ip_version: u16,
    record_size: u16,
    database_type: String,
    nodes: Vec<[Slot; 2]>,
    pub data: DataWriter,
}

impl MmdbWriter {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        assert!(ip_version == 4 || ip_version == 6);
        assert!(matches!(record_size, 24 | 28 | 32));
        Self {
            ip_version,
            record_size,
            database_type: "geoql-Test".to_string(),
            nodes: vec![[Slot::Empty; 2]],
            data: DataWriter::new(),
        }
    }

    pub fn database_type(mut self, name: &str) -> Self {
        self.database_type = name.to_string();
        self
    }

    /// Map `cidr` to a newly encoded record
    pub fn insert(&mut self, cidr: &str, value: &DataValue) {
        let offset = self.data.push(value);
        self.insert_offset(cidr, offset);
    }

    /// Map `cidr` to an already written data offset
    pub fn insert_offset(&mut self, cidr: &str, offset: usize) {
        let (bits, prefix_len) = self.network_bits(cidr);
        assert!(prefix_len >= 1, "networks must have a prefix length of at least 1");
        let width = self.width();

        let mut node = 0usize;
        for depth in 0..prefix_len - 1 {
            let bit = ((bits >> (width - 1 - depth)) & 1) as usize;
            node = match self.nodes[node][bit] {
                Slot::Node(next) => next,
                other => {
                    // push a covering record (or nothing) down one level
                    let inherited = match other {
                        Slot::Data(_) => other,
                        _ => Slot::Empty,
                    };
                    self.nodes.push([inherited; 2]);
                    let next = self.nodes.len() - 1;
                    self.nodes[node][bit] = Slot::Node(next);
                    next
                }
            };
        }
        let bit = ((bits >> (width - prefix_len)) & 1) as usize;
        self.nodes[node][bit] = Slot::Data(offset);
    }

    fn width(&self) -> u32 {
        if self.ip_version == 4 {
            32
        } else {
            128
        }
    }

    /// Tree bits and prefix length; IPv4 networks in an IPv6 tree go under ::/96
    fn network_bits(&self, cidr: &str) -> (u128, u32) {
        let (addr, len) = cidr.split_once('/').expect("cidr");
        let len: u32 = len.parse().expect("prefix length");
        match addr.parse::<IpAddr>().expect("address") {
            IpAddr::V4(v4) if self.ip_version == 4 => (u32::from(v4) as u128, len),
            IpAddr::V4(v4) => (u32::from(v4) as u128, len + 96),
            IpAddr::V6(v6) => {
                assert_eq!(self.ip_version, 6, "IPv6 network in an IPv4 tree");
                (u128::from(v6), len)
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn record_value(&self, slot: Slot) -> u32 {
        let node_count = self.nodes.len() as u32;
        match slot {
            Slot::Empty => node_count,
            Slot::Node(n) => n as u32,
            Slot::Data(offset) => node_count + 16 + offset as u32,
        }
    }

    pub fn tree_bytes(&self) -> Vec<u8> {
        let mut tree = Vec::new();
        for pair in &self.nodes {
            let left = self.record_value(pair[0]);
            let right = self.record_value(pair[1]);
            write_node(self.record_size, left, right, &mut tree);
        }
        tree
    }

    pub fn metadata(&self) -> DataValue {
        let mut description = HashMap::new();
        description.insert(
            "en".to_string(),
            DataValue::String("geoql test fixture".to_string()),
        );

        let mut map = HashMap::new();
        map.insert("node_count".to_string(), DataValue::Uint32(self.nodes.len() as u32));
        map.insert("record_size".to_string(), DataValue::Uint16(self.record_size));
        map.insert("ip_version".to_string(), DataValue::Uint16(self.ip_version));
        map.insert(
            "database_type".to_string(),
            DataValue::String(self.database_type.clone()),
        );
        map.insert(
            "languages".to_string(),
            DataValue::Array(vec![DataValue::String("en".to_string())]),
        );
        map.insert("description".to_string(), DataValue::Map(description));
        map.insert("build_epoch".to_string(), DataValue::Uint64(1_709_251_200));
        map.insert("binary_format_major_version".to_string(), DataValue::Uint16(2));
        map.insert("binary_format_minor_version".to_string(), DataValue::Uint16(0));
        DataValue::Map(map)
    }

    /// Complete database image
    pub fn build(self) -> Vec<u8> {
        let mut out = self.tree_bytes();
        out.extend_from_slice(&[0u8; 16]);
        let metadata = self.metadata();
        out.extend_from_slice(&self.data.into_bytes());
        out.extend_from_slice(METADATA_MARKER);
        encode(&metadata, &mut out);
        out
    }
}

pub fn write_node(record_size: u16, left: u32, right: u32, out: &mut Vec<u8>) {
    match record_size {
        24 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        28 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        _ => {
            out.extend_from_slice(&left.to_be_bytes());
            out.extend_from_slice(&right.to_be_bytes());
        }
    }
}

pub fn string(s: &str) -> DataValue {
    DataValue::String(s.to_string())
}

pub fn map(entries: Vec<(&str, DataValue)>) -> DataValue {
    DataValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// `{"en": name}`
pub fn names(name: &str) -> DataValue {
    map(vec![("en", string(name))])
}

/// A City-style record
pub fn city_record(
    continent: &str,
    country: &str,
    iso_code: &str,
    subdivision: Option<&str>,
    city: Option<&str>,
    postal: Option<&str>,
    time_zone: &str,
) -> DataValue {
    let mut fields = vec![
        ("continent", map(vec![("code", string("XX")), ("names", names(continent))])),
        (
            "country",
            map(vec![("iso_code", string(iso_code)), ("names", names(country))]),
        ),
        (
            "location",
            map(vec![
                ("latitude", DataValue::Double(-33.494)),
                ("longitude", DataValue::Double(143.2104)),
                ("time_zone", string(time_zone)),
            ]),
        ),
    ];
    if let Some(sub) = subdivision {
        fields.push((
            "subdivisions",
            DataValue::Array(vec![map(vec![("iso_code", string("NSW")), ("names", names(sub))])]),
        ));
    }
    if let Some(city) = city {
        fields.push(("city", map(vec![("names", names(city))])));
    }
    if let Some(code) = postal {
        fields.push(("postal", map(vec![("code", string(code))])));
    }
    map(fields)
}

pub fn asn_record(number: u32, organization: &str) -> DataValue {
    map(vec![
        ("autonomous_system_number", DataValue::Uint32(number)),
        ("autonomous_system_organization", string(organization)),
    ])
}

/// IPv6 City database used across the integration tests
///
/// - 1.1.1.0/24: Sydney, full record
/// - 8.8.8.0/24: United States, no city, subdivision or postal code
/// - 81.2.69.0/24: London, postal code stored as a uint16
/// - 2001:db8::/32: Berlin
pub fn city_fixture(record_size: u16) -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, record_size).database_type("GeoLite2-City");
    writer.insert(
        "1.1.1.0/24",
        &city_record(
            "Oceania",
            "Australia",
            "AU",
            Some("New South Wales"),
            Some("Sydney"),
            Some("2000"),
            "Australia/Sydney",
        ),
    );
    writer.insert(
        "8.8.8.0/24",
        &city_record("North America", "United States", "US", None, None, None, "America/Chicago"),
    );
    let mut london = city_record(
        "Europe",
        "United Kingdom",
        "GB",
        Some("England"),
        Some("London"),
        None,
        "Europe/London",
    );
    if let DataValue::Map(fields) = &mut london {
        fields.insert("postal".to_string(), map(vec![("code", DataValue::Uint16(1))]));
    }
    writer.insert("81.2.69.0/24", &london);
    writer.insert(
        "2001:db8::/32",
        &city_record(
            "Europe",
            "Germany",
            "DE",
            Some("Land Berlin"),
            Some("Berlin"),
            Some("10115"),
            "Europe/Berlin",
        ),
    );
    writer.build()
}

/// IPv6 ASN database used across the integration tests
///
/// - 1.1.1.0/24: AS13335 Cloudflare
/// - 8.8.8.0/24: AS15169 Google
/// - 9.9.9.0/24: AS19281 Quad9 (no City entry)
/// - 2001:db8::/32: AS64496 Example
pub fn asn_fixture(record_size: u16) -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, record_size).database_type("GeoLite2-ASN");
    writer.insert("1.1.1.0/24", &asn_record(13335, "CLOUDFLARENET"));
    writer.insert("8.8.8.0/24", &asn_record(15169, "GOOGLE"));
    writer.insert("9.9.9.0/24", &asn_record(19281, "QUAD9-AS-1"));
    writer.insert("2001:db8::/32", &asn_record(64496, "EXAMPLE-NET"));
    writer.build()
}

/// Write both fixtures into `dir` under their default file names
pub fn write_fixture_pair(dir: &std::path::Path) {
    std::fs::write(dir.join("GeoLite2-ASN.mmdb"), asn_fixture(24)).expect("write ASN fixture");
    std::fs::write(dir.join("GeoLite2-City.mmdb"), city_fixture(28)).expect("write City fixture");
}
