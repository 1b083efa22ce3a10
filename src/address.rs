//! Address parsing, prefix masking and canonical formatting
//!
//! Addresses are carried as a [`BitSequence`]: the address bits right-aligned
//! in a `u128` together with the family that fixes the width. Bit 0 is the most
//! significant bit of the address, which is also the first bit consumed by the
//! search tree.
//!
//! ```
//! use geoql::address::{self, AddressFamily};
//!
//! let bits = address::parse("192.168.1.200", AddressFamily::V4).unwrap();
//! let net = address::mask(bits, 24).unwrap();
//! assert_eq!(address::format(net), "192.168.1.0");
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{GeoError, Result};

/// Address family of a bit sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// 32-bit IPv4
    V4,
    /// 128-bit IPv6
    V6,
}

impl AddressFamily {
    /// Number of significant bits
    pub fn width(self) -> u32 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    fn value_mask(self) -> u128 {
        match self {
            AddressFamily::V4 => u32::MAX as u128,
            AddressFamily::V6 => u128::MAX,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// A normalized address: `width()` bits, right-aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitSequence {
    bits: u128,
    family: AddressFamily,
}

impl BitSequence {
    /// Build from raw bits; bits above the family width are dropped
    pub fn new(bits: u128, family: AddressFamily) -> Self {
        Self {
            bits: bits & family.value_mask(),
            family,
        }
    }

    /// Address family
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Bit width (32 or 128)
    pub fn width(&self) -> u32 {
        self.family.width()
    }

    /// Raw bits, right-aligned
    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// Bit at `index`, counted from the most significant bit.
    ///
    /// Panics in debug builds if `index >= width()`.
    #[inline]
    pub fn bit(&self, index: u32) -> bool {
        debug_assert!(index < self.width());
        (self.bits >> (self.width() - 1 - index)) & 1 == 1
    }

    /// Convert back to a std address
    pub fn to_ip(&self) -> IpAddr {
        match self.family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(self.bits as u32)),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.bits)),
        }
    }
}

impl From<Ipv4Addr> for BitSequence {
    fn from(addr: Ipv4Addr) -> Self {
        BitSequence::new(u32::from(addr) as u128, AddressFamily::V4)
    }
}

impl From<Ipv6Addr> for BitSequence {
    fn from(addr: Ipv6Addr) -> Self {
        BitSequence::new(u128::from(addr), AddressFamily::V6)
    }
}

impl From<IpAddr> for BitSequence {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

impl fmt::Display for BitSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ip())
    }
}

/// Parse a literal address of the given family.
///
/// No trimming and no name resolution: the text must be exactly an address.
/// IPv6 accepts an embedded IPv4 tail (`::ffff:1.2.3.4`).
pub fn parse(text: &str, family: AddressFamily) -> Result<BitSequence> {
    let parsed = match family {
        AddressFamily::V4 => text.parse::<Ipv4Addr>().map(BitSequence::from),
        AddressFamily::V6 => text.parse::<Ipv6Addr>().map(BitSequence::from),
    };
    parsed.map_err(|e| GeoError::InvalidAddress {
        input: text.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a literal address, picking the family from the text
pub fn parse_any(text: &str) -> Result<BitSequence> {
    text.parse::<IpAddr>()
        .map(BitSequence::from)
        .map_err(|e| GeoError::InvalidAddress {
            input: text.to_string(),
            reason: e.to_string(),
        })
}

/// Zero every bit at position `>= prefix_len`.
///
/// `prefix_len` must be within `0..=width`.
pub fn mask(bits: BitSequence, prefix_len: u32) -> Result<BitSequence> {
    let width = bits.width();
    if prefix_len > width {
        return Err(GeoError::InvalidPrefixLength {
            len: prefix_len as i64,
            max: width,
        });
    }
    // Shifting by the full width (prefix 0) overflows; that case keeps nothing.
    let keep = u128::MAX.checked_shl(width - prefix_len).unwrap_or(0);
    Ok(BitSequence::new(bits.bits & keep, bits.family))
}

/// Canonical text: dotted decimal or RFC 5952 compressed hex
pub fn format(bits: BitSequence) -> String {
    bits.to_string()
}
