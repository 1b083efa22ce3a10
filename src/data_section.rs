//! MMDB data section decoding
//!
//! Reads the self-describing tagged encoding used by MaxMind DB data sections and
//! metadata blocks. Two decoding styles are offered:
//!
//! - **Lazy** ([`DataDecoder::decode_ref`]): returns a [`ValueRef`] borrowing strings
//!   and bytes from the buffer. Maps and arrays come back as [`Container`] handles
//!   that are walked entry by entry, so a field lookup touches only the bytes on its
//!   path.
//! - **Eager** ([`DataDecoder::decode`]): materializes an owned [`DataValue`] tree.
//!   Used for metadata and full record dumps.
//!
//! # Format
//!
//! Every value starts with a control byte: type in the top 3 bits, size in the low
//! 5 bits. Type 0 means "extended": the real type is the next byte plus 7. Sizes
//! 29, 30 and 31 are followed by 1, 2 or 3 extra size bytes. Pointers (type 1)
//! reference another value by its offset from the start of the section and are
//! followed transparently; they never appear in decoded output.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use std::collections::HashMap;
use std::fmt;

/// Maximum container nesting accepted by the decoder
pub const MAX_DECODE_DEPTH: usize = 512;

/// MMDB data type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Extended type marker (tag 0 in the control byte)
    Extended = 0,
    /// Pointer to another value
    Pointer = 1,
    /// UTF-8 string
    String = 2,
    /// IEEE 754 double
    Double = 3,
    /// Raw bytes
    Bytes = 4,
    /// Unsigned 16-bit integer
    Uint16 = 5,
    /// Unsigned 32-bit integer
    Uint32 = 6,
    /// Key/value map
    Map = 7,
    /// Signed 32-bit integer
    Int32 = 8,
    /// Unsigned 64-bit integer
    Uint64 = 9,
    /// Unsigned 128-bit integer
    Uint128 = 10,
    /// Array
    Array = 11,
    /// Data cache container
    Container = 12,
    /// End marker
    EndMarker = 13,
    /// Boolean
    Bool = 14,
    /// IEEE 754 float
    Float = 15,
}

impl DataType {
    /// Map a numeric tag to a type
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => DataType::Extended,
            1 => DataType::Pointer,
            2 => DataType::String,
            3 => DataType::Double,
            4 => DataType::Bytes,
            5 => DataType::Uint16,
            6 => DataType::Uint32,
            7 => DataType::Map,
            8 => DataType::Int32,
            9 => DataType::Uint64,
            10 => DataType::Uint128,
            11 => DataType::Array,
            12 => DataType::Container,
            13 => DataType::EndMarker,
            14 => DataType::Bool,
            15 => DataType::Float,
            _ => return None,
        })
    }

    /// Human-readable type name, as reported in "Data type is: ..." messages
    pub fn name(self) -> &'static str {
        match self {
            DataType::Extended => "extended",
            DataType::Pointer => "pointer",
            DataType::String => "UTF8 string",
            DataType::Double => "double",
            DataType::Bytes => "bytes",
            DataType::Uint16 => "short int",
            DataType::Uint32 => "unsigned int",
            DataType::Map => "map",
            DataType::Int32 => "signed int",
            DataType::Uint64 => "long int",
            DataType::Uint128 => "128-bit integer",
            DataType::Array => "array",
            DataType::Container => "container",
            DataType::EndMarker => "end marker",
            DataType::Bool => "boolean",
            DataType::Float => "float",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoder errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A type tag the decoder does not materialize (unknown tag, data cache
    /// container, end marker, pointer to pointer)
    UnsupportedType {
        /// Raw type id
        type_id: u8,
        /// Offset of the offending control byte
        offset: usize,
    },
    /// Truncated, malformed or too deeply nested data
    Corrupt {
        /// Offset where decoding failed
        offset: usize,
        /// What was wrong
        reason: &'static str,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnsupportedType { type_id, offset } => match DataType::from_id(*type_id)
            {
                Some(t) => write!(f, "unsupported data type {} at offset {}", t, offset),
                None => write!(f, "unknown data type {} at offset {}", type_id, offset),
            },
            DecodeError::Corrupt { offset, reason } => {
                write!(f, "corrupt data section at offset {}: {}", offset, reason)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Owned, fully decoded value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only in MMDB)
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Type tag of this value
    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::String(_) => DataType::String,
            DataValue::Double(_) => DataType::Double,
            DataValue::Bytes(_) => DataType::Bytes,
            DataValue::Uint16(_) => DataType::Uint16,
            DataValue::Uint32(_) => DataType::Uint32,
            DataValue::Map(_) => DataType::Map,
            DataValue::Int32(_) => DataType::Int32,
            DataValue::Uint64(_) => DataType::Uint64,
            DataValue::Uint128(_) => DataType::Uint128,
            DataValue::Array(_) => DataType::Array,
            DataValue::Bool(_) => DataType::Bool,
            DataValue::Float(_) => DataType::Float,
        }
    }
}

/// Handle to an undecoded map or array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    /// Number of entries (key/value pairs for maps, elements for arrays)
    pub len: usize,
    /// Offset of the first child within the section
    pub first: usize,
}

/// Borrowed value produced by lazy decoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    /// UTF-8 string
    String(&'a str),
    /// IEEE 754 double
    Double(f64),
    /// Raw bytes
    Bytes(&'a [u8]),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Map handle
    Map(Container),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array handle
    Array(Container),
    /// Boolean
    Bool(bool),
    /// IEEE 754 float
    Float(f32),
}

impl ValueRef<'_> {
    /// Type tag of this value
    pub fn data_type(&self) -> DataType {
        match self {
            ValueRef::String(_) => DataType::String,
            ValueRef::Double(_) => DataType::Double,
            ValueRef::Bytes(_) => DataType::Bytes,
            ValueRef::Uint16(_) => DataType::Uint16,
            ValueRef::Uint32(_) => DataType::Uint32,
            ValueRef::Map(_) => DataType::Map,
            ValueRef::Int32(_) => DataType::Int32,
            ValueRef::Uint64(_) => DataType::Uint64,
            ValueRef::Uint128(_) => DataType::Uint128,
            ValueRef::Array(_) => DataType::Array,
            ValueRef::Bool(_) => DataType::Bool,
            ValueRef::Float(_) => DataType::Float,
        }
    }
}

/// Parsed control byte(s)
enum Header {
    Pointer { target: usize, next: usize },
    Value {
        data_type: DataType,
        size: usize,
        payload: usize,
    },
}

/// Data section decoder
///
/// Offsets are relative to the start of `buffer`, which must be the data section
/// (or metadata block) itself so that pointer targets line up.
#[derive(Debug, Clone, Copy)]
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Length of the underlying section
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when the section is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Decode the value at `offset` without materializing containers.
    ///
    /// A pointer is followed once; a pointer whose target is another pointer is
    /// rejected.
    pub fn decode_ref(&self, offset: usize) -> Result<ValueRef<'a>, DecodeError> {
        match self.header(offset)? {
            Header::Pointer { target, .. } => match self.header(target)? {
                Header::Pointer { .. } => Err(DecodeError::UnsupportedType {
                    type_id: DataType::Pointer as u8,
                    offset: target,
                }),
                Header::Value {
                    data_type,
                    size,
                    payload,
                } => self.read_value(target, data_type, size, payload),
            },
            Header::Value {
                data_type,
                size,
                payload,
            } => self.read_value(offset, data_type, size, payload),
        }
    }

    /// Offset just past the value at `offset`, including nested containers.
    ///
    /// Pointers are skipped, not followed.
    pub fn skip(&self, offset: usize) -> Result<usize, DecodeError> {
        self.skip_at(offset, 0)
    }

    /// Fully decode the value at `offset`
    pub fn decode(&self, offset: usize) -> Result<DataValue, DecodeError> {
        self.decode_at(offset, 0)
    }

    /// Turn a lazily decoded value into an owned one, decoding container children
    pub fn materialize(&self, value: ValueRef<'a>) -> Result<DataValue, DecodeError> {
        Ok(match value {
            ValueRef::String(s) => DataValue::String(s.to_string()),
            ValueRef::Double(d) => DataValue::Double(d),
            ValueRef::Bytes(b) => DataValue::Bytes(b.to_vec()),
            ValueRef::Uint16(u) => DataValue::Uint16(u),
            ValueRef::Uint32(u) => DataValue::Uint32(u),
            ValueRef::Int32(i) => DataValue::Int32(i),
            ValueRef::Uint64(u) => DataValue::Uint64(u),
            ValueRef::Uint128(u) => DataValue::Uint128(u),
            ValueRef::Bool(b) => DataValue::Bool(b),
            ValueRef::Float(f) => DataValue::Float(f),
            ValueRef::Map(map) => {
                let mut entries = HashMap::with_capacity(map.len.min(64));
                for entry in self.map_entries(map) {
                    let (key, value_offset) = entry?;
                    entries.insert(key.to_string(), self.decode(value_offset)?);
                }
                DataValue::Map(entries)
            }
            ValueRef::Array(array) => {
                let mut items = Vec::with_capacity(array.len.min(64));
                for element in self.array_elements(array) {
                    items.push(self.decode(element?)?);
                }
                DataValue::Array(items)
            }
        })
    }

    /// Iterate the entries of a map as `(key, value_offset)` pairs
    pub fn map_entries(&self, map: Container) -> MapEntries<'a> {
        MapEntries {
            decoder: *self,
            cursor: map.first,
            pending: None,
            remaining: map.len,
        }
    }

    /// Iterate the element offsets of an array
    pub fn array_elements(&self, array: Container) -> ArrayElements<'a> {
        ArrayElements {
            decoder: *self,
            cursor: array.first,
            started: false,
            remaining: array.len,
        }
    }

    fn byte(&self, offset: usize) -> Result<u8, DecodeError> {
        self.buffer
            .get(offset)
            .copied()
            .ok_or(DecodeError::Corrupt {
                offset,
                reason: "offset past end of data section",
            })
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.buffer.get(offset..end))
            .ok_or(DecodeError::Corrupt {
                offset,
                reason: "value runs past end of data section",
            })
    }

    /// Big-endian unsigned integer of `len` bytes (at most 16)
    fn read_uint(&self, offset: usize, len: usize) -> Result<u128, DecodeError> {
        Ok(self
            .slice(offset, len)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    fn header(&self, offset: usize) -> Result<Header, DecodeError> {
        let ctrl = self.byte(offset)?;
        let mut cursor = offset + 1;
        let mut type_id = ctrl >> 5;

        if type_id == DataType::Pointer as u8 {
            let ss = ((ctrl >> 3) & 0x3) as usize;
            let vvv = (ctrl & 0x7) as usize;
            let extra = ss + 1;
            let raw = self.read_uint(cursor, extra)? as usize;
            let target = match ss {
                0 => (vvv << 8) | raw,
                1 => ((vvv << 16) | raw) + 2048,
                2 => ((vvv << 24) | raw) + 526_336,
                _ => raw,
            };
            return Ok(Header::Pointer {
                target,
                next: cursor + extra,
            });
        }

        if type_id == DataType::Extended as u8 {
            let ext = self.byte(cursor)?;
            cursor += 1;
            let real = ext as u16 + 7;
            if real < DataType::Int32 as u16 {
                return Err(DecodeError::Corrupt {
                    offset,
                    reason: "invalid extended type",
                });
            }
            type_id = u8::try_from(real).map_err(|_| DecodeError::UnsupportedType {
                type_id: u8::MAX,
                offset,
            })?;
        }

        let data_type = match DataType::from_id(type_id) {
            Some(DataType::Container) | Some(DataType::EndMarker) | None => {
                return Err(DecodeError::UnsupportedType { type_id, offset })
            }
            Some(t) => t,
        };

        let size = match ctrl & 0x1F {
            s @ 0..=28 => s as usize,
            29 => {
                let n = self.read_uint(cursor, 1)? as usize;
                cursor += 1;
                29 + n
            }
            30 => {
                let n = self.read_uint(cursor, 2)? as usize;
                cursor += 2;
                285 + n
            }
            _ => {
                let n = self.read_uint(cursor, 3)? as usize;
                cursor += 3;
                65_821 + n
            }
        };

        Ok(Header::Value {
            data_type,
            size,
            payload: cursor,
        })
    }

    fn read_value(
        &self,
        offset: usize,
        data_type: DataType,
        size: usize,
        payload: usize,
    ) -> Result<ValueRef<'a>, DecodeError> {
        let corrupt = |reason| DecodeError::Corrupt { offset, reason };
        let value = match data_type {
            DataType::String => {
                let bytes = self.slice(payload, size)?;
                let s = std::str::from_utf8(bytes).map_err(|_| corrupt("invalid UTF-8 in string"))?;
                ValueRef::String(s)
            }
            DataType::Bytes => ValueRef::Bytes(self.slice(payload, size)?),
            DataType::Double => {
                if size != 8 {
                    return Err(corrupt("double must be 8 bytes"));
                }
                ValueRef::Double(f64::from_bits(self.read_uint(payload, 8)? as u64))
            }
            DataType::Float => {
                if size != 4 {
                    return Err(corrupt("float must be 4 bytes"));
                }
                ValueRef::Float(f32::from_bits(self.read_uint(payload, 4)? as u32))
            }
            DataType::Uint16 => {
                if size > 2 {
                    return Err(corrupt("uint16 wider than 2 bytes"));
                }
                ValueRef::Uint16(self.read_uint(payload, size)? as u16)
            }
            DataType::Uint32 => {
                if size > 4 {
                    return Err(corrupt("uint32 wider than 4 bytes"));
                }
                ValueRef::Uint32(self.read_uint(payload, size)? as u32)
            }
            DataType::Int32 => {
                if size > 4 {
                    return Err(corrupt("int32 wider than 4 bytes"));
                }
                ValueRef::Int32(self.read_uint(payload, size)? as u32 as i32)
            }
            DataType::Uint64 => {
                if size > 8 {
                    return Err(corrupt("uint64 wider than 8 bytes"));
                }
                ValueRef::Uint64(self.read_uint(payload, size)? as u64)
            }
            DataType::Uint128 => {
                if size > 16 {
                    return Err(corrupt("uint128 wider than 16 bytes"));
                }
                ValueRef::Uint128(self.read_uint(payload, size)?)
            }
            DataType::Bool => match size {
                0 => ValueRef::Bool(false),
                1 => ValueRef::Bool(true),
                _ => return Err(corrupt("boolean size must be 0 or 1")),
            },
            DataType::Map => ValueRef::Map(Container {
                len: size,
                first: payload,
            }),
            DataType::Array => ValueRef::Array(Container {
                len: size,
                first: payload,
            }),
            DataType::Extended
            | DataType::Pointer
            | DataType::Container
            | DataType::EndMarker => {
                return Err(DecodeError::UnsupportedType {
                    type_id: data_type as u8,
                    offset,
                })
            }
        };
        Ok(value)
    }

    fn skip_at(&self, offset: usize, depth: usize) -> Result<usize, DecodeError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(DecodeError::Corrupt {
                offset,
                reason: "maximum nesting depth exceeded",
            });
        }
        match self.header(offset)? {
            Header::Pointer { next, .. } => Ok(next),
            Header::Value {
                data_type,
                size,
                payload,
            } => match data_type {
                DataType::Map => {
                    let mut cursor = payload;
                    for _ in 0..size {
                        cursor = self.skip_at(cursor, depth + 1)?;
                        cursor = self.skip_at(cursor, depth + 1)?;
                    }
                    Ok(cursor)
                }
                DataType::Array => {
                    let mut cursor = payload;
                    for _ in 0..size {
                        cursor = self.skip_at(cursor, depth + 1)?;
                    }
                    Ok(cursor)
                }
                // Boolean carries its value in the size field
                DataType::Bool => Ok(payload),
                _ => {
                    self.slice(payload, size)?;
                    Ok(payload + size)
                }
            },
        }
    }

    fn decode_at(&self, offset: usize, depth: usize) -> Result<DataValue, DecodeError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(DecodeError::Corrupt {
                offset,
                reason: "maximum nesting depth exceeded",
            });
        }
        let value = match self.decode_ref(offset)? {
            ValueRef::String(s) => DataValue::String(s.to_string()),
            ValueRef::Double(d) => DataValue::Double(d),
            ValueRef::Bytes(b) => DataValue::Bytes(b.to_vec()),
            ValueRef::Uint16(n) => DataValue::Uint16(n),
            ValueRef::Uint32(n) => DataValue::Uint32(n),
            ValueRef::Int32(n) => DataValue::Int32(n),
            ValueRef::Uint64(n) => DataValue::Uint64(n),
            ValueRef::Uint128(n) => DataValue::Uint128(n),
            ValueRef::Bool(b) => DataValue::Bool(b),
            ValueRef::Float(f) => DataValue::Float(f),
            ValueRef::Map(map) => {
                let mut out = HashMap::with_capacity(map.len.min(64));
                for entry in self.map_entries(map) {
                    let (key, value_offset) = entry?;
                    out.insert(key.to_string(), self.decode_at(value_offset, depth + 1)?);
                }
                DataValue::Map(out)
            }
            ValueRef::Array(array) => {
                let mut out = Vec::with_capacity(array.len.min(64));
                for element in self.array_elements(array) {
                    out.push(self.decode_at(element?, depth + 1)?);
                }
                DataValue::Array(out)
            }
        };
        Ok(value)
    }
}

/// Iterator over map entries, see [`DataDecoder::map_entries`]
///
/// A value is only skipped when the next entry is requested, so stopping at a
/// matching key never walks the matched value.
pub struct MapEntries<'a> {
    decoder: DataDecoder<'a>,
    cursor: usize,
    pending: Option<usize>,
    remaining: usize,
}

impl<'a> MapEntries<'a> {
    fn advance(&mut self) -> Result<(&'a str, usize), DecodeError> {
        if let Some(value_offset) = self.pending.take() {
            self.cursor = self.decoder.skip(value_offset)?;
        }
        let key = match self.decoder.decode_ref(self.cursor)? {
            ValueRef::String(s) => s,
            _ => {
                return Err(DecodeError::Corrupt {
                    offset: self.cursor,
                    reason: "map key is not a string",
                })
            }
        };
        let value_offset = self.decoder.skip(self.cursor)?;
        self.pending = Some(value_offset);
        Ok((key, value_offset))
    }
}

impl<'a> Iterator for MapEntries<'a> {
    type Item = Result<(&'a str, usize), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = self.advance();
        if item.is_err() {
            self.remaining = 0;
        }
        Some(item)
    }
}

/// Iterator over array element offsets, see [`DataDecoder::array_elements`]
pub struct ArrayElements<'a> {
    decoder: DataDecoder<'a>,
    cursor: usize,
    started: bool,
    remaining: usize,
}

impl Iterator for ArrayElements<'_> {
    type Item = Result<usize, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        if self.started {
            match self.decoder.skip(self.cursor) {
                Ok(next) => self.cursor = next,
                Err(e) => {
                    self.remaining = 0;
                    return Some(Err(e));
                }
            }
        }
        self.started = true;
        Some(Ok(self.cursor))
    }
}
