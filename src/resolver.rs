//! Field path resolution over lazily decoded records
//!
//! A path is an ordered list of selectors, e.g. `[Key("subdivisions"), Index(0),
//! Key("names"), Key("en")]`. Walking a path touches only the entries on the
//! way; everything else is skipped.

use crate::data_section::{Container, DataDecoder, DecodeError, ValueRef};

/// One step of a field path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'p> {
    /// Map key; an all-digit key also indexes into an array
    Key(&'p str),
    /// Array index
    Index(usize),
}

/// Borrowed field path
pub type FieldPath<'p> = [Selector<'p>];

/// Split a dotted path into keys.
///
/// Segments keep their text; whether `0` is a map key or an array index is
/// decided by the value it meets while walking.
///
/// ```
/// use geoql::resolver::{parse_path, Selector};
///
/// assert_eq!(
///     parse_path("subdivisions.0.names.en"),
///     vec![
///         Selector::Key("subdivisions"),
///         Selector::Key("0"),
///         Selector::Key("names"),
///         Selector::Key("en"),
///     ]
/// );
/// ```
pub fn parse_path(text: &str) -> Vec<Selector<'_>> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('.').map(Selector::Key).collect()
}

/// Array index named by an all-digit key
fn key_as_index(key: &str) -> Option<usize> {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        key.parse().ok()
    } else {
        None
    }
}

/// Walk `path` from the record at `root`.
///
/// Returns `Ok(None)` when a key is missing, an index is out of range, a selector
/// does not fit the value it is applied to, or an unsupported type is met on the
/// way. Structural corruption is an error.
pub fn resolve<'a>(
    decoder: &DataDecoder<'a>,
    root: usize,
    path: &FieldPath<'_>,
) -> Result<Option<ValueRef<'a>>, DecodeError> {
    match walk(decoder, root, path) {
        Err(DecodeError::UnsupportedType { .. }) => Ok(None),
        other => other,
    }
}

fn walk<'a>(
    decoder: &DataDecoder<'a>,
    root: usize,
    path: &FieldPath<'_>,
) -> Result<Option<ValueRef<'a>>, DecodeError> {
    let mut current = decoder.decode_ref(root)?;

    for selector in path {
        let next_offset = match (selector, current) {
            (Selector::Key(wanted), ValueRef::Map(map)) => {
                let mut found = None;
                for entry in decoder.map_entries(map) {
                    let (key, value_offset) = entry?;
                    if key == *wanted {
                        found = Some(value_offset);
                        break;
                    }
                }
                found
            }
            (Selector::Index(index), ValueRef::Array(array)) => {
                element(decoder, array, *index)?
            }
            (Selector::Key(key), ValueRef::Array(array)) => match key_as_index(key) {
                Some(index) => element(decoder, array, index)?,
                None => None,
            },
            _ => None,
        };

        match next_offset {
            Some(offset) => current = decoder.decode_ref(offset)?,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

fn element(
    decoder: &DataDecoder<'_>,
    array: Container,
    index: usize,
) -> Result<Option<usize>, DecodeError> {
    if index >= array.len {
        return Ok(None);
    }
    decoder.array_elements(array).nth(index).transpose()
}
