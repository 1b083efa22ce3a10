//! Address list input with automatic gzip decompression
//!
//! Batch lookups read one address per line. Files ending in `.gz` are
//! decompressed on the fly and `-` reads standard input.
//!
//! ```rust,no_run
//! use geoql::file_reader;
//!
//! let addresses = file_reader::read_addresses("clients.txt.gz")?;
//! println!("{} addresses", addresses.len());
//! # Ok::<(), std::io::Error>(())
//! ```

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader};
use std::path::Path;

/// Buffer size for file reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Open a file with automatic gzip detection based on file extension
///
/// Files ending in `.gz` (case-insensitive) are automatically decompressed.
/// Special case: path "-" reads from stdin.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let file = File::open(path)?;

    let is_gzip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

/// Collect address lines from a reader
///
/// Surrounding whitespace is trimmed; blank lines and `#` comments are skipped.
/// Lines are not validated here, so a malformed address reaches the lookup and
/// is reported there.
pub fn collect_addresses<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        out.push(trimmed.to_string());
    }
    Ok(out)
}

/// Read every address listed in `path`
pub fn read_addresses<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    collect_addresses(open(path)?)
}
