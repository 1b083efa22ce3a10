use anyhow::{Context, Result};
use geoql::resolver::parse_path;
use geoql::Database;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{data_value_to_json, format_cidr};

pub fn cmd_lookup(database: PathBuf, address: &str, path: Option<&str>) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let entry = db
        .lookup_str(address)
        .with_context(|| format!("Lookup failed for: {}", address))?;

    let entry = match entry {
        Some(entry) => entry,
        None => {
            // Not covered by the database
            println!("null");
            return Ok(());
        }
    };

    let output = match path {
        Some(path) => {
            let selectors = parse_path(path);
            let value = entry
                .get_decoded(&selectors)
                .with_context(|| format!("Failed to read {} for {}", path, address))?;
            value.as_ref().map(data_value_to_json).unwrap_or(json!(null))
        }
        None => {
            let record = entry
                .decode()
                .with_context(|| format!("Failed to decode record for {}", address))?;
            json!({
                "network": format_cidr(&entry.network(), entry.prefix_len()),
                "prefix_len": entry.prefix_len(),
                "data": data_value_to_json(&record),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
