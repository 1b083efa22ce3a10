use anyhow::{Context, Result};
use geoql::Database;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_number, format_unix_timestamp};

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let header = db.header();
    let meta = db.metadata();
    let data_size = header.data_section_end - header.data_section_start;

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "database_type": meta.database_type,
            "ip_version": header.ip_version.to_string(),
            "record_size": header.record_size.bits(),
            "node_count": header.node_count,
            "tree_size": header.tree_size,
            "data_section_size": data_size,
            "binary_format": format!(
                "{}.{}",
                meta.binary_format_major_version, meta.binary_format_minor_version
            ),
            "build_epoch": meta.build_epoch,
            "languages": meta.languages,
            "description": meta.description,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    if !meta.database_type.is_empty() {
        println!("Type:     {}", meta.database_type);
    }
    println!();
    println!("Layout:");
    println!("  IP version:      IPv{}", header.ip_version);
    println!("  Record size:     {} bits", header.record_size.bits());
    println!("  Node count:      {}", format_number(header.node_count as usize));
    println!("  Search tree:     {}", format_bytes(header.tree_size));
    println!("  Data section:    {}", format_bytes(data_size));
    println!(
        "  Format version:  {}.{}",
        meta.binary_format_major_version, meta.binary_format_minor_version
    );

    println!();
    println!("Metadata:");
    if meta.build_epoch > 0 {
        println!(
            "  Build time:      {} ({})",
            format_unix_timestamp(meta.build_epoch),
            meta.build_epoch
        );
    }
    if !meta.languages.is_empty() {
        println!("  Languages:       {}", meta.languages.join(", "));
    }
    if !meta.description.is_empty() {
        println!("  Description:");
        for (lang, desc) in &meta.description {
            println!("    {}: {}", lang, desc);
        }
    }

    Ok(())
}
