use anyhow::{Context, Result};
use geoql::formatter::NULL_TEXT;
use geoql::{ip6mask, ipmask};

pub fn cmd_mask(address: &str, len: i64, v6: bool) -> Result<()> {
    let masked = if v6 {
        ip6mask(Some(address), Some(len))
    } else {
        ipmask(Some(address), Some(len))
    }
    .with_context(|| format!("Cannot mask {}", address))?;

    println!("{}", masked.as_deref().unwrap_or(NULL_TEXT));
    Ok(())
}
