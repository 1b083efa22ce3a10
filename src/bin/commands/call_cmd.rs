use anyhow::{anyhow, bail, Result};
use geoql::formatter::NULL_TEXT;
use geoql::{Engine, GeoFunction};

use super::ensure_ready;

pub fn cmd_call(engine: &Engine, function: &str, addresses: &[String]) -> Result<()> {
    let function: GeoFunction = function.parse().map_err(|e: String| anyhow!(e))?;
    ensure_ready(engine)?;

    print_results(addresses, |address| engine.call(function, Some(address)))
}

pub fn cmd_geoip(engine: &Engine, addresses: &[String]) -> Result<()> {
    ensure_ready(engine)?;

    print_results(addresses, |address| engine.geoip(Some(address)))
}

/// One output line per address; failures go to stderr and set the exit status
fn print_results<F>(addresses: &[String], eval: F) -> Result<()>
where
    F: Fn(&str) -> geoql::Result<Option<String>>,
{
    let mut failed = 0usize;
    for address in addresses {
        match eval(address) {
            Ok(Some(value)) => println!("{}", value),
            Ok(None) => println!("{}", NULL_TEXT),
            Err(e) => {
                eprintln!("Error: {}: {}", address, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} lookups failed", failed, addresses.len());
    }
    Ok(())
}
