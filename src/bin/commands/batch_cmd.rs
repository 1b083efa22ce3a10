use anyhow::{anyhow, bail, Context, Result};
use geoql::{file_reader, Engine, GeoFunction};
use rayon::prelude::*;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use super::ensure_ready;
use crate::cli_utils::format_qps;

/// What a batch evaluates per address
#[derive(Clone, Copy)]
enum BatchFunction {
    Field(GeoFunction),
    Aggregate,
}

impl BatchFunction {
    fn parse(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower == "geoip" {
            return Ok(BatchFunction::Aggregate);
        }
        lower
            .parse()
            .map(BatchFunction::Field)
            .map_err(|e: String| anyhow!(e))
    }

    fn eval(self, engine: &Engine, address: &str) -> geoql::Result<Option<String>> {
        match self {
            BatchFunction::Field(function) => engine.call(function, Some(address)),
            BatchFunction::Aggregate => engine.geoip(Some(address)),
        }
    }
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => bail!("Unknown format '{}': expected text, json, or csv", other),
        }
    }
}

pub fn cmd_batch(
    engine: &Engine,
    function: &str,
    inputs: Vec<PathBuf>,
    format: &str,
    threads: Option<usize>,
) -> Result<()> {
    let function = BatchFunction::parse(function)?;
    let format = OutputFormat::parse(format)?;
    ensure_ready(engine)?;

    let mut addresses = Vec::new();
    for input in &inputs {
        let mut list = file_reader::read_addresses(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        addresses.append(&mut list);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or(0))
        .build()
        .context("Failed to start worker threads")?;

    let started = Instant::now();
    let results: Vec<geoql::Result<Option<String>>> = pool.install(|| {
        addresses
            .par_iter()
            .map(|address| function.eval(engine, address))
            .collect()
    });
    let elapsed = started.elapsed();

    let failed = results.iter().filter(|r| r.is_err()).count();
    let stdout = io::stdout();
    let out = stdout.lock();
    match format {
        OutputFormat::Text => write_text(out, &addresses, &results)?,
        OutputFormat::Json => write_json(out, &addresses, &results)?,
        OutputFormat::Csv => write_csv(out, &addresses, &results)?,
    }

    tracing::info!(
        addresses = addresses.len(),
        failed,
        threads = pool.current_num_threads(),
        elapsed_ms = elapsed.as_millis() as u64,
        rate = %format_qps(addresses.len() as f64 / elapsed.as_secs_f64().max(1e-9)),
        "batch complete"
    );

    if failed > 0 {
        bail!("{} of {} lookups failed", failed, addresses.len());
    }
    Ok(())
}

/// `address<TAB>value`, errors reported on stderr
fn write_text<W: Write>(
    mut out: W,
    addresses: &[String],
    results: &[geoql::Result<Option<String>>],
) -> Result<()> {
    for (address, result) in addresses.iter().zip(results) {
        match result {
            Ok(Some(value)) => writeln!(out, "{}\t{}", address, value)?,
            Ok(None) => writeln!(out, "{}\tNULL", address)?,
            Err(e) => eprintln!("Error: {}: {}", address, e),
        }
    }
    out.flush()?;
    Ok(())
}

/// NDJSON, one object per address; NULL is `null`
fn write_json<W: Write>(
    mut out: W,
    addresses: &[String],
    results: &[geoql::Result<Option<String>>],
) -> Result<()> {
    for (address, result) in addresses.iter().zip(results) {
        let line = match result {
            Ok(value) => json!({ "address": address, "value": value }),
            Err(e) => json!({ "address": address, "error": e.to_string() }),
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    out.flush()?;
    Ok(())
}

fn write_csv<W: Write>(
    out: W,
    addresses: &[String],
    results: &[geoql::Result<Option<String>>],
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["address", "value", "error"])?;
    for (address, result) in addresses.iter().zip(results) {
        match result {
            Ok(Some(value)) => writer.write_record([address.as_str(), value.as_str(), ""])?,
            Ok(None) => writer.write_record([address.as_str(), "", ""])?,
            Err(e) => writer.write_record([address.as_str(), "", e.to_string().as_str()])?,
        }
    }
    writer.flush()?;
    Ok(())
}
