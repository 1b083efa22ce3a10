mod cli_utils;
mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use geoql::{Engine, EngineConfig, GeoMissPolicy};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::{cmd_batch, cmd_call, cmd_geoip, cmd_inspect, cmd_lookup, cmd_mask};

/// Log filter variable, checked before `RUST_LOG`
const LOG_ENV: &str = "GEOQL_LOG";

#[derive(Parser)]
#[command(name = "geoql")]
#[command(
    about = "IP geolocation and ASN lookups over MaxMind DB files",
    long_about = "geoql - IP geolocation and ASN lookups over MaxMind DB files\n\n\
    Answers country, city, subdivision, time zone, postal code and autonomous system\n\
    questions for IPv4 and IPv6 addresses from a GeoLite2 ASN and City database pair,\n\
    and masks addresses to a prefix length.\n\n\
    Databases are found in --db-dir (or GEOQL_DB_DIR), default the current directory.\n\n\
    Examples:\n\
      geoql call country 1.1.1.1\n\
      geoql geoip 2606:4700:4700::1111\n\
      geoql ipmask 192.168.1.200 24\n\
      geoql batch asn_owner clients.txt.gz --format csv\n\
      geoql lookup GeoLite2-City.mmdb 8.8.8.8 --path location.time_zone\n\
      geoql inspect GeoLite2-ASN.mmdb --json"
)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens the database pair
#[derive(Args)]
struct EngineArgs {
    /// JSON configuration file (base_dir, asn_file, city_file, geo_miss)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the database files
    #[arg(long, global = true, value_name = "DIR")]
    db_dir: Option<PathBuf>,

    /// ASN database file, relative to --db-dir unless absolute
    #[arg(long, global = true, value_name = "FILE")]
    asn_db: Option<PathBuf>,

    /// City database file, relative to --db-dir unless absolute
    #[arg(long, global = true, value_name = "FILE")]
    city_db: Option<PathBuf>,

    /// Print NULL geo columns instead of dropping the row when the City
    /// database has no entry (geoip and batch geoip)
    #[arg(long, global = true)]
    pad_missing_geo: bool,
}

impl EngineArgs {
    /// Defaults, then the config file, then the environment, then flags
    fn resolve(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        config.apply_env()?;

        if let Some(dir) = &self.db_dir {
            config.base_dir = dir.clone();
        }
        if let Some(file) = &self.asn_db {
            config.asn_file = file.clone();
        }
        if let Some(file) = &self.city_db {
            config.city_file = file.clone();
        }
        if self.pad_missing_geo {
            config.geo_miss = GeoMissPolicy::PadNull;
        }
        Ok(config)
    }

    fn open_engine(&self) -> Result<Engine> {
        let config = self.resolve().context("Invalid configuration")?;
        Ok(Engine::open(&config))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one lookup function for each address
    Call {
        /// Function name: country, continent, city, state, timezone, zipcode,
        /// asn_owner, asn_number, country_code (a geoip_ prefix is accepted)
        #[arg(value_name = "FUNCTION")]
        function: String,

        /// Addresses to look up
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,
    },

    /// Print the aggregate line for each address
    ///
    /// org | asn | continent | country | subdivision | city | postal | time zone
    Geoip {
        /// Addresses to look up
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,
    },

    /// Mask an IPv4 address to a prefix length
    Ipmask {
        /// IPv4 address
        address: String,

        /// Prefix length (0-32)
        #[arg(allow_negative_numbers = true)]
        len: i64,
    },

    /// Mask an IPv6 address to a prefix length
    Ip6mask {
        /// IPv6 address
        address: String,

        /// Prefix length (0-128)
        #[arg(allow_negative_numbers = true)]
        len: i64,
    },

    /// Evaluate a function over address lists (one per line, .gz supported)
    Batch {
        /// Function name, or "geoip" for the aggregate line
        #[arg(value_name = "FUNCTION")]
        function: String,

        /// Address list files, or "-" for stdin
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output format: text (default), json (NDJSON), or csv
        #[arg(long, default_value = "text")]
        format: String,

        /// Worker threads (default: number of CPUs)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Print the full record a single database holds for an address
    Lookup {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Address to look up
        #[arg(value_name = "ADDRESS")]
        address: String,

        /// Only print the field at this dotted path (e.g. subdivisions.0.iso_code)
        #[arg(long)]
        path: Option<String>,
    },

    /// Show database metadata and layout
    Inspect {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Call {
            function,
            addresses,
        } => cmd_call(&cli.engine.open_engine()?, &function, &addresses),
        Commands::Geoip { addresses } => cmd_geoip(&cli.engine.open_engine()?, &addresses),
        Commands::Ipmask { address, len } => cmd_mask(&address, len, false),
        Commands::Ip6mask { address, len } => cmd_mask(&address, len, true),
        Commands::Batch {
            function,
            inputs,
            format,
            threads,
        } => cmd_batch(
            &cli.engine.open_engine()?,
            &function,
            inputs,
            &format,
            threads,
        ),
        Commands::Lookup {
            database,
            address,
            path,
        } => cmd_lookup(database, &address, path.as_deref()),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
    }
}
