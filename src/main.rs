//! Specimen Postprocessor - identifies, renames and documents freshly
//! digitized specimen samples
//!
//! Watches a digitization data tree, reads the barcode on each new sample,
//! embeds the identifier in directory and file names, and writes the
//! metadata record and digitization properties next to the images.

mod app;
mod config;
mod error;
mod identifier;
mod ingest;
mod pipeline;
mod rename;
mod sample;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::Postprocessor;
use crate::config::AppConfig;
use crate::storage::properties::{PropertiesFile, PROPERTIES_FILE_NAME};
use crate::storage::record::read_records_in;

/// Specimen digitization postprocessor
#[derive(Parser, Debug)]
#[command(name = "specimen-postprocessor")]
#[command(about = "Identifies, renames and documents freshly digitized specimen samples")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    debug: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the backlog and watch for new samples (default)
    Run,
    /// Print the records and properties stored in a sample directory
    Inspect { dir: PathBuf },
    /// Write the default configuration to a file
    DefaultConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.log_file.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let config = resolve_config(args.config.as_deref())?;
            let summary = Postprocessor::new(config)?.run()?;
            info!(
                "Postprocessor finished: {} samples, {} failed workers",
                summary.processed, summary.failed_workers
            );
            Ok(())
        }
        Command::Inspect { dir } => {
            let config = resolve_config(args.config.as_deref())?;
            inspect(&dir, &config)
        }
        Command::DefaultConfig { path } => {
            config::save_config(&AppConfig::default(), &path)
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("Default configuration written to {}", path.display());
            Ok(())
        }
    }
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Load configuration from the CLI path, the platform default, or defaults
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).or_else(storage::find_default_config);
    match path {
        Some(path) => {
            let config = config::load_config(&path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => {
            info!("Using default configuration");
            Ok(AppConfig::default())
        }
    }
}

fn inspect(dir: &Path, config: &AppConfig) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{:?} is not a directory", dir);
    }

    let records = read_records_in(dir, &config.basic.json_extension);
    if records.is_empty() {
        println!("No metadata records in {}", dir.display());
    }
    for (path, sample) in &records {
        println!("{}", path.display());
        println!("  sample:     {}", sample.name);
        println!("  created:    {}", sample.created.format(sample::TIMESTAMP_OUTPUT_FORMAT));
        println!("  identifier: {}", sample.identifier().unwrap_or("-"));
        for image in &sample.images {
            println!("  image:      {} ({})", image.path().display(), image.camera());
        }
        for key in sample.meta.keys() {
            println!("  meta:       {}", key);
        }
    }

    let properties_path = dir.join(PROPERTIES_FILE_NAME);
    if properties_path.is_file() {
        let properties = PropertiesFile::read(&properties_path)
            .with_context(|| format!("Failed to read {:?}", properties_path))?;
        println!("{}", properties_path.display());
        if !properties.header().is_empty() {
            println!("  {}", properties.header());
        }
        for (key, value) in properties.entries() {
            println!("  {} = {}", key, value);
        }
    }
    Ok(())
}
